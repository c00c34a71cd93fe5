use radio_proto::catalog::{CatalogSource, Selection, StationKind};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

fn touch(path: &std::path::Path, offset_secs: u64) {
    let when = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000 + offset_secs);
    std::fs::File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(when)
        .unwrap();
}

#[test]
fn reload_only_when_mtime_changes() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("stations.yaml");
    std::fs::write(
        &path,
        "banks:\n  0:\n    stations:\n      0: {name: A, type: stream, url: 'http://a'}\n",
    )
    .unwrap();
    touch(&path, 0);

    let mut source = CatalogSource::new(path.clone());
    let catalog = source.load();
    assert_eq!(catalog.len(), 1);
    assert!(source.reload_if_changed().is_none());

    std::fs::write(
        &path,
        "banks:\n  0:\n    stations:\n      0: {name: B, type: dir, path: 'b/'}\n",
    )
    .unwrap();
    touch(&path, 60);
    let reloaded = source.reload_if_changed().unwrap();
    let entry = reloaded.playable(Selection::new(0, 0)).unwrap();
    assert_eq!(entry.name, "B");
    assert_eq!(entry.kind, StationKind::Dir);
    assert!(source.reload_if_changed().is_none());
}

#[test]
fn broken_or_missing_file_keeps_previous_catalog() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("stations.yaml");
    std::fs::write(&path, "banks: {}\n").unwrap();
    touch(&path, 0);
    let mut source = CatalogSource::new(path.clone());
    assert!(source.load().is_empty());

    std::fs::write(&path, "banks: {0: [").unwrap();
    touch(&path, 30);
    assert!(source.reload_if_changed().is_none());

    std::fs::remove_file(&path).unwrap();
    assert!(source.reload_if_changed().is_none());
}

#[test]
fn missing_file_at_startup_is_an_empty_catalog() {
    let dir = TempDir::new().unwrap();
    let mut source = CatalogSource::new(dir.path().join("absent.yaml"));
    assert!(source.load().is_empty());
}

mod common;

use common::RecordingBackend;
use radio_proto::catalog::{StationEntry, StationKind};
use radio_proto::playback::{start_entry, MediaLibrary, PlaybackError};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Duration;
use tempfile::TempDir;

fn entry(kind: StationKind, target: &str) -> StationEntry {
    StationEntry {
        name: "Test".into(),
        kind,
        target: target.into(),
    }
}

fn audio_root() -> (TempDir, MediaLibrary) {
    let dir = TempDir::new().unwrap();
    let library = MediaLibrary::new(dir.path().to_path_buf());
    (dir, library)
}

#[tokio::test]
async fn stream_is_clear_add_play() {
    let (_dir, library) = audio_root();
    let backend = RecordingBackend::default();
    let mut rng = StdRng::seed_from_u64(1);
    start_entry(
        &backend,
        &library,
        &entry(StationKind::Stream, " http://example.com/live "),
        Duration::ZERO,
        &mut rng,
    )
    .await
    .unwrap();
    assert_eq!(
        backend.calls(),
        vec!["clear", "add http://example.com/live", "play"]
    );
}

#[tokio::test]
async fn dir_enqueues_sorted_and_starts_at_random_track() {
    let (dir, library) = audio_root();
    let jazz = dir.path().join("jazz");
    std::fs::create_dir_all(jazz.join("Sub")).unwrap();
    std::fs::write(jazz.join("b.mp3"), b"").unwrap();
    std::fs::write(jazz.join("Sub/a.FLAC"), b"").unwrap();
    std::fs::write(jazz.join("C.ogg"), b"").unwrap();
    std::fs::write(jazz.join("notes.txt"), b"").unwrap();

    for seed in 0..20 {
        let backend = RecordingBackend::default();
        let mut rng = StdRng::seed_from_u64(seed);
        start_entry(
            &backend,
            &library,
            &entry(StationKind::Dir, "jazz/"),
            Duration::ZERO,
            &mut rng,
        )
        .await
        .unwrap();

        let calls = backend.calls();
        assert_eq!(
            &calls[..7],
            &[
                "clear",
                "repeat off",
                "single off",
                "random off",
                "add jazz/b.mp3",
                "add jazz/C.ogg",
                "add jazz/Sub/a.FLAC",
            ]
        );
        assert_eq!(calls.len(), 8);
        let start: usize = calls[7].strip_prefix("play ").unwrap().parse().unwrap();
        assert!((1..=3).contains(&start), "start index {}", start);
    }
}

#[tokio::test]
async fn file_loops_and_seeks_within_track() {
    let (dir, library) = audio_root();
    std::fs::write(dir.path().join("rain.mp3"), b"").unwrap();
    let backend = RecordingBackend::with_status(
        "Rain\n[playing] #1/1   0:00/1:40 (0%)\nvolume: 60%   repeat: on",
    );
    let mut rng = StdRng::seed_from_u64(7);
    start_entry(
        &backend,
        &library,
        &entry(StationKind::File, "rain.mp3"),
        Duration::ZERO,
        &mut rng,
    )
    .await
    .unwrap();

    let calls = backend.calls();
    assert_eq!(
        &calls[..8],
        &[
            "clear",
            "repeat off",
            "single off",
            "random off",
            "add rain.mp3",
            "repeat on",
            "play",
            "status",
        ]
    );
    let offset: u32 = calls[8].strip_prefix("seek ").unwrap().parse().unwrap();
    assert!(offset <= 95);
}

#[tokio::test]
async fn short_file_is_not_seeked() {
    let (dir, library) = audio_root();
    std::fs::write(dir.path().join("blip.wav"), b"").unwrap();
    let backend = RecordingBackend::with_status("Blip\n[playing] #1/1   0:00/0:08 (0%)");
    let mut rng = StdRng::seed_from_u64(3);
    start_entry(
        &backend,
        &library,
        &entry(StationKind::File, "blip.wav"),
        Duration::ZERO,
        &mut rng,
    )
    .await
    .unwrap();
    assert!(!backend.calls().iter().any(|c| c.starts_with("seek")));
}

#[tokio::test]
async fn missing_targets_issue_no_commands() {
    let (dir, library) = audio_root();
    std::fs::create_dir(dir.path().join("empty")).unwrap();
    let backend = RecordingBackend::default();
    let mut rng = StdRng::seed_from_u64(0);

    let err = start_entry(
        &backend,
        &library,
        &entry(StationKind::File, "nope.mp3"),
        Duration::ZERO,
        &mut rng,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, PlaybackError::FileNotFound(_)));

    let err = start_entry(
        &backend,
        &library,
        &entry(StationKind::Dir, "empty"),
        Duration::ZERO,
        &mut rng,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, PlaybackError::EmptyDir(_)));

    let err = start_entry(
        &backend,
        &library,
        &entry(StationKind::Dir, "missing"),
        Duration::ZERO,
        &mut rng,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, PlaybackError::DirNotFound(_)));
    assert!(backend.calls().is_empty());
}

#[test]
fn absolute_targets_bypass_the_root() {
    let (dir, library) = audio_root();
    assert_eq!(library.resolve("/srv/music/x.mp3").to_str(), Some("/srv/music/x.mp3"));
    assert_eq!(library.resolve(" jazz "), dir.path().join("jazz"));
}

#[test]
fn scan_does_not_follow_directory_links() {
    let (dir, library) = audio_root();
    let jazz = dir.path().join("jazz");
    std::fs::create_dir(&jazz).unwrap();
    std::fs::write(jazz.join("a.mp3"), b"").unwrap();
    std::os::unix::fs::symlink(&jazz, jazz.join("again")).unwrap();
    std::fs::write(dir.path().join("b.mp3"), b"").unwrap();
    std::os::unix::fs::symlink(dir.path().join("b.mp3"), jazz.join("linked.mp3")).unwrap();

    let files = library.scan_dir(&jazz).unwrap();
    assert_eq!(files, vec![jazz.join("a.mp3"), jazz.join("linked.mp3")]);
}

//! Per-kind playback sequences.
//!
//! * stream: `clear, add url, play`
//! * file:   loop one track from a random offset
//! * dir:    queue every audio file in sorted order, start at a random track
//!
//! Shared by the hardware daemon and the web surface so both start a station
//! the same way.

use rand::Rng;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use walkdir::WalkDir;

use crate::catalog::{StationEntry, StationKind};
use crate::platform;
use crate::player::Backend;

/// Seeking is skipped for tracks this short (seconds).
const MIN_SEEK_DURATION: u32 = 10;
/// Random offsets stay this far from the end of the track (seconds).
const SEEK_END_MARGIN: u32 = 5;

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("file not found: {0}")]
    FileNotFound(PathBuf),
    #[error("directory not found: {0}")]
    DirNotFound(PathBuf),
    #[error("no audio files in {0}")]
    EmptyDir(PathBuf),
    #[error("cannot scan {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

/// Local audio files, rooted at the backend's music directory.
#[derive(Debug, Clone)]
pub struct MediaLibrary {
    root: PathBuf,
}

impl MediaLibrary {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Relative targets live under the root; absolute ones are taken as-is.
    pub fn resolve(&self, raw: &str) -> PathBuf {
        let raw = raw.trim();
        if raw.starts_with('/') {
            PathBuf::from(raw)
        } else {
            self.root.join(raw)
        }
    }

    /// URI for the backend: the path relative to the music root.
    pub fn backend_uri(&self, path: &Path) -> String {
        let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let root = self
            .root
            .canonicalize()
            .unwrap_or_else(|_| self.root.clone());
        match canonical.strip_prefix(&root) {
            Ok(rel) => rel.to_string_lossy().into_owned(),
            Err(_) => {
                error!("Path outside audio root: {}", path.display());
                path.to_string_lossy().into_owned()
            }
        }
    }

    /// Every audio file below `dir`, recursively, ordered by lower-cased full
    /// path.  Directory symlinks are not descended; symlinks to files count.
    pub fn scan_dir(&self, dir: &Path) -> Result<Vec<PathBuf>, PlaybackError> {
        let mut files = Vec::new();
        for entry in WalkDir::new(dir).min_depth(1) {
            let entry = entry.map_err(|source| PlaybackError::Scan {
                path: source.path().unwrap_or(dir).to_path_buf(),
                source,
            })?;
            let is_file = entry.file_type().is_file()
                || (entry.path_is_symlink() && entry.path().is_file());
            if is_file && platform::is_audio_file(entry.path()) {
                files.push(entry.into_path());
            }
        }
        files.sort_by_cached_key(|p| p.to_string_lossy().to_lowercase());
        Ok(files)
    }
}

/// Start `entry` on the backend using the fixed per-kind sequence.
pub async fn start_entry<B: Backend, R: Rng>(
    backend: &B,
    library: &MediaLibrary,
    entry: &StationEntry,
    settle: Duration,
    rng: &mut R,
) -> Result<(), PlaybackError> {
    info!("▶ {} [{}]", entry.name, entry.kind.as_str());
    match entry.kind {
        StationKind::Stream => {
            play_stream(backend, &entry.target).await;
            Ok(())
        }
        StationKind::File => play_file(backend, library, &entry.target, settle, rng).await,
        StationKind::Dir => play_dir(backend, library, &entry.target, rng).await,
    }
}

pub async fn play_stream<B: Backend>(backend: &B, url: &str) {
    info!("Playing stream: {}", url);
    backend.clear().await;
    backend.enqueue(url.trim()).await;
    backend.play(None).await;
}

async fn reset_modes<B: Backend>(backend: &B) {
    backend.clear().await;
    backend.set_repeat(false).await;
    backend.set_single(false).await;
    backend.set_random(false).await;
}

/// Loop a single track, then jump to a random point in it.
pub async fn play_file<B: Backend, R: Rng>(
    backend: &B,
    library: &MediaLibrary,
    target: &str,
    settle: Duration,
    rng: &mut R,
) -> Result<(), PlaybackError> {
    let resolved = library.resolve(target);
    if !resolved.is_file() {
        return Err(PlaybackError::FileNotFound(resolved));
    }
    let uri = library.backend_uri(&resolved);
    info!("Playing file (loop): {}", uri);

    reset_modes(backend).await;
    backend.enqueue(&uri).await;
    backend.set_repeat(true).await;
    backend.play(None).await;

    if !settle.is_zero() {
        tokio::time::sleep(settle).await;
    }
    seek_random(backend, rng).await;
    Ok(())
}

/// Seek to a uniformly random offset in `[0, duration - 5]`, only for tracks
/// longer than ten seconds.
async fn seek_random<B: Backend, R: Rng>(backend: &B, rng: &mut R) {
    let status = backend.status().await;
    let Some(total) = status.duration_secs else {
        return;
    };
    if total > MIN_SEEK_DURATION {
        let target = rng.gen_range(0..=total - SEEK_END_MARGIN);
        backend.seek(target).await;
    }
}

/// Queue a whole directory in sorted order and start at a random track.
pub async fn play_dir<B: Backend, R: Rng>(
    backend: &B,
    library: &MediaLibrary,
    target: &str,
    rng: &mut R,
) -> Result<(), PlaybackError> {
    let resolved = library.resolve(target);
    if !resolved.is_dir() {
        return Err(PlaybackError::DirNotFound(resolved));
    }
    let files = library.scan_dir(&resolved)?;
    if files.is_empty() {
        return Err(PlaybackError::EmptyDir(resolved));
    }

    info!(
        "Playing directory: {} ({} files)",
        resolved.display(),
        files.len()
    );
    reset_modes(backend).await;
    for f in &files {
        backend.enqueue(&library.backend_uri(f)).await;
    }

    let start = rng.gen_range(1..=files.len());
    backend.play(Some(start)).await;
    Ok(())
}

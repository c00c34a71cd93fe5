//! Durable `{volume, bank, station}` that survives power loss.
//!
//! Every save goes to a temp file in the target directory, is fsynced, renamed
//! over the target and followed by a directory fsync.  The same state is then
//! written to a backup path.  Loading tries primary then backup and only
//! accepts a copy whose fields pass range validation.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::catalog::{Selection, UNSET};

pub const VOLUME_MIN: u8 = 0;
pub const VOLUME_MAX: u8 = 100;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid json in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid state data in {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },
}

/// What is on disk.  Never written unless every field is in range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
    pub volume: u8,
    pub bank: i8,
    pub station: i8,
    /// Unix seconds of the save; last writer wins.
    pub timestamp: i64,
}

impl PersistedState {
    pub fn new(volume: u8, selection: Selection) -> Self {
        Self {
            volume,
            bank: selection.bank,
            station: selection.station,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn selection(&self) -> Selection {
        Selection::new(self.bank, self.station)
    }

    fn check(&self) -> Result<(), String> {
        if !(VOLUME_MIN..=VOLUME_MAX).contains(&self.volume) {
            return Err(format!("volume {} out of range", self.volume));
        }
        if !(UNSET..=9).contains(&self.bank) || !(UNSET..=9).contains(&self.station) {
            return Err(format!(
                "bank/station {}/{} out of range",
                self.bank, self.station
            ));
        }
        Ok(())
    }
}

/// Loose shape used while validating a file: all three fields must be present
/// and integral, ranges are checked afterwards.
#[derive(Debug, Deserialize)]
struct StoredState {
    volume: i64,
    bank: i64,
    station: i64,
    #[serde(default)]
    timestamp: Option<i64>,
}

impl StoredState {
    fn validate(self) -> Result<PersistedState, String> {
        let volume = u8::try_from(self.volume)
            .ok()
            .filter(|v| *v <= VOLUME_MAX)
            .ok_or_else(|| format!("volume {} out of range", self.volume))?;
        let slot = |v: i64, what: &str| {
            i8::try_from(v)
                .ok()
                .filter(|v| (UNSET..=9).contains(v))
                .ok_or_else(|| format!("{} {} out of range", what, v))
        };
        Ok(PersistedState {
            volume,
            bank: slot(self.bank, "bank")?,
            station: slot(self.station, "station")?,
            timestamp: self.timestamp.unwrap_or(0),
        })
    }
}

pub struct StateStore {
    primary: PathBuf,
    backup: PathBuf,
}

impl StateStore {
    pub fn new(primary: PathBuf, backup: PathBuf) -> Self {
        Self { primary, backup }
    }

    pub fn primary(&self) -> &Path {
        &self.primary
    }

    pub fn backup(&self) -> &Path {
        &self.backup
    }

    /// Write primary, then backup.  On error the committed files are left
    /// as they were and the temp file is removed.
    pub fn save(&self, volume: u8, selection: Selection) -> Result<PersistedState, StateError> {
        let state = PersistedState::new(volume, selection);
        state.check().map_err(|reason| StateError::Invalid {
            path: self.primary.clone(),
            reason,
        })?;
        let json = serde_json::to_vec(&state).map_err(|source| StateError::Json {
            path: self.primary.clone(),
            source,
        })?;
        atomic_write(&self.primary, &json)?;
        atomic_write(&self.backup, &json)?;
        Ok(state)
    }

    /// First valid copy of primary, backup; `None` when neither is usable.
    pub fn load(&self) -> Option<PersistedState> {
        for path in [&self.primary, &self.backup] {
            if !path.exists() {
                continue;
            }
            match read_state(path) {
                Ok(state) => {
                    info!(
                        "Restored state from {}: volume={} bank={} station={}",
                        path.display(),
                        state.volume,
                        state.bank,
                        state.station
                    );
                    return Some(state);
                }
                Err(e) => warn!("Could not load {}: {}", path.display(), e),
            }
        }
        None
    }
}

pub fn read_state(path: &Path) -> Result<PersistedState, StateError> {
    let content = std::fs::read(path).map_err(|source| StateError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let stored: StoredState =
        serde_json::from_slice(&content).map_err(|source| StateError::Json {
            path: path.to_path_buf(),
            source,
        })?;
    stored.validate().map_err(|reason| StateError::Invalid {
        path: path.to_path_buf(),
        reason,
    })
}

/// Temp file in the same directory → fsync → rename → fsync directory.
fn atomic_write(path: &Path, contents: &[u8]) -> Result<(), StateError> {
    let io_err = |source| StateError::Io {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(io_err)?;

    // Dropping the NamedTempFile on any early return deletes it.
    let mut tmp = tempfile::Builder::new()
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(io_err)?;
    tmp.write_all(contents).map_err(io_err)?;
    tmp.flush().map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;

    File::open(dir).and_then(|d| d.sync_all()).map_err(io_err)?;
    Ok(())
}

//! Station catalog: `(bank, station) -> StationEntry`.
//!
//! The source file looks like
//!
//! ```yaml
//! banks:
//!   0:
//!     name: Radio
//!     stations:
//!       0: { name: FIP, type: stream, url: "http://icecast.radiofrance.fr/fip-hifi.aac" }
//!       1: { name: Jazz, type: dir, path: jazz/ }
//! ```
//!
//! Every entry is validated once at load time.  A malformed entry stays in the
//! catalog as its error so lookups can report why nothing plays.

use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;
use tracing::{error, info, warn};

/// Sentinel for "no valid switch reading yet" / "nothing playing".
pub const UNSET: i8 = -1;

/// A bank/station pair as read from the selector switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Selection {
    pub bank: i8,
    pub station: i8,
}

impl Selection {
    pub const NONE: Selection = Selection {
        bank: UNSET,
        station: UNSET,
    };

    pub fn new(bank: i8, station: i8) -> Self {
        Self { bank, station }
    }

    /// Both halves are real slots in `[0, 9]`.
    pub fn is_set(&self) -> bool {
        (0..=9).contains(&self.bank) && (0..=9).contains(&self.station)
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bank={} station={}", self.bank, self.station)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StationKind {
    Stream,
    File,
    Dir,
}

const FILE_ALIASES: [&str; 3] = ["mp3_loop_random_start", "file_loop_random_start", "file_loop"];
const DIR_ALIASES: [&str; 3] = [
    "mp3_dir_random_start_then_in_order",
    "dir_random_start_then_in_order",
    "directory",
];

impl StationKind {
    /// Accepts the canonical names plus the legacy aliases.  Returns the kind
    /// and whether a legacy alias was used.
    pub fn parse(raw: &str) -> Result<(Self, bool), CatalogError> {
        let name = raw.trim().to_lowercase();
        match name.as_str() {
            "stream" => Ok((StationKind::Stream, false)),
            "file" => Ok((StationKind::File, false)),
            "dir" => Ok((StationKind::Dir, false)),
            n if FILE_ALIASES.contains(&n) => Ok((StationKind::File, true)),
            n if DIR_ALIASES.contains(&n) => Ok((StationKind::Dir, true)),
            _ => Err(CatalogError::UnsupportedKind(name)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StationKind::Stream => "stream",
            StationKind::File => "file",
            StationKind::Dir => "dir",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationEntry {
    pub name: String,
    pub kind: StationKind,
    /// Stream URL, or a path (relative to the audio root or absolute).
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("cannot read {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },
    #[error("cannot parse station catalog: {0}")]
    Parse(String),
    #[error("malformed station entry: {0}")]
    Malformed(String),
    #[error("station '{0}' has no target")]
    MissingTarget(String),
    #[error("unsupported station kind '{0}'")]
    UnsupportedKind(String),
}

/// Raw shape of one station table before validation.
#[derive(Debug, Default, Deserialize)]
struct RawStation {
    #[serde(default)]
    name: Option<Value>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    file: Option<String>,
    #[serde(default)]
    directory: Option<String>,
    #[serde(default)]
    dir: Option<String>,
}

/// Names may be written unquoted, so `1990` or `true` arrive as non-strings.
fn scalar_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn first_non_empty<'a>(
    candidates: impl IntoIterator<Item = &'a Option<String>>,
) -> Option<&'a str> {
    candidates
        .into_iter()
        .filter_map(|c| c.as_deref())
        .map(str::trim)
        .find(|s| !s.is_empty())
}

impl StationEntry {
    fn from_value(value: &Value, slot: Selection) -> Result<Self, CatalogError> {
        if !value.is_mapping() {
            return Err(CatalogError::Malformed(format!("{} is not a table", slot)));
        }
        let raw: RawStation = serde_yaml::from_value(value.clone())
            .map_err(|e| CatalogError::Malformed(format!("{}: {}", slot, e)))?;

        let name = raw
            .name
            .as_ref()
            .and_then(scalar_text)
            .unwrap_or_else(|| format!("Bank {} / Station {}", slot.bank, slot.station));

        let (kind, legacy) = StationKind::parse(raw.kind.as_deref().unwrap_or(""))?;
        let target = match (kind, legacy) {
            (StationKind::Stream, _) => first_non_empty([&raw.url]),
            (_, false) => first_non_empty([&raw.path]),
            (StationKind::File, true) => first_non_empty([&raw.path, &raw.file]),
            (StationKind::Dir, true) => {
                first_non_empty([&raw.path, &raw.directory, &raw.dir])
            }
        }
        .ok_or_else(|| CatalogError::MissingTarget(name.clone()))?
        .to_string();

        Ok(Self { name, kind, target })
    }
}

/// Immutable snapshot of the station file.  Replaced wholesale on reload.
#[derive(Debug, Clone, Default)]
pub struct StationCatalog {
    entries: BTreeMap<Selection, Result<StationEntry, CatalogError>>,
    bank_names: BTreeMap<i8, String>,
}

fn slot_key(key: &Value) -> Option<i8> {
    let n = match key {
        Value::Number(n) => n.as_u64()?,
        Value::String(s) => s.trim().parse::<u64>().ok()?,
        _ => return None,
    };
    (n <= 9).then_some(n as i8)
}

fn as_mapping<'a>(value: &'a Value, key: &str) -> Option<&'a Mapping> {
    value.get(key).and_then(Value::as_mapping)
}

impl StationCatalog {
    /// Parse YAML, or TOML when `is_toml` is set.
    pub fn parse(content: &str, is_toml: bool) -> Result<Self, CatalogError> {
        let doc: Value = if is_toml {
            let table: toml::Value =
                toml::from_str(content).map_err(|e| CatalogError::Parse(e.to_string()))?;
            serde_yaml::to_value(table).map_err(|e| CatalogError::Parse(e.to_string()))?
        } else {
            serde_yaml::from_str(content).map_err(|e| CatalogError::Parse(e.to_string()))?
        };
        Ok(Self::from_document(&doc))
    }

    fn from_document(doc: &Value) -> Self {
        let mut catalog = Self::default();
        let Some(banks) = as_mapping(doc, "banks") else {
            if !doc.is_null() {
                warn!("Station catalog has no 'banks' table");
            }
            return catalog;
        };

        for (bank_key, bank) in banks {
            let Some(bank_id) = slot_key(bank_key) else {
                warn!("Ignoring bank key {:?} (expected 0-9)", bank_key);
                continue;
            };
            if let Some(name) = bank.get("name").and_then(scalar_text) {
                catalog.bank_names.insert(bank_id, name);
            }
            let Some(stations) = as_mapping(bank, "stations") else {
                continue;
            };
            for (station_key, station) in stations {
                let Some(station_id) = slot_key(station_key) else {
                    warn!(
                        "Ignoring station key {:?} in bank {} (expected 0-9)",
                        station_key, bank_id
                    );
                    continue;
                };
                let slot = Selection::new(bank_id, station_id);
                catalog
                    .entries
                    .insert(slot, StationEntry::from_value(station, slot));
            }
        }
        catalog
    }

    /// Look up a slot.  `Ok(None)` means nothing is configured there, which is
    /// not an error; `Err` means an entry exists but cannot be played.
    pub fn resolve(&self, selection: Selection) -> Result<Option<&StationEntry>, CatalogError> {
        match self.entries.get(&selection) {
            None => Ok(None),
            Some(Ok(entry)) => Ok(Some(entry)),
            Some(Err(e)) => Err(e.clone()),
        }
    }

    /// Like [`resolve`](Self::resolve) but logs an unusable entry and folds it
    /// into "absent".
    pub fn playable(&self, selection: Selection) -> Option<&StationEntry> {
        match self.resolve(selection) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Station {} unusable: {}", selection, e);
                None
            }
        }
    }

    pub fn kind_of(&self, selection: Selection) -> Option<StationKind> {
        self.entries
            .get(&selection)
            .and_then(|e| e.as_ref().ok())
            .map(|e| e.kind)
    }

    /// Well-formed entries in bank/station order.
    pub fn iter(&self) -> impl Iterator<Item = (Selection, &StationEntry)> {
        self.entries
            .iter()
            .filter_map(|(slot, e)| e.as_ref().ok().map(|e| (*slot, e)))
    }

    /// Entries that failed validation.
    pub fn invalid(&self) -> impl Iterator<Item = (Selection, &CatalogError)> {
        self.entries
            .iter()
            .filter_map(|(slot, e)| e.as_ref().err().map(|e| (*slot, e)))
    }

    pub fn bank_name(&self, bank: i8) -> Option<&str> {
        self.bank_names.get(&bank).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn is_toml_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("toml"))
        .unwrap_or(false)
}

pub fn load_catalog(path: &Path) -> Result<StationCatalog, CatalogError> {
    let content = std::fs::read_to_string(path).map_err(|e| CatalogError::Unreadable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    StationCatalog::parse(&content, is_toml_path(path))
}

/// The catalog file plus the modification time of the last load, for
/// throttled hot-reload checks.
pub struct CatalogSource {
    path: PathBuf,
    mtime: Option<SystemTime>,
}

impl CatalogSource {
    pub fn new(path: PathBuf) -> Self {
        Self { path, mtime: None }
    }

    fn current_mtime(&self) -> std::io::Result<SystemTime> {
        std::fs::metadata(&self.path)?.modified()
    }

    /// Initial load.  A missing or broken file yields an empty catalog.
    pub fn load(&mut self) -> StationCatalog {
        self.mtime = self.current_mtime().ok();
        match load_catalog(&self.path) {
            Ok(catalog) => {
                log_loaded(&catalog, &self.path);
                catalog
            }
            Err(e) => {
                error!("Station catalog not loaded: {}", e);
                StationCatalog::default()
            }
        }
    }

    /// Returns a fresh catalog when the file's mtime changed since the last
    /// load.  A vanished file or a parse failure keeps the previous catalog.
    pub fn reload_if_changed(&mut self) -> Option<StationCatalog> {
        let mtime = match self.current_mtime() {
            Ok(m) => m,
            Err(e) => {
                warn!("Cannot stat {}: {}", self.path.display(), e);
                return None;
            }
        };
        if self.mtime == Some(mtime) {
            return None;
        }
        self.mtime = Some(mtime);
        match load_catalog(&self.path) {
            Ok(catalog) => {
                info!("Reloaded {}", self.path.display());
                log_loaded(&catalog, &self.path);
                Some(catalog)
            }
            Err(e) => {
                warn!("Keeping previous station catalog: {}", e);
                None
            }
        }
    }
}

fn log_loaded(catalog: &StationCatalog, path: &Path) {
    info!(
        "Loaded {} station entries from {}",
        catalog.len(),
        path.display()
    );
    for (slot, e) in catalog.invalid() {
        warn!("Station {}: {}", slot, e);
    }
}

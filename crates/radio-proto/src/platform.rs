use std::path::{Path, PathBuf};

/// Environment variable that points at an alternate `config.toml`.
pub const CONFIG_ENV: &str = "RADIO_CONFIG";

pub fn data_dir() -> PathBuf {
    // ~/.local/share/radio/ (XDG standard)
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".local")
        .join("share")
        .join("radio")
}

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("radio")
}

/// Default music directory, shared with the backend's music root.
pub fn audio_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("audio")
}

fn find_on_path(name: &str) -> Option<PathBuf> {
    let path = std::env::var("PATH").ok()?;
    for dir in path.split(':') {
        let p = PathBuf::from(dir).join(name);
        if p.exists() {
            return Some(p);
        }
    }
    None
}

/// Resolve the backend client binary.
///
/// An explicit path (anything containing a `/`) is used as-is; a bare name is
/// searched on `PATH`, falling back to the bare name so the spawn error names
/// the missing program.
pub fn find_backend_binary(name: &str) -> PathBuf {
    if name.contains('/') {
        return PathBuf::from(name);
    }
    find_on_path(name).unwrap_or_else(|| PathBuf::from(name))
}

/// True when `path` carries one of the audio extensions the players accept.
pub fn is_audio_file(path: &Path) -> bool {
    const AUDIO_EXTS: [&str; 6] = ["mp3", "flac", "ogg", "m4a", "wav", "aac"];
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| AUDIO_EXTS.iter().any(|x| x.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::platform;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub pins: PinsConfig,
    #[serde(default)]
    pub encoder: EncoderConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub volume: VolumeConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Files shared between the daemon, the web surface and the player backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Station catalog (`.yaml`, or `.toml` by extension).
    #[serde(default = "default_stations")]
    pub stations: PathBuf,
    /// Root that relative station paths resolve against.  Must match the
    /// backend's music directory so relative URIs line up.
    #[serde(default = "platform::audio_dir")]
    pub audio_root: PathBuf,
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
    #[serde(default = "default_state_backup_file")]
    pub state_backup_file: PathBuf,
}

/// BCM pin numbers of the selector switches, bit0 first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PinsConfig {
    #[serde(default = "default_station_pins")]
    pub station: [u32; 4],
    #[serde(default = "default_bank_pins")]
    pub bank: [u32; 4],
    #[serde(default = "default_play_pause_pin")]
    pub play_pause: u32,
    /// Offset of the gpiochip in sysfs numbering (512 on recent Pi kernels).
    #[serde(default)]
    pub sysfs_base: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderConfig {
    #[serde(default = "default_i2c_bus")]
    pub i2c_bus: PathBuf,
    #[serde(default = "default_encoder_address")]
    pub address: u16,
    /// Button pin on the seesaw chip, not a host GPIO.
    #[serde(default = "default_play_pause_pin")]
    pub button_pin: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_watchdog_interval_secs")]
    pub watchdog_interval_secs: u64,
    #[serde(default = "default_watchdog_grace_secs")]
    pub watchdog_grace_secs: u64,
    #[serde(default = "default_state_save_interval_secs")]
    pub state_save_interval_secs: u64,
    #[serde(default = "default_config_check_interval_secs")]
    pub config_check_interval_secs: u64,
    #[serde(default = "default_seek_settle_ms")]
    pub seek_settle_ms: u64,
    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeConfig {
    /// Percent per encoder click.
    #[serde(default = "default_volume_step")]
    pub step: u8,
    #[serde(default = "default_volume")]
    pub default: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_backend_binary")]
    pub binary: String,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default = "default_backend_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_startup_retries")]
    pub startup_retries: u32,
    #[serde(default = "default_startup_retry_delay_secs")]
    pub startup_retry_delay_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_web_port")]
    pub port: u16,
    #[serde(default = "default_web_volume_step")]
    pub volume_step: u8,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Append logs here in addition to stderr.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            stations: default_stations(),
            audio_root: platform::audio_dir(),
            state_file: default_state_file(),
            state_backup_file: default_state_backup_file(),
        }
    }
}

impl Default for PinsConfig {
    fn default() -> Self {
        Self {
            station: default_station_pins(),
            bank: default_bank_pins(),
            play_pause: default_play_pause_pin(),
            sysfs_base: 0,
        }
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            i2c_bus: default_i2c_bus(),
            address: default_encoder_address(),
            button_pin: default_play_pause_pin(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            debounce_ms: default_debounce_ms(),
            watchdog_interval_secs: default_watchdog_interval_secs(),
            watchdog_grace_secs: default_watchdog_grace_secs(),
            state_save_interval_secs: default_state_save_interval_secs(),
            config_check_interval_secs: default_config_check_interval_secs(),
            seek_settle_ms: default_seek_settle_ms(),
            error_backoff_ms: default_error_backoff_ms(),
        }
    }
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            step: default_volume_step(),
            default: default_volume(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            binary: default_backend_binary(),
            host: None,
            port: None,
            timeout_secs: default_backend_timeout_secs(),
            startup_retries: default_startup_retries(),
            startup_retry_delay_secs: default_startup_retry_delay_secs(),
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_web_port(),
            volume_step: default_web_volume_step(),
        }
    }
}

fn default_stations() -> PathBuf {
    platform::config_dir().join("stations.yaml")
}

fn default_state_file() -> PathBuf {
    platform::data_dir().join("state.json")
}

fn default_state_backup_file() -> PathBuf {
    platform::data_dir().join("state.backup.json")
}

fn default_station_pins() -> [u32; 4] {
    [9, 10, 22, 17]
}

fn default_bank_pins() -> [u32; 4] {
    [13, 6, 5, 11]
}

fn default_play_pause_pin() -> u32 {
    24
}

fn default_i2c_bus() -> PathBuf {
    PathBuf::from("/dev/i2c-1")
}

fn default_encoder_address() -> u16 {
    0x36
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_debounce_ms() -> u64 {
    150
}

fn default_watchdog_interval_secs() -> u64 {
    10
}

fn default_watchdog_grace_secs() -> u64 {
    15
}

fn default_state_save_interval_secs() -> u64 {
    5
}

fn default_config_check_interval_secs() -> u64 {
    30
}

fn default_seek_settle_ms() -> u64 {
    300
}

fn default_error_backoff_ms() -> u64 {
    1000
}

fn default_volume_step() -> u8 {
    4
}

fn default_volume() -> u8 {
    60
}

fn default_backend_binary() -> String {
    "mpc".to_string()
}

fn default_backend_timeout_secs() -> u64 {
    10
}

fn default_startup_retries() -> u32 {
    15
}

fn default_startup_retry_delay_secs() -> u64 {
    2
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_web_port() -> u16 {
    8080
}

fn default_web_volume_step() -> u8 {
    5
}

impl TimingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_secs(self.watchdog_interval_secs)
    }

    pub fn watchdog_grace(&self) -> Duration {
        Duration::from_secs(self.watchdog_grace_secs)
    }

    pub fn state_save_interval(&self) -> Duration {
        Duration::from_secs(self.state_save_interval_secs)
    }

    pub fn config_check_interval(&self) -> Duration {
        Duration::from_secs(self.config_check_interval_secs)
    }

    pub fn seek_settle(&self) -> Duration {
        Duration::from_millis(self.seek_settle_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }
}

impl BackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn startup_retry_delay(&self) -> Duration {
        Duration::from_secs(self.startup_retry_delay_secs)
    }
}

impl WebConfig {
    /// Apply the `RADIO_WEB_HOST` / `RADIO_WEB_PORT` overrides.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(host) = std::env::var("RADIO_WEB_HOST") {
            if !host.trim().is_empty() {
                self.bind_address = host.trim().to_string();
            }
        }
        if let Ok(port) = std::env::var("RADIO_WEB_PORT") {
            match port.trim().parse() {
                Ok(p) => self.port = p,
                Err(_) => tracing::warn!("Ignoring invalid RADIO_WEB_PORT={:?}", port),
            }
        }
        self
    }
}

impl Config {
    /// Load from `$RADIO_CONFIG` or the default location, writing defaults
    /// out when no file exists yet.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(config_path: &Path) -> anyhow::Result<Self> {
        if !config_path.exists() {
            let config = Self::default();
            config.save_to(config_path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(config_path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to(&self, config_path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        match std::env::var_os(platform::CONFIG_ENV) {
            Some(p) if !p.is_empty() => PathBuf::from(p),
            _ => platform::config_dir().join("config.toml"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            pins: PinsConfig::default(),
            encoder: EncoderConfig::default(),
            timing: TimingConfig::default(),
            volume: VolumeConfig::default(),
            backend: BackendConfig::default(),
            web: WebConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.pins.station, [9, 10, 22, 17]);
        assert_eq!(config.pins.bank, [13, 6, 5, 11]);
        assert_eq!(config.encoder.address, 0x36);
        assert_eq!(config.timing.debounce(), Duration::from_millis(150));
        assert_eq!(config.timing.watchdog_grace(), Duration::from_secs(15));
        assert_eq!(config.volume.step, 4);
        assert_eq!(config.volume.default, 60);
        assert!(config.paths.stations.ends_with("radio/stations.yaml"));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [timing]
            debounce_ms = 80

            [backend]
            host = "radio.local"
            "#,
        )
        .unwrap();
        assert_eq!(config.timing.debounce_ms, 80);
        assert_eq!(config.timing.poll_interval_ms, 100);
        assert_eq!(config.backend.host.as_deref(), Some("radio.local"));
        assert_eq!(config.backend.binary, "mpc");
        assert_eq!(config.web.port, 8080);
    }

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.timing.state_save_interval_secs, 5);

        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.pins.play_pause, 24);
    }
}

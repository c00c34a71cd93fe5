/// ControlLoop: single owner of all control state.
///
/// One cooperative loop on a fixed poll interval.  Each tick reads the
/// switches and the encoder, hands stable changes to the [`Orchestrator`],
/// and runs four throttled side jobs off the same clock:
///
/// ```text
///   every tick          sd_notify keepalive
///   config_check        catalog hot-reload (mtime)
///   watchdog interval   backend status → StreamWatchdog (streams only)
///   state_save          flush dirty state to the StateStore
/// ```
///
/// Nothing else mutates the catalog or the selection/playback state; the web
/// surface only meets the daemon through the catalog file, the state files
/// and the backend.
use anyhow::Context;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use radio_proto::catalog::{CatalogSource, Selection, StationCatalog, StationKind};
use radio_proto::config::{Config, PinsConfig};
use radio_proto::playback::MediaLibrary;
use radio_proto::player::Backend;
use radio_proto::state::{StateStore, VOLUME_MAX};

use crate::debounce::{initial_selection, SwitchDebouncer};
use crate::hardware::{read_bcd, Hardware, Level};
use crate::notify::Notifier;
use crate::orchestrator::{Orchestrator, Playback};
use crate::watchdog::{StreamWatchdog, Verdict, WatchdogState};

// ── ControlState ──────────────────────────────────────────────────────────────

/// Everything the orchestrator reads and writes between ticks.
#[derive(Debug, Clone)]
pub struct ControlState {
    /// What the switches show (after debounce).
    pub selection: Selection,
    /// What drives the backend.
    pub playback: Playback,
    pub play_enabled: bool,
    pub volume: u8,
    pub watchdog: WatchdogState,
    /// Set on every volume or identity change; cleared by a successful save.
    pub dirty: bool,
}

impl Default for ControlState {
    fn default() -> Self {
        Self {
            selection: Selection::NONE,
            playback: Playback::Stopped,
            play_enabled: false,
            volume: 0,
            watchdog: WatchdogState::default(),
            dirty: false,
        }
    }
}

/// "Elapsed since last run ≥ interval" timer sharing the loop's clock.
struct Every {
    interval: Duration,
    last: Instant,
}

impl Every {
    fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            last: now,
        }
    }

    fn due(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.last) >= self.interval {
            self.last = now;
            true
        } else {
            false
        }
    }
}

// ── ControlLoop ───────────────────────────────────────────────────────────────

pub struct ControlLoop<H: Hardware, B: Backend> {
    hw: H,
    backend: B,
    pins: PinsConfig,
    store: StateStore,
    source: CatalogSource,
    catalog: StationCatalog,
    debouncer: SwitchDebouncer,
    orchestrator: Orchestrator,
    watchdog: StreamWatchdog,
    notifier: Notifier,
    state: ControlState,
    last_encoder: i32,
    last_button: Level,
    config_check: Every,
    state_save: Every,
    poll_interval: Duration,
    error_backoff: Duration,
}

impl<H: Hardware, B: Backend> ControlLoop<H, B> {
    /// Restore state, read the switches, push the volume and start whatever
    /// is selected.  Sends READY once done.
    pub async fn start(
        config: &Config,
        mut hw: H,
        backend: B,
        notifier: Notifier,
        now: Instant,
    ) -> anyhow::Result<Self> {
        let store = StateStore::new(
            config.paths.state_file.clone(),
            config.paths.state_backup_file.clone(),
        );
        let saved = store.load();
        if saved.is_none() {
            info!("No saved state, starting from defaults");
        }

        let mut source = CatalogSource::new(config.paths.stations.clone());
        let catalog = source.load();

        let pins = config.pins.clone();
        let raw_bank = read_bcd(&mut hw, &pins.bank).context("reading bank switch")?;
        let raw_station = read_bcd(&mut hw, &pins.station).context("reading station switch")?;
        let selection = initial_selection(raw_bank, raw_station, saved.map(|s| s.selection()));
        let play_enabled = hw
            .read_pin(pins.play_pause)
            .context("reading play switch")?
            == Level::High;
        let last_encoder = hw.encoder_position().context("reading encoder")?;
        let last_button = hw.encoder_button().context("reading encoder button")?;
        info!(
            "Switches: {} (raw {}/{}), play {}",
            selection,
            raw_bank,
            raw_station,
            if play_enabled { "on" } else { "off" }
        );

        let volume = saved
            .map(|s| s.volume)
            .unwrap_or(config.volume.default)
            .min(VOLUME_MAX);
        backend.set_volume(volume).await;
        info!("Volume: {}", volume);

        let timing = &config.timing;
        let mut control = Self {
            hw,
            backend,
            pins,
            store,
            source,
            catalog,
            debouncer: SwitchDebouncer::new(timing.debounce(), selection),
            orchestrator: Orchestrator::new(
                MediaLibrary::new(config.paths.audio_root.clone()),
                timing.seek_settle(),
                config.volume.step,
            ),
            watchdog: StreamWatchdog::new(timing.watchdog_interval(), timing.watchdog_grace()),
            notifier,
            state: ControlState {
                selection,
                play_enabled,
                volume,
                ..ControlState::default()
            },
            last_encoder,
            last_button,
            config_check: Every::new(timing.config_check_interval(), now),
            state_save: Every::new(timing.state_save_interval(), now),
            poll_interval: timing.poll_interval(),
            error_backoff: timing.error_backoff(),
        };

        if play_enabled {
            control
                .orchestrator
                .start(&mut control.state, &control.backend, &control.catalog, selection)
                .await;
        } else {
            control.backend.pause().await;
        }
        control.state.dirty = true;

        control.notifier.ready();
        info!("Control loop ready");
        Ok(control)
    }

    /// One poll.  GPIO failures abort the tick; encoder and backend trouble
    /// only costs this tick's reading.
    pub async fn tick(&mut self, now: Instant) -> anyhow::Result<()> {
        self.notifier.keepalive();

        if self.config_check.due(now) {
            if let Some(catalog) = self.source.reload_if_changed() {
                self.catalog = catalog;
            }
        }

        self.poll_switches(now).await?;
        self.poll_encoder().await;
        self.check_stream(now).await;

        if self.state.dirty && self.state_save.due(now) {
            self.save_state();
        }
        Ok(())
    }

    async fn poll_switches(&mut self, now: Instant) -> anyhow::Result<()> {
        let raw_bank = read_bcd(&mut self.hw, &self.pins.bank).context("reading bank switch")?;
        let raw_station =
            read_bcd(&mut self.hw, &self.pins.station).context("reading station switch")?;
        if let Some(selection) = self.debouncer.sample(raw_bank, raw_station, now) {
            info!("Selection → {}", selection);
            self.state.selection = selection;
            self.orchestrator
                .on_selection_changed(&mut self.state, &self.backend, &self.catalog)
                .await;
        }

        let play_enabled = self
            .hw
            .read_pin(self.pins.play_pause)
            .context("reading play switch")?
            == Level::High;
        if play_enabled != self.state.play_enabled {
            self.orchestrator
                .on_play_switch(&mut self.state, &self.backend, &self.catalog, play_enabled)
                .await;
        }
        Ok(())
    }

    async fn poll_encoder(&mut self) {
        match self.hw.encoder_position() {
            Ok(position) => {
                let delta = position.wrapping_sub(self.last_encoder);
                self.last_encoder = position;
                self.orchestrator
                    .on_encoder(&mut self.state, &self.backend, delta)
                    .await;
            }
            Err(e) => warn!("Encoder read failed: {}", e),
        }

        match self.hw.encoder_button() {
            Ok(level) => {
                if self.last_button == Level::High && level == Level::Low {
                    self.orchestrator.on_button_press(&self.backend).await;
                }
                self.last_button = level;
            }
            Err(e) => warn!("Encoder button read failed: {}", e),
        }
    }

    /// Watchdog pass; only while play is on and a stream is the identity.
    async fn check_stream(&mut self, now: Instant) {
        if !self.state.play_enabled {
            return;
        }
        let Some(identity) = self.state.playback.identity() else {
            return;
        };
        if self.catalog.kind_of(identity) != Some(StationKind::Stream) {
            return;
        }
        if !self.watchdog.due(&mut self.state.watchdog, now) {
            return;
        }

        let status = self.backend.status().await;
        match self
            .watchdog
            .observe(&mut self.state.watchdog, status.state, now)
        {
            Verdict::Healthy => {}
            Verdict::Stalled => warn!(
                "Watchdog: stream stopped, restarting in {}s unless it recovers",
                self.watchdog.grace().as_secs()
            ),
            Verdict::Waiting(elapsed) => {
                debug!("Watchdog: stream stopped for {}s", elapsed.as_secs())
            }
            Verdict::Restart => {
                self.orchestrator
                    .restart_stream(&mut self.state, &self.backend, &self.catalog)
                    .await;
            }
        }
    }

    fn save_state(&mut self) {
        let identity = self.state.playback.identity().unwrap_or(Selection::NONE);
        match self.store.save(self.state.volume, identity) {
            Ok(saved) => {
                self.state.dirty = false;
                debug!(
                    "State saved: volume={} bank={} station={}",
                    saved.volume, saved.bank, saved.station
                );
            }
            Err(e) => error!("State save failed: {}", e),
        }
    }

    /// One tick plus the pause before the next: the poll interval, or the
    /// error backoff when the tick failed.
    async fn step(&mut self, now: Instant) -> Duration {
        match self.tick(now).await {
            Ok(()) => self.poll_interval,
            Err(e) => {
                error!("Tick failed: {:#}", e);
                self.error_backoff
            }
        }
    }

    /// Poll until `cancel` fires, then save and release the hardware.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!("Control loop running");
        while !cancel.is_cancelled() {
            let pause = self.step(Instant::now()).await;
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }
        self.shutdown();
    }

    pub fn shutdown(mut self) {
        info!("Shutting down");
        self.save_state();
        self.hw.release();
    }
}

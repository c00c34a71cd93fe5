/// Playback orchestrator: maps (selection, play switch) onto backend commands.
///
/// ```text
///            selection change / play on (new selection)
///   Stopped ─────────────────────────────────────────► Playing(id)
///                                                        │    ▲
///                                          play off      │    │ play on (same selection)
///                                                        ▼    │
///                                                      Paused(id)
/// ```
///
/// The identity is what drives the backend, not what the switches show: with
/// play off, turning the selector changes nothing until play is switched back
/// on.
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use radio_proto::catalog::{Selection, StationCatalog, StationKind};
use radio_proto::playback::{play_stream, start_entry, MediaLibrary};
use radio_proto::player::Backend;
use radio_proto::state::{VOLUME_MAX, VOLUME_MIN};

use crate::core::ControlState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Playback {
    #[default]
    Stopped,
    Playing(Selection),
    Paused(Selection),
}

impl Playback {
    pub fn identity(&self) -> Option<Selection> {
        match self {
            Playback::Stopped => None,
            Playback::Playing(id) | Playback::Paused(id) => Some(*id),
        }
    }
}

/// `old - delta * step`, clamped to the volume range.  The subtraction matches
/// the encoder's mounting: clockwise counts down.
pub fn next_volume(old: u8, delta: i32, step: u8) -> u8 {
    let target = i64::from(old) - i64::from(delta) * i64::from(step);
    target.clamp(i64::from(VOLUME_MIN), i64::from(VOLUME_MAX)) as u8
}

pub struct Orchestrator {
    library: MediaLibrary,
    settle: Duration,
    volume_step: u8,
    rng: StdRng,
}

impl Orchestrator {
    pub fn new(library: MediaLibrary, settle: Duration, volume_step: u8) -> Self {
        Self {
            library,
            settle,
            volume_step,
            rng: StdRng::from_entropy(),
        }
    }

    #[cfg(test)]
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    /// Resolve `selection` and run its playback sequence.  On success the
    /// selection becomes the playback identity.
    pub async fn start<B: Backend>(
        &mut self,
        state: &mut ControlState,
        backend: &B,
        catalog: &StationCatalog,
        selection: Selection,
    ) -> bool {
        let Some(entry) = catalog.playable(selection) else {
            warn!("No station at {}", selection);
            return false;
        };
        match start_entry(backend, &self.library, entry, self.settle, &mut self.rng).await {
            Ok(()) => {
                state.playback = Playback::Playing(selection);
                state.watchdog.reset();
                state.dirty = true;
                true
            }
            Err(e) => {
                error!("Cannot play '{}': {}", entry.name, e);
                false
            }
        }
    }

    pub async fn on_selection_changed<B: Backend>(
        &mut self,
        state: &mut ControlState,
        backend: &B,
        catalog: &StationCatalog,
    ) {
        if !state.play_enabled {
            debug!("Selection {} noted; play is off", state.selection);
            return;
        }
        let selection = state.selection;
        if state.playback == Playback::Playing(selection) {
            return;
        }
        self.start(state, backend, catalog, selection).await;
    }

    pub async fn on_play_switch<B: Backend>(
        &mut self,
        state: &mut ControlState,
        backend: &B,
        catalog: &StationCatalog,
        enabled: bool,
    ) {
        state.play_enabled = enabled;
        if enabled {
            info!("Play switch → ON");
            let selection = state.selection;
            match state.playback.identity() {
                Some(id) if id == selection => {
                    backend.play(None).await;
                    state.playback = Playback::Playing(id);
                }
                _ => {
                    self.start(state, backend, catalog, selection).await;
                }
            }
        } else {
            info!("Play switch → OFF");
            backend.pause().await;
            if let Playback::Playing(id) = state.playback {
                state.playback = Playback::Paused(id);
            }
        }
    }

    /// Encoder push: the backend keeps its own play/pause flag on this path.
    pub async fn on_button_press<B: Backend>(&self, backend: &B) {
        info!("Encoder button pressed → toggle play/pause");
        backend.toggle().await;
    }

    pub async fn on_encoder<B: Backend>(&self, state: &mut ControlState, backend: &B, delta: i32) {
        if delta == 0 {
            return;
        }
        let volume = next_volume(state.volume, delta, self.volume_step);
        if volume == state.volume {
            return;
        }
        state.volume = volume;
        backend.set_volume(volume).await;
        state.dirty = true;
        debug!("Volume: {}", volume);
    }

    /// Re-run the stream sequence for the current identity.
    pub async fn restart_stream<B: Backend>(
        &mut self,
        state: &mut ControlState,
        backend: &B,
        catalog: &StationCatalog,
    ) {
        let Some(id) = state.playback.identity() else {
            return;
        };
        match catalog.playable(id) {
            Some(entry) if entry.kind == StationKind::Stream => {
                info!("Watchdog: restarting stream ({})", id);
                play_stream(backend, &entry.target).await;
                state.watchdog.reset();
            }
            _ => debug!("Watchdog: {} is no longer a stream", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingBackend;

    const CATALOG: &str = r#"
banks:
  0:
    stations:
      0: { name: A, type: stream, url: "http://a" }
      1: { name: B, type: stream, url: "http://b" }
      2: { name: Bad, type: vinyl, url: "http://x" }
"#;

    fn setup() -> (Orchestrator, ControlState, StationCatalog, RecordingBackend) {
        let orch = Orchestrator::new(MediaLibrary::new("/nonexistent".into()), Duration::ZERO, 4)
            .with_rng(StdRng::seed_from_u64(9));
        let state = ControlState {
            selection: Selection::new(0, 0),
            play_enabled: true,
            volume: 60,
            ..ControlState::default()
        };
        let catalog = StationCatalog::parse(CATALOG, false).unwrap();
        (orch, state, catalog, RecordingBackend::default())
    }

    #[test]
    fn volume_is_inverted_and_clamped() {
        assert_eq!(next_volume(60, 1, 4), 56);
        assert_eq!(next_volume(60, -1, 4), 64);
        assert_eq!(next_volume(2, 5, 4), 0);
        assert_eq!(next_volume(98, -3, 4), 100);
        assert_eq!(next_volume(50, i32::MAX, 4), 0);
        assert_eq!(next_volume(50, i32::MIN, 4), 100);
    }

    #[tokio::test]
    async fn selection_change_starts_new_station() {
        let (mut orch, mut state, catalog, backend) = setup();
        state.selection = Selection::new(0, 1);
        orch.on_selection_changed(&mut state, &backend, &catalog).await;
        assert_eq!(backend.calls(), vec!["clear", "add http://b", "play"]);
        assert_eq!(state.playback, Playback::Playing(Selection::new(0, 1)));
        assert!(state.dirty);
    }

    #[tokio::test]
    async fn unknown_station_leaves_playback_alone() {
        let (mut orch, mut state, catalog, backend) = setup();
        state.playback = Playback::Playing(Selection::new(0, 0));
        for sel in [Selection::new(0, 2), Selection::new(4, 4)] {
            state.selection = sel;
            orch.on_selection_changed(&mut state, &backend, &catalog).await;
        }
        assert!(backend.calls().is_empty());
        assert_eq!(state.playback, Playback::Playing(Selection::new(0, 0)));
        assert!(!state.dirty);
    }

    #[tokio::test]
    async fn selection_change_with_play_off_is_deferred() {
        let (mut orch, mut state, catalog, backend) = setup();
        state.play_enabled = false;
        state.playback = Playback::Paused(Selection::new(0, 0));
        state.selection = Selection::new(0, 1);
        orch.on_selection_changed(&mut state, &backend, &catalog).await;
        assert!(backend.calls().is_empty());

        orch.on_play_switch(&mut state, &backend, &catalog, true).await;
        assert_eq!(backend.calls(), vec!["clear", "add http://b", "play"]);
        assert_eq!(state.playback, Playback::Playing(Selection::new(0, 1)));
    }

    #[tokio::test]
    async fn pause_then_resume_same_station_only_plays() {
        let (mut orch, mut state, catalog, backend) = setup();
        state.playback = Playback::Playing(Selection::new(0, 0));
        orch.on_play_switch(&mut state, &backend, &catalog, false).await;
        assert_eq!(state.playback, Playback::Paused(Selection::new(0, 0)));
        orch.on_play_switch(&mut state, &backend, &catalog, true).await;
        assert_eq!(backend.calls(), vec!["pause", "play"]);
        assert_eq!(state.playback, Playback::Playing(Selection::new(0, 0)));
    }

    #[tokio::test]
    async fn button_only_toggles() {
        let (orch, state, _catalog, backend) = setup();
        orch.on_button_press(&backend).await;
        assert_eq!(backend.calls(), vec!["toggle"]);
        assert_eq!(state.playback, Playback::Stopped);
    }

    #[tokio::test]
    async fn encoder_sets_volume_and_marks_dirty() {
        let (orch, mut state, _catalog, backend) = setup();
        orch.on_encoder(&mut state, &backend, 2).await;
        assert_eq!(state.volume, 52);
        orch.on_encoder(&mut state, &backend, -100).await;
        assert_eq!(state.volume, 100);
        state.dirty = false;
        orch.on_encoder(&mut state, &backend, -1).await;
        assert!(!state.dirty);
        assert_eq!(backend.calls(), vec!["volume 52", "volume 100"]);
    }

    #[tokio::test]
    async fn restart_replays_stream_identity() {
        let (mut orch, mut state, catalog, backend) = setup();
        state.playback = Playback::Playing(Selection::new(0, 1));
        state.selection = Selection::new(0, 0);
        orch.restart_stream(&mut state, &backend, &catalog).await;
        assert_eq!(backend.calls(), vec!["clear", "add http://b", "play"]);
        assert_eq!(state.playback, Playback::Playing(Selection::new(0, 1)));
    }
}

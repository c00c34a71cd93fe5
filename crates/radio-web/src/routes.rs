use anyhow::anyhow;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Redirect},
    routing::{get, post},
    Form, Router,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use radio_proto::catalog::{load_catalog, Selection, StationCatalog};
use radio_proto::config::Config;
use radio_proto::playback::{start_entry, MediaLibrary};
use radio_proto::player::{Backend, Mpc, PlayerState};
use radio_proto::state::{PersistedState, StateStore};

use crate::page;

/// Everything the handlers share.  The catalog is re-read per request so
/// edits show up without a restart.
pub struct AppState {
    backend: Mpc,
    store: StateStore,
    stations: PathBuf,
    library: MediaLibrary,
    settle: Duration,
    volume_step: u8,
}

impl AppState {
    pub fn from_config(config: &Config) -> Self {
        Self {
            backend: Mpc::new(&config.backend),
            store: StateStore::new(
                config.paths.state_file.clone(),
                config.paths.state_backup_file.clone(),
            ),
            stations: config.paths.stations.clone(),
            library: MediaLibrary::new(config.paths.audio_root.clone()),
            settle: config.timing.seek_settle(),
            volume_step: config.web.volume_step,
        }
    }

    fn catalog(&self) -> StationCatalog {
        load_catalog(&self.stations).unwrap_or_else(|e| {
            warn!("Station catalog unavailable: {}", e);
            StationCatalog::default()
        })
    }

    /// Resolve against a fresh catalog and run the per-kind sequence.
    async fn play(&self, selection: Selection) -> anyhow::Result<String> {
        let catalog = load_catalog(&self.stations)?;
        let entry = catalog
            .resolve(selection)?
            .ok_or_else(|| anyhow!("no station at {}", selection))?;
        let mut rng = StdRng::from_entropy();
        start_entry(&self.backend, &self.library, entry, self.settle, &mut rng).await?;
        Ok(entry.name.clone())
    }
}

type Shared = Arc<AppState>;

pub fn router(state: Shared) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/status", get(api_status))
        .route("/api/stations", get(api_stations))
        .route("/action/toggle", post(toggle))
        .route("/action/stop", post(stop))
        .route("/action/vol_up", post(vol_up))
        .route("/action/vol_down", post(vol_down))
        .route("/action/play_station", post(play_station))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Deserialize)]
struct PageQuery {
    msg: Option<String>,
}

#[derive(Serialize)]
struct StatusView {
    state: PlayerState,
    volume: Option<u8>,
    track: Option<String>,
    elapsed_secs: Option<u32>,
    duration_secs: Option<u32>,
    saved: Option<PersistedState>,
}

#[derive(Serialize)]
struct StationView {
    bank: i8,
    bank_name: Option<String>,
    station: i8,
    name: String,
    kind: &'static str,
}

#[derive(Deserialize)]
struct StationForm {
    #[serde(default)]
    station: String,
}

/// `"<bank>:<station>"` with both halves in `[0, 9]`.
fn parse_slot(raw: &str) -> Option<Selection> {
    let (bank, station) = raw.trim().split_once(':')?;
    let bank: i8 = bank.trim().parse().ok()?;
    let station: i8 = station.trim().parse().ok()?;
    let selection = Selection::new(bank, station);
    selection.is_set().then_some(selection)
}

/// 303 back to the page with a flash message.
fn flash(message: &str) -> Redirect {
    Redirect::to(&format!("/?msg={}", urlencoding::encode(message)))
}

async fn index(State(app): State<Shared>, Query(query): Query<PageQuery>) -> Html<String> {
    let status = app.backend.status().await;
    let catalog = app.catalog();
    Html(page::render(
        &status,
        &catalog,
        query.msg.as_deref(),
        app.volume_step,
    ))
}

async fn api_status(State(app): State<Shared>) -> Json<StatusView> {
    let status = app.backend.status().await;
    Json(StatusView {
        state: status.state,
        volume: status.volume,
        track: status.track,
        elapsed_secs: status.elapsed_secs,
        duration_secs: status.duration_secs,
        saved: app.store.load(),
    })
}

async fn api_stations(State(app): State<Shared>) -> Json<Vec<StationView>> {
    let catalog = app.catalog();
    let stations = catalog
        .iter()
        .map(|(slot, entry)| StationView {
            bank: slot.bank,
            bank_name: catalog.bank_name(slot.bank).map(str::to_string),
            station: slot.station,
            name: entry.name.clone(),
            kind: entry.kind.as_str(),
        })
        .collect();
    Json(stations)
}

async fn toggle(State(app): State<Shared>) -> Redirect {
    info!("HTTP: toggle");
    app.backend.toggle().await;
    flash("Done")
}

async fn stop(State(app): State<Shared>) -> Redirect {
    info!("HTTP: stop");
    app.backend.stop().await;
    flash("Done")
}

async fn vol_up(State(app): State<Shared>) -> Redirect {
    info!("HTTP: volume +{}", app.volume_step);
    app.backend
        .adjust_volume(i32::from(app.volume_step))
        .await;
    flash("Done")
}

async fn vol_down(State(app): State<Shared>) -> Redirect {
    info!("HTTP: volume -{}", app.volume_step);
    app.backend
        .adjust_volume(-i32::from(app.volume_step))
        .await;
    flash("Done")
}

async fn play_station(State(app): State<Shared>, Form(form): Form<StationForm>) -> Redirect {
    let Some(selection) = parse_slot(&form.station) else {
        return flash("Invalid station selection");
    };
    info!("HTTP: play {}", selection);
    match app.play(selection).await {
        Ok(name) => flash(&format!("Playing {}", name)),
        Err(e) => {
            warn!("HTTP: cannot play {}: {:#}", selection, e);
            flash(&format!("Could not play: {:#}", e))
        }
    }
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not found")
}

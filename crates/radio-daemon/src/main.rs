mod core;
mod debounce;
mod hardware;
mod notify;
mod orchestrator;
#[cfg(test)]
mod testing;
mod watchdog;

use anyhow::Context;
use radio_proto::config::{Config, LoggingConfig};
use radio_proto::player::Mpc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::core::ControlLoop;
use crate::hardware::Board;
use crate::notify::Notifier;

/// stderr always (journald picks it up), plus an append-only file when
/// configured.
fn init_logging(logging: &LoggingConfig) -> anyhow::Result<()> {
    let file_layer = match &logging.file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(file)
                    .with_ansi(false),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,radio_daemon=debug")),
        )
        .init();
    Ok(())
}

/// Cancel `token` on SIGTERM or SIGINT.
fn spawn_signal_handler(token: CancellationToken) -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("SIGTERM received"),
            _ = tokio::signal::ctrl_c() => info!("SIGINT received"),
        }
        token.cancel();
    });
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;
    init_logging(&config.logging)?;
    info!("Config loaded from: {:?}", Config::config_path());

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone())?;

    let backend = Mpc::new(&config.backend);
    let ready = backend
        .wait_ready(
            config.backend.startup_retries,
            config.backend.startup_retry_delay(),
            || cancel.is_cancelled(),
        )
        .await;
    if cancel.is_cancelled() {
        warn!("Shutdown requested during startup");
        return Ok(());
    }
    if !ready {
        anyhow::bail!(
            "backend not reachable after {} attempts",
            config.backend.startup_retries
        );
    }

    let board = Board::open(&config.pins, &config.encoder).context("initialising hardware")?;

    let notifier = Notifier::from_env();
    if notifier.is_enabled() {
        info!("Reporting to systemd via NOTIFY_SOCKET");
    }
    let control = ControlLoop::start(
        &config,
        board,
        backend,
        notifier,
        std::time::Instant::now(),
    )
    .await?;
    control.run(cancel).await;

    info!("Stopped");
    Ok(())
}

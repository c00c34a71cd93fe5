/// Media-player backend interface and the `mpc` implementation.
///
/// Every call is bounded by a timeout and reports failure in its
/// [`CommandOutput`] instead of returning `Err`; one unreachable backend call
/// must never take down the caller's loop.
///
/// ```text
///   Backend::command(args) ──► mpc [--host H] [--port P] <args…>
///                                   │
///                                   └── stdout/stderr/exit ──► CommandOutput
/// ```
use serde::Serialize;
use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::BackendConfig;
use crate::platform;

/// Result of one backend command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub ok: bool,
    pub output: String,
    pub error: Option<String>,
}

impl CommandOutput {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            ok: true,
            output: output.into(),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            output: String::new(),
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerState {
    Playing,
    Paused,
    #[default]
    Stopped,
}

impl PlayerState {
    /// Playing or paused: the backend has something loaded and is not idle.
    pub fn is_active(&self) -> bool {
        matches!(self, PlayerState::Playing | PlayerState::Paused)
    }
}

/// Parsed `mpc status` output.
///
/// ```text
/// Artist - Title
/// [playing] #1/1   0:05/3:42 (2%)
/// volume: 60%   repeat: off   random: off   single: off   consume: off
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlayerStatus {
    pub state: PlayerState,
    pub track: Option<String>,
    pub elapsed_secs: Option<u32>,
    pub duration_secs: Option<u32>,
    pub volume: Option<u8>,
}

/// `m:ss` or `h:mm:ss` → seconds.
pub fn parse_clock(s: &str) -> Option<u32> {
    let parts: Vec<u32> = s
        .split(':')
        .map(|p| p.parse::<u32>())
        .collect::<Result<_, _>>()
        .ok()?;
    let (h, m, s) = match parts.as_slice() {
        [m, s] => (0, *m, *s),
        [h, m, s] => (*h, *m, *s),
        _ => return None,
    };
    h.checked_mul(3600)?
        .checked_add(m.checked_mul(60)?)?
        .checked_add(s)
}

impl PlayerStatus {
    pub fn parse(text: &str) -> Self {
        let mut status = PlayerStatus::default();
        let lines: Vec<&str> = text.lines().collect();

        for (i, line) in lines.iter().enumerate() {
            let trimmed = line.trim_start();
            if trimmed.starts_with("[playing]") || trimmed.starts_with("[paused]") {
                status.state = if trimmed.starts_with("[playing]") {
                    PlayerState::Playing
                } else {
                    PlayerState::Paused
                };
                if i > 0 {
                    status.track = Some(lines[i - 1].trim().to_string());
                }
                // "0:05/3:42" is the only token with both ':' and '/'
                if let Some(times) = trimmed
                    .split_whitespace()
                    .find(|t| t.contains('/') && t.contains(':'))
                {
                    if let Some((elapsed, total)) = times.split_once('/') {
                        status.elapsed_secs = parse_clock(elapsed);
                        status.duration_secs = parse_clock(total);
                    }
                }
            } else if let Some(rest) = trimmed.strip_prefix("volume:") {
                status.volume = rest
                    .trim_start()
                    .split('%')
                    .next()
                    .and_then(|v| v.trim().parse::<u8>().ok());
            }
        }
        status
    }
}

/// Commands the control loop and the web surface need from the player.
///
/// Implementors supply [`command`](Backend::command); the typed helpers build
/// argument lists on top of it.
#[allow(async_fn_in_trait)]
pub trait Backend: Sync {
    fn command(&self, args: Vec<String>) -> impl Future<Output = CommandOutput> + Send;

    async fn clear(&self) -> CommandOutput {
        self.command(vec!["clear".into()]).await
    }

    async fn enqueue(&self, uri: &str) -> CommandOutput {
        self.command(vec!["add".into(), uri.to_string()]).await
    }

    /// Start playback; `index` is 1-based.
    async fn play(&self, index: Option<usize>) -> CommandOutput {
        let mut args = vec!["play".to_string()];
        if let Some(i) = index {
            args.push(i.to_string());
        }
        self.command(args).await
    }

    async fn pause(&self) -> CommandOutput {
        self.command(vec!["pause".into()]).await
    }

    async fn toggle(&self) -> CommandOutput {
        self.command(vec!["toggle".into()]).await
    }

    async fn stop(&self) -> CommandOutput {
        self.command(vec!["stop".into()]).await
    }

    async fn set_volume(&self, percent: u8) -> CommandOutput {
        self.command(vec!["volume".into(), percent.min(100).to_string()])
            .await
    }

    /// Relative volume change, e.g. `+5` / `-5`.
    async fn adjust_volume(&self, delta: i32) -> CommandOutput {
        self.command(vec!["volume".into(), format!("{:+}", delta)])
            .await
    }

    async fn seek(&self, seconds: u32) -> CommandOutput {
        self.command(vec!["seek".into(), seconds.to_string()]).await
    }

    async fn set_repeat(&self, on: bool) -> CommandOutput {
        self.command(vec!["repeat".into(), on_off(on).into()]).await
    }

    async fn set_single(&self, on: bool) -> CommandOutput {
        self.command(vec!["single".into(), on_off(on).into()]).await
    }

    async fn set_random(&self, on: bool) -> CommandOutput {
        self.command(vec!["random".into(), on_off(on).into()]).await
    }

    async fn current(&self) -> CommandOutput {
        self.command(vec!["current".into()]).await
    }

    /// Raw `status` output; use [`status`](Backend::status) for the parsed form.
    async fn status_raw(&self) -> CommandOutput {
        self.command(vec!["status".into()]).await
    }

    /// A failed call parses as a stopped player.
    async fn status(&self) -> PlayerStatus {
        let out = self.status_raw().await;
        PlayerStatus::parse(&out.output)
    }
}

fn on_off(on: bool) -> &'static str {
    if on {
        "on"
    } else {
        "off"
    }
}

/// MPD driven through the `mpc` command-line client.
#[derive(Debug, Clone)]
pub struct Mpc {
    binary: PathBuf,
    host: Option<String>,
    port: Option<u16>,
    timeout: Duration,
}

impl Mpc {
    pub fn new(config: &BackendConfig) -> Self {
        Self {
            binary: platform::find_backend_binary(&config.binary),
            host: config.host.clone(),
            port: config.port,
            timeout: config.timeout(),
        }
    }

    /// Run one `mpc` invocation, bounded by the configured timeout.
    pub async fn exec(&self, args: Vec<String>) -> CommandOutput {
        let mut cmd = tokio::process::Command::new(&self.binary);
        if let Some(host) = &self.host {
            cmd.arg("--host").arg(host);
        }
        if let Some(port) = self.port {
            cmd.arg("--port").arg(port.to_string());
        }
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let joined = args.join(" ");
        debug!("mpc {}", joined);
        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(o)) => o,
            Ok(Err(e)) => {
                warn!("mpc {} failed: {}", joined, e);
                return CommandOutput::failure(e.to_string());
            }
            Err(_) => {
                warn!("mpc {} timed out after {:?}", joined, self.timeout);
                return CommandOutput::failure(format!("timed out after {:?}", self.timeout));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if output.status.success() {
            CommandOutput {
                ok: true,
                output: stdout,
                error: (!stderr.is_empty()).then_some(stderr),
            }
        } else {
            warn!("mpc {} exited with {}: {}", joined, output.status, stderr);
            CommandOutput {
                ok: false,
                output: stdout,
                error: Some(if stderr.is_empty() {
                    output.status.to_string()
                } else {
                    stderr
                }),
            }
        }
    }

    /// Poll `status` until it succeeds, up to `retries` attempts spaced by
    /// `delay`.  `cancelled` is checked before every attempt.
    pub async fn wait_ready(
        &self,
        retries: u32,
        delay: Duration,
        cancelled: impl Fn() -> bool,
    ) -> bool {
        for attempt in 1..=retries {
            if cancelled() {
                return false;
            }
            if self.exec(vec!["status".into()]).await.ok {
                info!("Backend ready (attempt {}/{})", attempt, retries);
                return true;
            }
            warn!("Waiting for backend... ({}/{})", attempt, retries);
            tokio::time::sleep(delay).await;
        }
        false
    }
}

impl Backend for Mpc {
    fn command(&self, args: Vec<String>) -> impl Future<Output = CommandOutput> + Send {
        self.exec(args)
    }
}

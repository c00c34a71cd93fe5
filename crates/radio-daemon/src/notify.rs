//! systemd `sd_notify`: readiness once, keepalive every tick.
//!
//! Fire-and-forget.  Without `NOTIFY_SOCKET` (or when the send fails) nothing
//! happens; the control loop never depends on a supervisor being there.

use std::os::unix::net::{SocketAddr, UnixDatagram};
use tracing::{debug, trace};

pub const NOTIFY_SOCKET_ENV: &str = "NOTIFY_SOCKET";

pub struct Notifier {
    target: Option<(UnixDatagram, SocketAddr)>,
}

impl Notifier {
    pub fn from_env() -> Self {
        match std::env::var(NOTIFY_SOCKET_ENV) {
            Ok(name) if !name.is_empty() => Self::connect(&name),
            _ => Self::disabled(),
        }
    }

    pub fn disabled() -> Self {
        Self { target: None }
    }

    fn connect(name: &str) -> Self {
        let target = socket_addr(name).and_then(|addr| Ok((UnixDatagram::unbound()?, addr)));
        match target {
            Ok(target) => {
                debug!("sd_notify socket: {}", name);
                Self {
                    target: Some(target),
                }
            }
            Err(e) => {
                debug!("sd_notify disabled ({}): {}", name, e);
                Self::disabled()
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.target.is_some()
    }

    pub fn ready(&self) {
        self.send("READY=1");
    }

    pub fn keepalive(&self) {
        self.send("WATCHDOG=1");
    }

    fn send(&self, message: &str) {
        if let Some((socket, addr)) = &self.target {
            if let Err(e) = socket.send_to_addr(message.as_bytes(), addr) {
                trace!("sd_notify {}: {}", message, e);
            }
        }
    }
}

/// `@name` is the Linux abstract namespace, anything else a filesystem path.
fn socket_addr(name: &str) -> std::io::Result<SocketAddr> {
    match name.strip_prefix('@') {
        Some(abstract_name) => abstract_addr(abstract_name),
        None => SocketAddr::from_pathname(name),
    }
}

#[cfg(target_os = "linux")]
fn abstract_addr(name: &str) -> std::io::Result<SocketAddr> {
    use std::os::linux::net::SocketAddrExt;
    SocketAddr::from_abstract_name(name.as_bytes())
}

#[cfg(not(target_os = "linux"))]
fn abstract_addr(_name: &str) -> std::io::Result<SocketAddr> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "abstract sockets are Linux-only",
    ))
}

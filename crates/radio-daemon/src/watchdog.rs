use std::time::{Duration, Instant};

use radio_proto::player::PlayerState;

/// Stall tracking for stream playback.
#[derive(Debug, Clone, Default)]
pub struct WatchdogState {
    pub last_check: Option<Instant>,
    pub stopped_since: Option<Instant>,
}

impl WatchdogState {
    /// Forget any observed stall (new playback identity).
    pub fn reset(&mut self) {
        self.stopped_since = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Playing or paused.
    Healthy,
    /// First stopped observation; the grace period starts now.
    Stalled,
    /// Still stopped, grace not yet over.
    Waiting(Duration),
    /// Grace elapsed: restart the stream.
    Restart,
}

/// Detect → grace → act.  Transient stops that heal themselves inside the
/// grace period never cause a restart.
pub struct StreamWatchdog {
    interval: Duration,
    grace: Duration,
}

impl StreamWatchdog {
    pub fn new(interval: Duration, grace: Duration) -> Self {
        Self { interval, grace }
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// True when a status check is due; records the check time.
    pub fn due(&self, state: &mut WatchdogState, now: Instant) -> bool {
        match state.last_check {
            Some(last) if now.saturating_duration_since(last) < self.interval => false,
            _ => {
                state.last_check = Some(now);
                true
            }
        }
    }

    pub fn observe(&self, state: &mut WatchdogState, player: PlayerState, now: Instant) -> Verdict {
        if player.is_active() {
            state.stopped_since = None;
            return Verdict::Healthy;
        }
        match state.stopped_since {
            None => {
                state.stopped_since = Some(now);
                Verdict::Stalled
            }
            Some(since) => {
                let elapsed = now.saturating_duration_since(since);
                if elapsed >= self.grace {
                    state.stopped_since = None;
                    Verdict::Restart
                } else {
                    Verdict::Waiting(elapsed)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(base: Instant, n: u64) -> Instant {
        base + Duration::from_secs(n)
    }

    fn watchdog() -> StreamWatchdog {
        StreamWatchdog::new(Duration::from_secs(10), Duration::from_secs(15))
    }

    #[test]
    fn check_cadence() {
        let wd = watchdog();
        let mut st = WatchdogState::default();
        let t0 = Instant::now();
        assert!(wd.due(&mut st, t0));
        assert!(!wd.due(&mut st, secs(t0, 9)));
        assert!(wd.due(&mut st, secs(t0, 10)));
        assert!(!wd.due(&mut st, secs(t0, 15)));
    }

    #[test]
    fn restart_only_after_grace() {
        let wd = watchdog();
        let mut st = WatchdogState::default();
        let t0 = Instant::now();
        assert_eq!(wd.observe(&mut st, PlayerState::Stopped, t0), Verdict::Stalled);
        assert_eq!(
            wd.observe(&mut st, PlayerState::Stopped, secs(t0, 10)),
            Verdict::Waiting(Duration::from_secs(10))
        );
        assert_eq!(
            wd.observe(&mut st, PlayerState::Stopped, secs(t0, 15)),
            Verdict::Restart
        );
        assert!(st.stopped_since.is_none());
    }

    #[test]
    fn one_restart_per_sustained_stall() {
        let wd = watchdog();
        let mut st = WatchdogState::default();
        let t0 = Instant::now();
        let verdicts: Vec<Verdict> = (0..6)
            .map(|i| wd.observe(&mut st, PlayerState::Stopped, secs(t0, i * 10)))
            .collect();
        // 0 stall, 10 wait, 20 restart, 30 stall, 40 wait, 50 restart
        assert_eq!(
            verdicts.iter().filter(|v| **v == Verdict::Restart).count(),
            2
        );
        assert_eq!(verdicts[2], Verdict::Restart);
        assert_eq!(verdicts[3], Verdict::Stalled);
    }

    #[test]
    fn recovery_clears_the_stall() {
        let wd = watchdog();
        let mut st = WatchdogState::default();
        let t0 = Instant::now();
        wd.observe(&mut st, PlayerState::Stopped, t0);
        assert_eq!(
            wd.observe(&mut st, PlayerState::Paused, secs(t0, 10)),
            Verdict::Healthy
        );
        assert_eq!(
            wd.observe(&mut st, PlayerState::Stopped, secs(t0, 20)),
            Verdict::Stalled
        );
        assert_eq!(
            wd.observe(&mut st, PlayerState::Stopped, secs(t0, 30)),
            Verdict::Waiting(Duration::from_secs(10))
        );
    }

    #[test]
    fn reset_keeps_cadence() {
        let wd = watchdog();
        let mut st = WatchdogState::default();
        let t0 = Instant::now();
        assert!(wd.due(&mut st, t0));
        wd.observe(&mut st, PlayerState::Stopped, t0);
        st.reset();
        assert!(st.stopped_since.is_none());
        assert!(!wd.due(&mut st, secs(t0, 1)));
    }
}

use std::time::{Duration, Instant};

use radio_proto::catalog::Selection;

/// Turns raw BCD switch samples into a stable bank/station selection.
///
/// Raw values above 9 (half-turned switch, bouncing contacts) count as "no
/// change".  A real change is accepted only when `debounce` has passed since
/// the last accepted change; the timer restarts on acceptance, not on every
/// sample.
pub struct SwitchDebouncer {
    debounce: Duration,
    stable: Selection,
    last_change: Option<Instant>,
}

impl SwitchDebouncer {
    pub fn new(debounce: Duration, initial: Selection) -> Self {
        Self {
            debounce,
            stable: initial,
            last_change: None,
        }
    }

    #[cfg(test)]
    pub fn stable(&self) -> Selection {
        self.stable
    }

    /// Feed one pair of raw samples.  Returns the new selection when a change
    /// is accepted.
    pub fn sample(&mut self, raw_bank: u8, raw_station: u8, now: Instant) -> Option<Selection> {
        let candidate = Selection {
            bank: digit_or(raw_bank, self.stable.bank),
            station: digit_or(raw_station, self.stable.station),
        };
        if candidate == self.stable {
            return None;
        }
        if let Some(last) = self.last_change {
            if now.saturating_duration_since(last) < self.debounce {
                return None;
            }
        }
        self.last_change = Some(now);
        self.stable = candidate;
        Some(candidate)
    }
}

fn digit_or(raw: u8, previous: i8) -> i8 {
    if raw <= 9 {
        raw as i8
    } else {
        previous
    }
}

/// Initial selection from the first switch read: invalid halves fall back to
/// `fallback` when that is a real slot, else stay unset.
pub fn initial_selection(raw_bank: u8, raw_station: u8, fallback: Option<Selection>) -> Selection {
    let fallback = fallback.filter(Selection::is_set).unwrap_or(Selection::NONE);
    Selection {
        bank: digit_or(raw_bank, fallback.bank),
        station: digit_or(raw_station, fallback.station),
    }
}

use chrono::{DateTime, Utc};
use std::time::Instant;

/// Spec §2 component C1: wall-clock reads go through this trait so tests can
/// inject a fixed or steppable clock instead of depending on real time.
/// Monotonic reads (`Instant`) stay separate from wall-clock reads
/// (`DateTime<Utc>`) since the poll-loop deadline (§4.7) needs the former and
/// `scheduled_at` comparisons need the latter.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    fn monotonic_now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn monotonic_now(&self) -> Instant {
        Instant::now()
    }
}

/// Deterministic clock for tests: wall-clock time is fixed unless advanced
/// explicitly; monotonic time always advances via the real `Instant` clock
/// (faking monotonic time has no payoff here since tests don't sleep).
#[cfg(any(test, feature = "test-util"))]
pub struct FixedClock {
    now: std::sync::Mutex<DateTime<Utc>>,
}

#[cfg(any(test, feature = "test-util"))]
impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: std::sync::Mutex::new(now),
        }
    }

    pub fn advance(&self, d: chrono::Duration) {
        let mut now = self.now.lock().expect("fixed clock mutex poisoned");
        *now += d;
    }
}

#[cfg(any(test, feature = "test-util"))]
impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("fixed clock mutex poisoned")
    }

    fn monotonic_now(&self) -> Instant {
        Instant::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn fixed_clock_only_moves_when_advanced() {
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let clock = FixedClock::new(t0);
        assert_eq!(clock.now(), t0);
        clock.advance(chrono::Duration::seconds(30));
        assert_eq!(clock.now(), t0 + chrono::Duration::seconds(30));
    }
}

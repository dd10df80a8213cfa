use rand::Rng;
use std::time::Duration;

/// Exponential backoff for publish retries: `1 << attempts` seconds, capped
/// at 300s, clamped so negative/overflowing attempt counts fall back to the
/// initial 1s step instead of panicking.
pub fn retry_delay(attempts: i32) -> Duration {
    let shift = u32::try_from(attempts.clamp(0, 10)).unwrap_or(0);
    let base = 1u64.checked_shl(shift).unwrap_or(u64::MAX);
    Duration::from_secs(base.min(300))
}

/// Adds up to +/-20% jitter to a backoff, kept separate from `retry_delay`
/// so the unjittered curve stays deterministically testable.
pub fn jittered_retry_delay<R: Rng + ?Sized>(attempts: i32, rng: &mut R) -> Duration {
    let base = retry_delay(attempts);
    let jitter_frac = rng.gen_range(-0.2..=0.2);
    let millis = (base.as_millis() as f64 * (1.0 + jitter_frac)).max(0.0);
    Duration::from_millis(millis as u64)
}

/// Poll backoff for the create-container status loop: initial 2s, factor 2,
/// cap 30s. `max_total_wait` enforcement is the caller's responsibility (it
/// is a property of the whole poll loop, not of a single delay computation).
pub fn poll_backoff(attempt: u32) -> Duration {
    const INITIAL: u64 = 2;
    const CAP: u64 = 30;
    let shift = attempt.min(16);
    let secs = INITIAL.checked_shl(shift).unwrap_or(u64::MAX);
    Duration::from_secs(secs.min(CAP))
}

/// Upper bound on the whole poll loop, independent of individual step
/// delays.
pub const MAX_POLL_WAIT: Duration = Duration::from_secs(5 * 60);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delay_grows_monotonically_until_cap() {
        let mut prev = Duration::from_secs(0);
        for attempts in 0..=16 {
            let d = retry_delay(attempts);
            assert!(d >= prev, "regressed at attempts={attempts}");
            assert!(d <= Duration::from_secs(300));
            prev = d;
        }
    }

    #[test]
    fn retry_delay_caps_at_five_minutes_after_ten_attempts() {
        for attempts in [10, 11, 20, i32::MAX] {
            assert_eq!(retry_delay(attempts), Duration::from_secs(300));
        }
    }

    #[test]
    fn retry_delay_clamps_negative_attempts_to_initial_backoff() {
        assert_eq!(retry_delay(-1), Duration::from_secs(1));
        assert_eq!(retry_delay(i32::MIN), Duration::from_secs(1));
    }

    #[test]
    fn jittered_retry_delay_stays_within_20_percent_band() {
        let mut rng = rand::rngs::mock::StepRng::new(0, 1);
        for attempts in 0..8 {
            let base = retry_delay(attempts).as_millis() as f64;
            let d = jittered_retry_delay(attempts, &mut rng).as_millis() as f64;
            assert!(d <= base * 1.2 + 1.0);
            assert!(d >= base * 0.8 - 1.0);
        }
    }

    #[test]
    fn poll_backoff_starts_at_two_seconds_and_caps_at_thirty() {
        assert_eq!(poll_backoff(0), Duration::from_secs(2));
        assert_eq!(poll_backoff(1), Duration::from_secs(4));
        assert_eq!(poll_backoff(2), Duration::from_secs(8));
        assert_eq!(poll_backoff(10), Duration::from_secs(30));
    }
}

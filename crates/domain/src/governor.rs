use chrono::{DateTime, Utc};
use std::time::Duration;

/// Authoritative remote quota snapshot, refreshed opportunistically by the
/// FSM driver via `PlatformClient::publishing_limit` and cached here.
#[derive(Debug, Clone, Copy)]
pub struct PublishingLimit {
    pub used: u32,
    pub limit: u32,
    pub window_resets_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveDecision {
    Ok,
    ExceedsLocalCap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteDecision {
    Ok,
    ExceedsRemoteQuota,
}

/// Per-account per-local-day cap on non-terminal posts.
pub const LOCAL_DAILY_CAP: i64 = 15;

/// Local-cap half of `Reserve`: purely a count check, no I/O.
/// `non_terminal_count_on_day` is the count of posts on the target local
/// date already in a non-terminal status (computed by `crates/store`).
pub fn reserve_local(non_terminal_count_on_day: i64, override_spacing: bool) -> ReserveDecision {
    if override_spacing || non_terminal_count_on_day < LOCAL_DAILY_CAP {
        ReserveDecision::Ok
    } else {
        ReserveDecision::ExceedsLocalCap
    }
}

/// Remote-quota half of `Reserve`: consults the cached `PublishingLimit`.
/// Returns the wait hint so the caller can compute the next `scheduled_at`.
pub fn reserve_remote(limit: &PublishingLimit, now: DateTime<Utc>) -> (RemoteDecision, Option<Duration>) {
    if limit.used < limit.limit {
        (RemoteDecision::Ok, None)
    } else {
        let retry_after = (limit.window_resets_at - now)
            .to_std()
            .unwrap_or(Duration::ZERO);
        (RemoteDecision::ExceedsRemoteQuota, Some(retry_after))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn local_cap_allows_up_to_fifteen_then_rejects() {
        assert_eq!(reserve_local(14, false), ReserveDecision::Ok);
        assert_eq!(reserve_local(15, false), ReserveDecision::ExceedsLocalCap);
        assert_eq!(reserve_local(15, true), ReserveDecision::Ok);
    }

    #[test]
    fn remote_quota_reports_retry_after_when_exhausted() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap();
        let limit = PublishingLimit {
            used: 200,
            limit: 200,
            window_resets_at: now + chrono::Duration::seconds(30),
        };
        let (decision, retry_after) = reserve_remote(&limit, now);
        assert_eq!(decision, RemoteDecision::ExceedsRemoteQuota);
        assert_eq!(retry_after, Some(Duration::from_secs(30)));
    }

    #[test]
    fn remote_quota_ok_under_limit() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap();
        let limit = PublishingLimit {
            used: 10,
            limit: 200,
            window_resets_at: now + chrono::Duration::hours(24),
        };
        assert_eq!(reserve_remote(&limit, now).0, RemoteDecision::Ok);
    }
}

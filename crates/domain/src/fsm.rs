use crate::model::PostStatus;
use thiserror::Error;

/// Events that drive a post's status, one level coarser than the FSM
/// driver's internal stages: create-container, poll, and publish only
/// surface here as `ContainerCreated` / `PublishSucceeded` / the two
/// failure events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostEvent {
    Lease,
    ContainerCreated,
    PublishSucceeded,
    RetryableFailure,
    TerminalFailure,
    Cancel,
    LeaseExpired,
    AccountFrozen,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FsmError {
    #[error("event {event:?} is not valid from state {from:?}")]
    InvalidTransition { from: PostStatus, event: PostEvent },
}

/// States each event may fire from. Kept as a pure lookup table, same shape
/// as `expected_previous_states_for_transition`, so the allowed-edge set is
/// reviewable and testable independent of any I/O.
fn allowed_previous_states(event: PostEvent) -> &'static [PostStatus] {
    use PostStatus::*;
    match event {
        PostEvent::Lease => &[Scheduled],
        PostEvent::ContainerCreated => &[Leased],
        PostEvent::PublishSucceeded => &[Publishing],
        PostEvent::RetryableFailure => &[Leased, Publishing],
        PostEvent::TerminalFailure => &[Leased, Publishing],
        PostEvent::Cancel => &[Leased, Publishing],
        PostEvent::LeaseExpired => &[Leased, Publishing],
        PostEvent::AccountFrozen => &[Scheduled, Leased, Publishing],
    }
}

fn target_state(event: PostEvent) -> PostStatus {
    match event {
        PostEvent::Lease => PostStatus::Leased,
        PostEvent::ContainerCreated => PostStatus::Publishing,
        PostEvent::PublishSucceeded => PostStatus::Posted,
        PostEvent::RetryableFailure => PostStatus::Scheduled,
        PostEvent::TerminalFailure => PostStatus::Failed,
        PostEvent::Cancel => PostStatus::Cancelled,
        PostEvent::LeaseExpired => PostStatus::Scheduled,
        PostEvent::AccountFrozen => PostStatus::Failed,
    }
}

/// Pure state transition: the only place that decides whether `(state,
/// event)` is legal and what it leads to. `crates/store::posts` enforces
/// this same edge at the SQL layer via a compare-and-set `WHERE status =
/// ANY(expected)`, so a transition rejected here should also be rejected by
/// a concurrent racing update there.
pub fn next(state: PostStatus, event: PostEvent) -> Result<PostStatus, FsmError> {
    if allowed_previous_states(event).contains(&state) {
        Ok(target_state(event))
    } else {
        Err(FsmError::InvalidTransition { from: state, event })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PostStatus::*;

    #[test]
    fn happy_path_walks_scheduled_to_posted() {
        let mut s = Scheduled;
        s = next(s, PostEvent::Lease).unwrap();
        assert_eq!(s, Leased);
        s = next(s, PostEvent::ContainerCreated).unwrap();
        assert_eq!(s, Publishing);
        s = next(s, PostEvent::PublishSucceeded).unwrap();
        assert_eq!(s, Posted);
    }

    #[test]
    fn retryable_failure_returns_to_scheduled_from_either_active_state() {
        assert_eq!(next(Leased, PostEvent::RetryableFailure), Ok(Scheduled));
        assert_eq!(next(Publishing, PostEvent::RetryableFailure), Ok(Scheduled));
    }

    #[test]
    fn terminal_failure_and_cancel_are_absorbing() {
        assert_eq!(next(Publishing, PostEvent::TerminalFailure), Ok(Failed));
        assert_eq!(next(Leased, PostEvent::Cancel), Ok(Cancelled));
        for event in [
            PostEvent::Lease,
            PostEvent::ContainerCreated,
            PostEvent::PublishSucceeded,
            PostEvent::RetryableFailure,
            PostEvent::TerminalFailure,
            PostEvent::Cancel,
            PostEvent::LeaseExpired,
        ] {
            assert!(next(Failed, event).is_err());
            assert!(next(Posted, event).is_err());
            assert!(next(Cancelled, event).is_err());
        }
    }

    #[test]
    fn lease_expiry_resets_any_active_state_to_scheduled() {
        assert_eq!(next(Leased, PostEvent::LeaseExpired), Ok(Scheduled));
        assert_eq!(next(Publishing, PostEvent::LeaseExpired), Ok(Scheduled));
        assert!(next(Scheduled, PostEvent::LeaseExpired).is_err());
    }

    #[test]
    fn rejects_regressive_or_skipped_edges() {
        assert!(next(Scheduled, PostEvent::ContainerCreated).is_err());
        assert!(next(Scheduled, PostEvent::PublishSucceeded).is_err());
        assert!(next(Leased, PostEvent::PublishSucceeded).is_err());
    }

    #[test]
    fn account_frozen_forces_failed_from_any_non_terminal_state() {
        for s in [Scheduled, Leased, Publishing] {
            assert_eq!(next(s, PostEvent::AccountFrozen), Ok(Failed));
        }
        assert!(next(Posted, PostEvent::AccountFrozen).is_err());
    }
}

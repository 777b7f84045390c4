//! Session admission control & queue scheduling core
//!
//! Every operation here runs inside an independent, short-lived request
//! handler (or the gc worker) with no shared process memory and no
//! distributed lock. Coordination happens entirely through the session
//! store: counts are re-queried at the point of decision, and every
//! capacity-relevant transition is a guarded conditional update whose
//! `rows_affected == 0` outcome means a concurrent caller won and the work
//! is already done.
//!
//! The "active count <= max" invariant is eventual, not instantaneous:
//! two racing reconcilers may briefly over-admit, and the next pass
//! self-corrects. Do not tighten this with a lock or an in-process
//! scheduler; it changes observable behavior under load and breaks with
//! multiple server instances.

pub mod admission;
pub mod estimator;
pub mod reaper;
pub mod reconciler;

pub use admission::{admission_decision, AdmissionDecision, Admitted};
pub use reaper::GcReport;

use crate::db::Repository;
use crate::errors::{AppError, Result};

/// Capacity gate: free slots given a fresh active count.
///
/// Callers must tolerate staleness between this read and any subsequent
/// write; guarded updates make a stale answer redundant work, not a bug.
pub fn slots_available(active_count: u64, max_concurrent: u32) -> u64 {
    (max_concurrent as u64).saturating_sub(active_count)
}

/// Heartbeat receiver: refresh `last_activity_at` for an active session.
///
/// A heartbeat for a queued or pending session has no effect and is not an
/// error; the client is expected to poll status separately. Terminal or
/// unknown tokens are surfaced so the client stops heartbeating.
pub async fn record_heartbeat(repo: &Repository, token: &str) -> Result<()> {
    if repo.touch_activity(token).await? {
        return Ok(());
    }

    match repo.find_session_by_token(token).await? {
        Some(session) if !session.is_terminal() => Ok(()),
        Some(_) => Err(AppError::SessionExpired),
        None => Err(AppError::SessionNotFound),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_available() {
        assert_eq!(slots_available(0, 10), 10);
        assert_eq!(slots_available(7, 10), 3);
        assert_eq!(slots_available(10, 10), 0);
    }

    #[test]
    fn test_slots_never_negative_on_over_admission() {
        // Transient over-admission from racing reconcilers must read as
        // zero free slots, not underflow.
        assert_eq!(slots_available(11, 10), 0);
        assert_eq!(slots_available(u64::MAX, 10), 0);
    }
}

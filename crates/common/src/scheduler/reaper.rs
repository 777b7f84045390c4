//! Expiry reaper: reclaim overdue and inactive sessions
//!
//! Runs from the periodic gc worker or a privileged manual call. Hard TTL
//! is unconditional; recent activity never extends a session past its
//! ceiling. After reclaiming anything, the reconciler backfills the freed
//! slots immediately instead of waiting for the next poll.

use crate::config::SchedulerConfig;
use crate::db::Repository;
use crate::errors::Result;
use crate::metrics;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::Serialize;

/// Counts of sessions reclaimed by each rule, for observability
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct GcReport {
    /// Sessions past their absolute TTL
    pub hard_expired: u64,
    /// Active sessions quiet past the inactivity threshold
    pub inactivity_expired: u64,
    /// Queued sessions promoted into the freed slots
    pub queue_activated: u64,
}

/// Run one garbage collection pass.
///
/// Partial progress is fine: if the inactivity pass fails after the hard
/// pass succeeded, the transitions already written stay written and the
/// next run picks up the remainder.
pub async fn run_gc(repo: &Repository, config: &SchedulerConfig) -> Result<GcReport> {
    let now: DateTimeWithTimeZone = chrono::Utc::now().into();

    let hard_expired = repo.expire_overdue_sessions(now).await?;
    if hard_expired > 0 {
        metrics::record_reclaimed("hard_ttl", hard_expired);
    }

    let cutoff: DateTimeWithTimeZone = (chrono::Utc::now() - config.inactivity_threshold()).into();
    let inactivity_expired = repo.expire_inactive_sessions(cutoff, now).await?;
    if inactivity_expired > 0 {
        metrics::record_reclaimed("inactivity", inactivity_expired);
    }

    let queue_activated = if hard_expired + inactivity_expired > 0 {
        super::reconciler::reconcile(repo, config).await?
    } else {
        0
    };

    tracing::info!(
        hard_expired,
        inactivity_expired,
        queue_activated,
        "Garbage collection pass complete"
    );

    Ok(GcReport {
        hard_expired,
        inactivity_expired,
        queue_activated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_serializes_counts() {
        let report = GcReport {
            hard_expired: 2,
            inactivity_expired: 1,
            queue_activated: 3,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["hard_expired"], 2);
        assert_eq!(json["inactivity_expired"], 1);
        assert_eq!(json["queue_activated"], 3);
    }
}

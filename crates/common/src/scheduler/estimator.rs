//! Wait-time estimator: a display heuristic, never an admission input
//!
//! Recomputed on every status poll so the answer self-corrects as the
//! queue drains at whatever rate it actually drains.

use crate::config::SchedulerConfig;
use crate::db::models::Session;
use crate::db::Repository;
use crate::errors::Result;
use sea_orm::prelude::DateTimeWithTimeZone;

/// Fresh position and wait estimate for a queued session.
///
/// The stored `queue_position` is only used as a sort key; the position
/// reported to the user is recounted here because the stored value may be
/// stale between reconciler passes.
pub async fn estimate_for_session(
    repo: &Repository,
    config: &SchedulerConfig,
    session: &Session,
) -> Result<(i64, i64)> {
    let ahead = match session.queue_position {
        Some(position) => repo.count_queued_ahead(position).await?,
        None => repo.count_queued_created_before(session.created_at).await?,
    };
    let position = ahead as i64 + 1;

    let earliest_expiry = repo.earliest_active_expiry().await?;
    let now: DateTimeWithTimeZone = chrono::Utc::now().into();

    Ok((
        position,
        estimate_wait_minutes(position, earliest_expiry, now, config),
    ))
}

/// Pure estimate from a snapshot of inputs.
///
/// `ceil(time until the earliest active expiry) + (position - 1) * average
/// session length`, clamped so a deep queue never shows an absurd number.
/// With no active sessions at all the earliest-expiry signal is missing,
/// so a small per-slot constant bootstraps the answer.
pub fn estimate_wait_minutes(
    position: i64,
    earliest_expiry: Option<DateTimeWithTimeZone>,
    now: DateTimeWithTimeZone,
    config: &SchedulerConfig,
) -> i64 {
    let position = position.max(1);

    let estimate = match earliest_expiry {
        None => position * config.bootstrap_wait_minutes,
        Some(expiry) => {
            let seconds_until_slot = (expiry - now).num_seconds().max(0);
            let minutes_until_slot = (seconds_until_slot + 59) / 60;
            minutes_until_slot + (position - 1) * config.average_session_minutes
        }
    };

    estimate.clamp(0, config.max_estimated_wait_minutes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn config() -> SchedulerConfig {
        SchedulerConfig {
            average_session_minutes: 10,
            max_estimated_wait_minutes: 120,
            bootstrap_wait_minutes: 2,
            ..SchedulerConfig::default()
        }
    }

    fn snapshot(offset: Duration) -> (DateTimeWithTimeZone, DateTimeWithTimeZone) {
        let base = Utc::now();
        (base.into(), (base + offset).into())
    }

    #[test]
    fn test_head_of_queue_waits_for_next_expiry_only() {
        let (now, expiry) = snapshot(Duration::minutes(7));
        assert_eq!(estimate_wait_minutes(1, Some(expiry), now, &config()), 7);
    }

    #[test]
    fn test_deeper_positions_add_average_session_lengths() {
        let (now, expiry) = snapshot(Duration::minutes(5));
        assert_eq!(
            estimate_wait_minutes(3, Some(expiry), now, &config()),
            5 + 2 * 10
        );
    }

    #[test]
    fn test_partial_minutes_round_up() {
        let (now, expiry) = snapshot(Duration::seconds(61));
        assert_eq!(estimate_wait_minutes(1, Some(expiry), now, &config()), 2);
    }

    #[test]
    fn test_overdue_expiry_counts_as_immediate() {
        // The earliest active session is already past its ceiling; the
        // reaper just has not run yet.
        let (now, expiry) = snapshot(Duration::minutes(-4));
        assert_eq!(estimate_wait_minutes(1, Some(expiry), now, &config()), 0);
    }

    #[test]
    fn test_clamped_to_maximum() {
        let (now, expiry) = snapshot(Duration::minutes(30));
        assert_eq!(estimate_wait_minutes(50, Some(expiry), now, &config()), 120);
    }

    #[test]
    fn test_bootstrap_without_active_sessions() {
        let now: DateTimeWithTimeZone = Utc::now().into();
        assert_eq!(estimate_wait_minutes(1, None, now, &config()), 2);
        assert_eq!(estimate_wait_minutes(4, None, now, &config()), 8);
    }
}

//! Queue reconciler: promote into free slots, then heal the ordering
//!
//! Idempotent and safe to invoke concurrently and redundantly from every
//! trigger (status poll, end-of-session, post-cleanup). A promotion that
//! matches zero rows means another reconciler got there first; it is
//! skipped, never treated as an error.

use crate::config::SchedulerConfig;
use crate::db::Repository;
use crate::errors::Result;
use crate::metrics;

/// Run one reconciliation pass. Returns the number of sessions promoted
/// by this caller (racing callers each count only their own wins).
pub async fn reconcile(repo: &Repository, config: &SchedulerConfig) -> Result<u64> {
    // Fresh count at the point of decision; never carried over from the
    // triggering operation.
    let active_count = repo.count_active().await?;
    let slots = super::slots_available(active_count, config.max_concurrent_sessions);

    let mut promoted = 0u64;

    if slots > 0 {
        let candidates = repo.list_queued_ordered(Some(slots)).await?;

        for session in &candidates {
            if repo.promote_session(session.id).await? {
                promoted += 1;
                tracing::info!(
                    session_id = %session.id,
                    "Promoted queued session to active"
                );
            } else {
                tracing::debug!(
                    session_id = %session.id,
                    "Promotion already handled by a concurrent reconciler"
                );
            }
        }
    }

    // Renumber the remaining queue into a dense 1..N sequence. This is
    // what heals gaps and duplicate positions left by concurrent
    // admissions and promotions.
    let queued = repo.list_queued_ordered(None).await?;
    let positions: Vec<Option<i32>> = queued.iter().map(|s| s.queue_position).collect();

    for (index, new_position) in renumber_plan(&positions) {
        // Guarded on still-queued; a lost race here just means the next
        // pass renumbers again.
        repo.set_queue_position(queued[index].id, new_position).await?;
    }

    if promoted > 0 {
        metrics::record_promotions(promoted);
    }
    metrics::set_session_gauges(repo.count_active().await?, queued.len() as u64);

    Ok(promoted)
}

/// Compute the position rewrites needed to make `current` a dense 1..N
/// sequence, preserving the given order. Entries already holding their
/// target position are left untouched.
pub(crate) fn renumber_plan(current: &[Option<i32>]) -> Vec<(usize, i32)> {
    current
        .iter()
        .enumerate()
        .filter_map(|(index, position)| {
            let want = index as i32 + 1;
            (*position != Some(want)).then_some((index, want))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renumber_noop_when_dense() {
        // Idempotence: a second pass over a healed queue changes nothing
        let positions = vec![Some(1), Some(2), Some(3)];
        assert!(renumber_plan(&positions).is_empty());
    }

    #[test]
    fn test_renumber_heals_gaps() {
        // Positions 2, 5, 9 collapse to 1, 2, 3
        let positions = vec![Some(2), Some(5), Some(9)];
        assert_eq!(renumber_plan(&positions), vec![(0, 1), (1, 2), (2, 3)]);
    }

    #[test]
    fn test_renumber_heals_duplicates() {
        // Two back-to-back admissions both took position 2
        let positions = vec![Some(1), Some(2), Some(2)];
        assert_eq!(renumber_plan(&positions), vec![(2, 3)]);
    }

    #[test]
    fn test_renumber_assigns_missing_positions() {
        // A row whose advisory position was nulled mid-flight gets one
        let positions = vec![Some(1), None, Some(3)];
        assert_eq!(renumber_plan(&positions), vec![(1, 2)]);
    }

    #[test]
    fn test_renumber_preserves_order() {
        // The plan never reorders; density comes from rewriting in place,
        // so FIFO ordering established by the selection query is kept.
        let positions = vec![None, None, None];
        assert_eq!(renumber_plan(&positions), vec![(0, 1), (1, 2), (2, 3)]);
    }
}

//! Admission controller: first contact for a new session request
//!
//! Decides immediate activation vs. enqueue against fresh counts, assigns
//! an advisory queue position, and produces the initial wait estimate.
//! Also carries the email-link variant, where a `pending` row waits for the
//! holder to claim it before going through the same decision.

use crate::auth::generate_session_token;
use crate::config::SchedulerConfig;
use crate::db::models::{Session, SessionStatus};
use crate::db::{Repository, SessionOrigin};
use crate::errors::{AppError, Result};
use crate::mailer::Mailer;
use crate::metrics;

/// Pure admission decision over a snapshot of fresh counts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionDecision {
    /// A slot is free; the session starts active
    Admit,
    /// All slots taken but the queue has room; advisory position attached
    Enqueue { queue_position: i32 },
    /// Queue full: the one hard admission failure in the system
    Reject,
}

/// Outcome of a successful admission
#[derive(Debug, Clone)]
pub enum Admitted {
    Active {
        session: Session,
    },
    Queued {
        session: Session,
        queue_position: i64,
        estimated_wait_minutes: i64,
    },
}

/// Decide admission from fresh counts.
///
/// The computed queue position is advisory: concurrent admissions may
/// assign duplicates, which the next reconciler pass heals.
pub fn admission_decision(
    active_count: u64,
    queued_count: u64,
    config: &SchedulerConfig,
) -> AdmissionDecision {
    if super::slots_available(active_count, config.max_concurrent_sessions) > 0 {
        AdmissionDecision::Admit
    } else if queued_count >= config.max_queue_size as u64 {
        AdmissionDecision::Reject
    } else {
        AdmissionDecision::Enqueue {
            queue_position: queued_count as i32 + 1,
        }
    }
}

/// Admit a new session request: active slot, queue, or rejection.
///
/// Exactly one row is created per successful call; a rejected call creates
/// nothing.
pub async fn admit(
    repo: &Repository,
    config: &SchedulerConfig,
    origin: SessionOrigin,
) -> Result<Admitted> {
    let token = generate_session_token();
    let ttl = config.session_duration();

    let active_count = repo.count_active().await?;
    let queued_count = repo.count_queued().await?;

    match admission_decision(active_count, queued_count, config) {
        AdmissionDecision::Admit => {
            let session = repo.create_active_session(token, origin, ttl).await?;

            tracing::info!(
                session_id = %session.id,
                active = active_count + 1,
                max = config.max_concurrent_sessions,
                "Session admitted directly to an active slot"
            );
            metrics::record_admission("active");

            Ok(Admitted::Active { session })
        }
        AdmissionDecision::Reject => {
            tracing::warn!(
                queued = queued_count,
                max_queue_size = config.max_queue_size,
                "Admission rejected, queue full"
            );
            metrics::record_admission("rejected");

            Err(AppError::QueueFull {
                max_queue_size: config.max_queue_size,
            })
        }
        AdmissionDecision::Enqueue { queue_position } => {
            let session = repo
                .create_queued_session(token, queue_position, origin, ttl)
                .await?;

            let (position, estimated_wait_minutes) =
                estimate_or_fallback(repo, config, &session).await;

            tracing::info!(
                session_id = %session.id,
                queue_position = position,
                estimated_wait_minutes,
                "Session enqueued"
            );
            metrics::record_admission("queued");

            Ok(Admitted::Queued {
                session,
                queue_position: position,
                estimated_wait_minutes,
            })
        }
    }
}

/// Email-link admission variant: create a `pending` session and send the
/// claim link. The session only enters admission when the link is clicked.
pub async fn request_with_email(
    repo: &Repository,
    mailer: &dyn Mailer,
    claim_base_url: &str,
    config: &SchedulerConfig,
    origin: SessionOrigin,
) -> Result<Session> {
    let email = origin.email.clone().ok_or_else(|| AppError::MissingField {
        field: "email".to_string(),
    })?;

    let token = generate_session_token();
    let claim_url = format!("{}/{}/claim", claim_base_url.trim_end_matches('/'), token);

    let session = repo
        .create_pending_session(token, origin, config.session_duration())
        .await?;

    if let Err(e) = mailer.send_claim_link(&email, &claim_url).await {
        // The claim link will never arrive; retire the row rather than
        // leaving it to the reaper.
        if let Err(cleanup) = repo.end_session(&session.token).await {
            tracing::warn!(
                session_id = %session.id,
                error = %cleanup,
                "Failed to retire undeliverable pending session"
            );
        }
        return Err(e);
    }

    tracing::info!(
        session_id = %session.id,
        "Pending session created, claim link sent"
    );
    metrics::record_admission("pending");

    Ok(session)
}

/// Claim a pending session: runs the standard admission decision and moves
/// the existing row into `active` or `queued` via a guarded update.
pub async fn claim(
    repo: &Repository,
    config: &SchedulerConfig,
    token: &str,
) -> Result<Admitted> {
    let session = repo
        .find_session_by_token(token)
        .await?
        .ok_or(AppError::SessionNotFound)?;

    if session.is_expired() || session.is_terminal() {
        return Err(AppError::SessionExpired);
    }

    match session.session_status() {
        SessionStatus::Pending => {}
        status => {
            return Err(AppError::SessionNotClaimable {
                message: format!("session is already {}", String::from(status)),
            });
        }
    }

    let active_count = repo.count_active().await?;
    let queued_count = repo.count_queued().await?;

    match admission_decision(active_count, queued_count, config) {
        AdmissionDecision::Admit => {
            if repo.activate_pending_session(session.id).await? {
                metrics::record_admission("active");
            } else {
                tracing::debug!(session_id = %session.id, "Claim lost to a concurrent caller");
            }
            refreshed_outcome(repo, config, token).await
        }
        AdmissionDecision::Reject => Err(AppError::QueueFull {
            max_queue_size: config.max_queue_size,
        }),
        AdmissionDecision::Enqueue { queue_position } => {
            if repo
                .enqueue_pending_session(session.id, queue_position)
                .await?
            {
                metrics::record_admission("queued");
            } else {
                tracing::debug!(session_id = %session.id, "Claim lost to a concurrent caller");
            }
            refreshed_outcome(repo, config, token).await
        }
    }
}

/// Re-read a just-transitioned session and shape the admission outcome.
/// Tolerates losing the guarded update to a concurrent claim of the same
/// token: whatever state the row landed in is the answer.
async fn refreshed_outcome(
    repo: &Repository,
    config: &SchedulerConfig,
    token: &str,
) -> Result<Admitted> {
    let session = repo
        .find_session_by_token(token)
        .await?
        .ok_or(AppError::SessionNotFound)?;

    match session.session_status() {
        SessionStatus::Active => Ok(Admitted::Active { session }),
        SessionStatus::Queued => {
            let (position, estimated_wait_minutes) =
                estimate_or_fallback(repo, config, &session).await;
            Ok(Admitted::Queued {
                session,
                queue_position: position,
                estimated_wait_minutes,
            })
        }
        SessionStatus::Pending => Err(AppError::SessionNotClaimable {
            message: "claim did not take effect, retry".to_string(),
        }),
        _ => Err(AppError::SessionExpired),
    }
}

/// Wait estimation is display-only; a store hiccup here must not fail an
/// otherwise successful admission.
async fn estimate_or_fallback(
    repo: &Repository,
    config: &SchedulerConfig,
    session: &Session,
) -> (i64, i64) {
    match super::estimator::estimate_for_session(repo, config, session).await {
        Ok(estimate) => estimate,
        Err(e) => {
            tracing::warn!(error = %e, "Wait estimation failed, using stored position");
            let position = session.queue_position.unwrap_or(1) as i64;
            (position, position * config.average_session_minutes)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_concurrent: u32, max_queue: u32) -> SchedulerConfig {
        SchedulerConfig {
            max_concurrent_sessions: max_concurrent,
            max_queue_size: max_queue,
            ..SchedulerConfig::default()
        }
    }

    #[test]
    fn test_admit_while_slots_free() {
        let cfg = config(1, 10);
        assert_eq!(admission_decision(0, 0, &cfg), AdmissionDecision::Admit);
    }

    #[test]
    fn test_enqueue_when_full() {
        // Request B while A holds the single slot: queued at position 1
        let cfg = config(1, 10);
        assert_eq!(
            admission_decision(1, 0, &cfg),
            AdmissionDecision::Enqueue { queue_position: 1 }
        );
    }

    #[test]
    fn test_positions_assigned_in_arrival_order() {
        let cfg = config(1, 10);
        // Later arrivals always land behind earlier ones
        assert_eq!(
            admission_decision(1, 1, &cfg),
            AdmissionDecision::Enqueue { queue_position: 2 }
        );
        assert_eq!(
            admission_decision(1, 4, &cfg),
            AdmissionDecision::Enqueue { queue_position: 5 }
        );
    }

    #[test]
    fn test_reject_when_queue_full() {
        // maxQueueSize=0: request C while B is active is rejected outright
        let cfg = config(1, 0);
        assert_eq!(admission_decision(1, 0, &cfg), AdmissionDecision::Reject);

        let cfg = config(1, 3);
        assert_eq!(admission_decision(1, 3, &cfg), AdmissionDecision::Reject);
    }

    #[test]
    fn test_over_admitted_snapshot_still_enqueues() {
        // Transient over-admission (active > max) must not panic or admit
        let cfg = config(10, 5);
        assert_eq!(
            admission_decision(12, 0, &cfg),
            AdmissionDecision::Enqueue { queue_position: 1 }
        );
    }
}

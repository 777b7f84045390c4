//! Session lifecycle handlers
//!
//! Every status poll is also a reconciliation trigger: the queue has no
//! single owner, so each poll opportunistically promotes whatever free
//! capacity allows before answering.

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::AppState;
use parley_common::{
    db::{Repository, SessionOrigin},
    db::models::SessionStatus,
    errors::{AppError, Result},
    scheduler::{self, admission, estimator, reconciler, Admitted},
};

/// Create session request
#[derive(Debug, Deserialize, Validate)]
pub struct CreateSessionRequest {
    #[serde(default)]
    #[validate(email)]
    pub email: Option<String>,
}

/// Email-link session request
#[derive(Debug, Deserialize, Validate)]
pub struct EmailSessionRequest {
    #[validate(email)]
    pub email: String,
}

/// Admission outcome response (create and claim)
#[derive(Serialize)]
pub struct AdmissionResponse {
    pub status: String,
    pub session_id: Uuid,
    pub token: String,
    pub expires_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_wait_minutes: Option<i64>,
}

/// Pending session response
#[derive(Serialize)]
pub struct PendingSessionResponse {
    pub status: String,
    pub session_id: Uuid,
    pub token: String,
    pub expires_at: String,
}

/// Status poll response
#[derive(Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub session_id: Uuid,
    pub expires_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_wait_minutes: Option<i64>,
    pub active_sessions: u64,
    pub max_sessions: u32,
}

/// Heartbeat response
#[derive(Serialize)]
pub struct HeartbeatResponse {
    pub success: bool,
}

/// End session acknowledgment
#[derive(Serialize)]
pub struct EndSessionResponse {
    pub status: String,
}

fn origin_from_headers(headers: &HeaderMap, email: Option<String>) -> SessionOrigin {
    SessionOrigin {
        email,
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(String::from),
        referrer: headers
            .get(header::REFERER)
            .and_then(|v| v.to_str().ok())
            .map(String::from),
    }
}

fn admission_response(outcome: Admitted) -> (StatusCode, Json<AdmissionResponse>) {
    match outcome {
        Admitted::Active { session } => (
            StatusCode::CREATED,
            Json(AdmissionResponse {
                status: "active".to_string(),
                session_id: session.id,
                token: session.token,
                expires_at: session.expires_at.to_rfc3339(),
                queue_position: None,
                estimated_wait_minutes: None,
            }),
        ),
        Admitted::Queued {
            session,
            queue_position,
            estimated_wait_minutes,
        } => (
            StatusCode::OK,
            Json(AdmissionResponse {
                status: "queued".to_string(),
                session_id: session.id,
                token: session.token,
                expires_at: session.expires_at.to_rfc3339(),
                queue_position: Some(queue_position),
                estimated_wait_minutes: Some(estimated_wait_minutes),
            }),
        ),
    }
}

/// Request a new session: active slot, queue, or capacity rejection
pub async fn create_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<AdmissionResponse>)> {
    request.validate()?;

    let repo = Repository::new(state.db.clone());
    let origin = origin_from_headers(&headers, request.email);

    let outcome = admission::admit(&repo, &state.config.scheduler, origin).await?;

    Ok(admission_response(outcome))
}

/// Request a session via an email claim link
pub async fn request_email_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<EmailSessionRequest>,
) -> Result<(StatusCode, Json<PendingSessionResponse>)> {
    request.validate()?;

    let repo = Repository::new(state.db.clone());
    let origin = origin_from_headers(&headers, Some(request.email));

    let session = admission::request_with_email(
        &repo,
        state.mailer.as_ref(),
        &state.config.mailer.claim_base_url,
        &state.config.scheduler,
        origin,
    )
    .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(PendingSessionResponse {
            status: "pending".to_string(),
            session_id: session.id,
            token: session.token,
            expires_at: session.expires_at.to_rfc3339(),
        }),
    ))
}

/// Claim a pending session from its emailed link
pub async fn claim_session(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<(StatusCode, Json<AdmissionResponse>)> {
    let repo = Repository::new(state.db.clone());

    let outcome = admission::claim(&repo, &state.config.scheduler, &token).await?;

    Ok(admission_response(outcome))
}

/// Poll session status; may promote the session as a side effect
pub async fn get_status(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<StatusResponse>> {
    let repo = Repository::new(state.db.clone());

    // The poll is a legitimate reconciliation trigger; a failed pass must
    // not block a best-effort answer.
    if let Err(e) = reconciler::reconcile(&repo, &state.config.scheduler).await {
        tracing::warn!(error = %e, "Reconciliation on poll failed, serving stored state");
    }

    let session = repo
        .find_session_by_token(&token)
        .await?
        .ok_or(AppError::SessionNotFound)?;

    // A row past its ceiling that the reaper has not visited yet is
    // reported as expired; the store catches up on the next gc pass.
    let status = if !session.is_terminal() && session.is_expired() {
        SessionStatus::Expired
    } else {
        session.session_status()
    };

    let (queue_position, estimated_wait_minutes) = if status == SessionStatus::Queued {
        let (position, wait) =
            estimator::estimate_for_session(&repo, &state.config.scheduler, &session).await?;
        (Some(position), Some(wait))
    } else {
        (None, None)
    };

    let active_sessions = repo.count_active().await?;

    Ok(Json(StatusResponse {
        status: String::from(status),
        session_id: session.id,
        expires_at: session.expires_at.to_rfc3339(),
        queue_position,
        estimated_wait_minutes,
        active_sessions,
        max_sessions: state.config.scheduler.max_concurrent_sessions,
    }))
}

/// Record client-side activity for an active session
pub async fn heartbeat(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<HeartbeatResponse>> {
    let repo = Repository::new(state.db.clone());

    scheduler::record_heartbeat(&repo, &token).await?;

    Ok(Json(HeartbeatResponse { success: true }))
}

/// Voluntarily end a session and free its slot for the queue
pub async fn end_session(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<EndSessionResponse>> {
    let repo = Repository::new(state.db.clone());

    let ended = repo.end_session(&token).await?;

    if ended {
        tracing::info!("Session ended by holder");

        // Reuse the freed slot immediately instead of waiting for the
        // next poll or gc pass.
        if let Err(e) = reconciler::reconcile(&repo, &state.config.scheduler).await {
            tracing::warn!(error = %e, "Reconciliation after end failed");
        }
    } else {
        // Guard matched nothing: either unknown, or already terminal
        // (concurrent end/reap), which is an idempotent success.
        repo.find_session_by_token(&token)
            .await?
            .ok_or(AppError::SessionNotFound)?;
    }

    Ok(Json(EndSessionResponse {
        status: "ended".to_string(),
    }))
}

//! Conversation handler
//!
//! Thin glue between an active session and the opaque responder backend.
//! The scheduler core only sees its side effects: refreshed activity and
//! accumulated usage.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::AppState;
use parley_common::{
    db::models::SessionStatus,
    db::Repository,
    errors::{AppError, Result},
};

/// Message request
#[derive(Debug, Deserialize, Validate)]
pub struct PostMessageRequest {
    #[validate(length(min = 1, max = 4000))]
    pub message: String,
}

/// Message response
#[derive(Serialize)]
pub struct MessageResponse {
    pub reply: String,
    pub tokens_used: i64,
}

/// Send a message within an active session
pub async fn post_message(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(request): Json<PostMessageRequest>,
) -> Result<Json<MessageResponse>> {
    request.validate()?;

    let repo = Repository::new(state.db.clone());

    let session = repo
        .find_session_by_token(&token)
        .await?
        .ok_or(AppError::SessionNotFound)?;

    // Hard ceiling applies at call time even before the reaper runs
    if session.is_terminal() || session.is_expired() {
        return Err(AppError::SessionExpired);
    }

    if session.session_status() != SessionStatus::Active {
        return Err(AppError::Forbidden {
            message: "session is not active yet".to_string(),
        });
    }

    let reply = state.responder.reply(session.id, &request.message).await?;

    // Lost guard means the session was reclaimed mid-call; the reply still
    // goes out, the usage is simply not attributed.
    if !repo
        .record_usage(&token, reply.cost, reply.tokens_used)
        .await?
    {
        tracing::debug!(
            session_id = %session.id,
            "Usage not recorded, session no longer active"
        );
    }

    tracing::debug!(
        session_id = %session.id,
        tokens_used = reply.tokens_used,
        "Reply generated"
    );

    Ok(Json(MessageResponse {
        reply: reply.text,
        tokens_used: reply.tokens_used,
    }))
}

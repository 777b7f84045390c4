//! Privileged operator handlers

use axum::{extract::State, Json};
use serde::Serialize;

use crate::AppState;
use parley_common::{
    auth::AdminKey,
    db::Repository,
    errors::Result,
    scheduler::{reaper, GcReport},
};

/// Occupancy snapshot response
#[derive(Serialize)]
pub struct StatsResponse {
    pub active_sessions: u64,
    pub max_sessions: u32,
    pub queue_depth: u64,
    pub max_queue_size: u32,
}

/// Manually trigger a garbage collection pass
pub async fn run_gc(State(state): State<AppState>, admin: AdminKey) -> Result<Json<GcReport>> {
    admin.verify(&state.config.auth)?;

    let repo = Repository::new(state.db.clone());
    let report = reaper::run_gc(&repo, &state.config.scheduler).await?;

    tracing::info!(
        request_id = %admin.request_id,
        hard_expired = report.hard_expired,
        inactivity_expired = report.inactivity_expired,
        queue_activated = report.queue_activated,
        "Manual garbage collection triggered"
    );

    Ok(Json(report))
}

/// Current occupancy for the operator console
pub async fn stats(State(state): State<AppState>, admin: AdminKey) -> Result<Json<StatsResponse>> {
    admin.verify(&state.config.auth)?;

    let repo = Repository::new(state.db.clone());
    let (active_sessions, queue_depth) = repo.display_counts().await?;

    Ok(Json(StatsResponse {
        active_sessions,
        max_sessions: state.config.scheduler.max_concurrent_sessions,
        queue_depth,
        max_queue_size: state.config.scheduler.max_queue_size,
    }))
}

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Operator task routes.
//!
//! Called by a scheduler or an operator, never by map clients. All routes
//! require the bearer `SYNC_TOKEN`.

use crate::error::AppError;
use crate::middleware::require_sync_token;
use crate::services::snapshot::snapshot_once;
use crate::services::SyncEvent;
use crate::AppState;
use axum::{
    extract::{Json, State},
    http::StatusCode,
    middleware,
    routing::post,
    Router,
};
use serde::Serialize;
use std::sync::Arc;

/// Task routes, wrapped in the token check.
pub fn routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/tasks/resync", post(resync))
        .route("/tasks/snapshot", post(snapshot))
        .route_layer(middleware::from_fn_with_state(state, require_sync_token))
}

#[derive(Serialize)]
pub struct ResyncAccepted {
    pub queued: bool,
}

/// Queue a full resynchronization.
async fn resync(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<ResyncAccepted>), AppError> {
    state.queue.submit(SyncEvent::FullResync)?;
    tracing::info!("Full resync queued");
    Ok((StatusCode::ACCEPTED, Json(ResyncAccepted { queued: true })))
}

#[derive(Serialize)]
pub struct SnapshotResult {
    /// Written file, `None` when the archive was unchanged
    pub path: Option<String>,
}

/// Snapshot the archive now instead of waiting for the next interval.
async fn snapshot(State(state): State<Arc<AppState>>) -> Result<Json<SnapshotResult>, AppError> {
    if !state.archive.is_in_memory() {
        return Err(AppError::NotFound(
            "archive is not in snapshot mode".to_string(),
        ));
    }

    let path = snapshot_once(
        state.archive.clone(),
        state.config.snapshot_dir.clone(),
        state.config.snapshot_retention,
    )
    .await?;

    Ok(Json(SnapshotResult {
        path: path.map(|p| p.display().to_string()),
    }))
}

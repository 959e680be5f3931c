// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Webhook route for document-store mutation notifications.

use crate::error::AppError;
use crate::services::SyncEvent;
use crate::AppState;
use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

/// Webhook routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/webhook/{uuid}", post(handle_event))
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Trails,
    Ratings,
    Comments,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Update,
    Delete,
}

/// Mutation notification sent by the document store.
#[derive(Deserialize, Validate, Debug)]
pub struct MutationEvent {
    pub collection: Collection,
    pub action: Action,
    /// ID of the mutated record
    #[validate(length(min = 1, max = 128))]
    pub record_id: String,
    /// Owning trail; required for ratings and comments
    #[validate(length(min = 1, max = 128))]
    pub trail_id: Option<String>,
}

impl MutationEvent {
    /// Map the notification onto the sync event it triggers.
    pub fn into_sync_event(self) -> Result<SyncEvent, AppError> {
        let engagement_trail = |trail_id: Option<String>| {
            trail_id.ok_or_else(|| {
                AppError::BadRequest("trail_id is required for ratings and comments".to_string())
            })
        };

        Ok(match (self.collection, self.action) {
            (Collection::Trails, Action::Create) => SyncEvent::TrailCreated(self.record_id),
            (Collection::Trails, Action::Update) => SyncEvent::TrailUpdated(self.record_id),
            (Collection::Trails, Action::Delete) => SyncEvent::TrailDeleted(self.record_id),
            (Collection::Ratings, _) => SyncEvent::RatingChanged(engagement_trail(self.trail_id)?),
            (Collection::Comments, _) => {
                SyncEvent::CommentChanged(engagement_trail(self.trail_id)?)
            }
        })
    }
}

#[derive(Serialize)]
struct WebhookAck {
    queued: &'static str,
}

/// Handle a mutation notification (POST).
///
/// The event is queued and applied in the background; the response only
/// confirms acceptance.
async fn handle_event(
    State(state): State<Arc<AppState>>,
    Path(uuid): Path<String>,
    Json(payload): Json<serde_json::Value>,
) -> Result<Response, AppError> {
    // Validate Path UUID
    if uuid != state.config.webhook_path_uuid {
        tracing::warn!(
            received_uuid = %uuid,
            "Security Alert: Webhook path UUID mismatch"
        );
        return Ok(StatusCode::NOT_FOUND.into_response());
    }

    let event: MutationEvent = serde_json::from_value(payload).map_err(|e| {
        tracing::warn!(error = %e, "Failed to parse webhook event");
        AppError::BadRequest(e.to_string())
    })?;
    event
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    tracing::info!(
        collection = ?event.collection,
        action = ?event.action,
        record_id = %event.record_id,
        trail_id = ?event.trail_id,
        "Webhook event received"
    );

    let sync_event = event.into_sync_event()?;
    let kind = sync_event.kind();
    state.queue.submit(sync_event)?;

    Ok((StatusCode::ACCEPTED, Json(WebhookAck { queued: kind })).into_response())
}

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type shared by the sync engine and the HTTP layer.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Track file could not be parsed.
    #[error("Malformed track file: {0}")]
    MalformedInput(String),

    /// Track file parsed but contained no usable points.
    #[error("Track has no usable geometry: {0}")]
    EmptyGeometry(String),

    /// Spatial store connection lost or unusable. Callers retry.
    #[error("Spatial store unavailable: {0}")]
    StoreUnavailable(String),

    /// A spatial store statement failed or returned a row that does not decode.
    #[error("Spatial store query failed: {0}")]
    StoreQuery(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    /// A single tile failed to render.
    #[error("Tile render failed: {0}")]
    RenderFailure(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Authentication required")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Document store error: {0}")]
    Database(String),

    #[error("Tile cache error: {0}")]
    Cache(String),

    #[error("Sync queue is full")]
    QueueFull,

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// True when the failure is confined to one trail and the caller should
    /// log it and move on to the next trail.
    pub fn is_trail_local(&self) -> bool {
        matches!(
            self,
            AppError::MalformedInput(_) | AppError::EmptyGeometry(_) | AppError::NotFound(_)
        )
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        if is_connection_failure(&err) {
            AppError::StoreUnavailable(err.to_string())
        } else {
            AppError::StoreQuery(err.to_string())
        }
    }
}

/// SQLite failures that leave the whole database unusable, as opposed to a
/// single statement or row.
fn is_connection_failure(err: &rusqlite::Error) -> bool {
    use rusqlite::ErrorCode;

    match err {
        rusqlite::Error::SqliteFailure(e, _) => matches!(
            e.code,
            ErrorCode::CannotOpen
                | ErrorCode::NotADatabase
                | ErrorCode::DatabaseCorrupt
                | ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::SystemIoFailure
                | ErrorCode::DiskFull
                | ErrorCode::OutOfMemory
                | ErrorCode::PermissionDenied
                | ErrorCode::ReadOnly
                | ErrorCode::FileLockingProtocolFailed
        ),
        rusqlite::Error::InvalidPath(_) => true,
        _ => false,
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::MalformedInput(msg) => {
                (StatusCode::BAD_REQUEST, "malformed_input", Some(msg.clone()))
            }
            AppError::EmptyGeometry(msg) => {
                (StatusCode::BAD_REQUEST, "empty_geometry", Some(msg.clone()))
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", None),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "forbidden", None),
            AppError::QueueFull => (StatusCode::SERVICE_UNAVAILABLE, "queue_full", None),
            AppError::StoreUnavailable(msg) => {
                tracing::error!(error = %msg, "Spatial store unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable", None)
            }
            AppError::StoreQuery(msg) => {
                tracing::error!(error = %msg, "Spatial store query failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "store_query_error", None)
            }
            AppError::RenderFailure(msg) => {
                tracing::error!(error = %msg, "Tile render failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "render_failure", None)
            }
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Document store error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Cache(msg) => {
                tracing::error!(error = %msg, "Tile cache error");
                (StatusCode::INTERNAL_SERVER_ERROR, "cache_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias used across the crate.
pub type Result<T> = std::result::Result<T, AppError>;

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Bearer-token authentication for `/tasks/*` routes.

use crate::error::AppError;
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use subtle::ConstantTimeEq;

/// Require `Authorization: Bearer <SYNC_TOKEN>`.
///
/// A missing or malformed header is 401; a wrong token is 403.
pub async fn require_sync_token(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            tracing::warn!(path = %request.uri().path(), "Tasks request without bearer token");
            AppError::Unauthorized
        })?;

    let matches: bool = token
        .as_bytes()
        .ct_eq(state.config.sync_token.as_bytes())
        .into();
    if !matches {
        tracing::warn!(path = %request.uri().path(), "Security Alert: Tasks request with invalid token");
        return Err(AppError::Forbidden);
    }

    Ok(next.run(request).await)
}

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Vector tile endpoint.

use crate::error::AppError;
use crate::models::{CachedTile, TileCoord};
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::sync::Arc;

/// Media type of Mapbox vector tiles.
pub const MVT_CONTENT_TYPE: &str = "application/vnd.mapbox-vector-tile";

pub fn routes() -> Router<Arc<AppState>> {
    // The last segment is `{y}.mvt`; the router cannot split it.
    Router::new().route("/tiles/{z}/{x}/{tile}", get(get_tile))
}

/// Parse the `{y}.mvt` path segment.
fn parse_row(segment: &str) -> Option<u32> {
    segment.strip_suffix(".mvt")?.parse().ok()
}

/// Whether an `If-None-Match` header matches the tile's ETag.
fn etag_matches(headers: &HeaderMap, etag: &str) -> bool {
    headers
        .get_all(header::IF_NONE_MATCH)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .any(|candidate| candidate == "*" || candidate == etag)
}

/// GET /tiles/{z}/{x}/{y}.mvt
async fn get_tile(
    State(state): State<Arc<AppState>>,
    Path((z, x, tile)): Path<(u8, u32, String)>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let y = parse_row(&tile)
        .ok_or_else(|| AppError::BadRequest(format!("expected {{y}}.mvt, got {}", tile)))?;
    let coord = TileCoord::new(z, x, y);

    let Some(tile) = state.sync.get_tile(coord).await? else {
        return Ok(StatusCode::NO_CONTENT.into_response());
    };

    Ok(tile_response(&tile, &headers))
}

fn tile_response(tile: &CachedTile, headers: &HeaderMap) -> Response {
    let etag = tile.etag();
    let etag_value = match HeaderValue::from_str(&etag) {
        Ok(v) => v,
        Err(_) => return (StatusCode::OK, tile.data.clone()).into_response(),
    };

    if etag_matches(headers, &etag) {
        return (StatusCode::NOT_MODIFIED, [(header::ETAG, etag_value)]).into_response();
    }

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(MVT_CONTENT_TYPE)),
            (header::ETAG, etag_value),
            (header::CACHE_CONTROL, HeaderValue::from_static("no-cache")),
        ],
        tile.data.clone(),
    )
        .into_response()
}

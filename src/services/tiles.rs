// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Web Mercator tile math.
//!
//! Pure functions shared by the spatial store, the renderer and the archive.
//! Tiles use the XYZ scheme (row 0 at the north edge) everywhere except the
//! MBTiles archive, which stores TMS rows (see [`xyz_to_tms`]).

use crate::models::{BoundingBox, MercatorBounds, TileCoord, TileRange};
use std::collections::BTreeSet;
use std::f64::consts::PI;

/// Half the width of the Web Mercator world, in metres.
pub const WORLD_EXTENT: f64 = 20_037_508.342_789_244;

/// Latitude limit of Web Mercator, in degrees.
pub const MAX_LATITUDE: f64 = 85.0511;

/// Vector tile coordinate extent.
pub const TILE_EXTENT: u32 = 4096;

/// Clip buffer around a tile, in tile units.
pub const TILE_BUFFER: u32 = 64;

/// Zoom at which rendered geometry is no longer simplified.
pub const DETAIL_ZOOM: u8 = 15;

// ============================================================================
// Projection
// ============================================================================

/// Project lon/lat degrees to Web Mercator metres. Latitude is clamped.
pub fn lng_lat_to_mercator(lng: f64, lat: f64) -> (f64, f64) {
    let lat = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE);
    let x = lng * WORLD_EXTENT / 180.0;
    let y = ((90.0 + lat) * PI / 360.0).tan().ln() * WORLD_EXTENT / PI;
    (x, y)
}

/// Inverse of [`lng_lat_to_mercator`].
pub fn mercator_to_lng_lat(x: f64, y: f64) -> (f64, f64) {
    let lng = x / WORLD_EXTENT * 180.0;
    let lat = (y / WORLD_EXTENT * PI).sinh().atan().to_degrees();
    (lng, lat)
}

// ============================================================================
// Tile <-> geography
// ============================================================================

/// Bounds of a tile in Web Mercator metres.
///
/// The tile grid grows downward while Mercator Y grows upward, so row `y`
/// spans from `extent - (y + 1) * size` to `extent - y * size`.
pub fn tile_bounds(zoom: u8, x: u32, y: u32) -> MercatorBounds {
    let size = 2.0 * WORLD_EXTENT / 2.0_f64.powi(zoom as i32);
    MercatorBounds {
        x_min: -WORLD_EXTENT + x as f64 * size,
        x_max: -WORLD_EXTENT + (x as f64 + 1.0) * size,
        y_min: WORLD_EXTENT - (y as f64 + 1.0) * size,
        y_max: WORLD_EXTENT - y as f64 * size,
    }
}

/// Bounds of a tile in degrees.
pub fn tile_lng_lat_bounds(coord: TileCoord) -> BoundingBox {
    let b = tile_bounds(coord.z, coord.x, coord.y);
    let (west, south) = mercator_to_lng_lat(b.x_min, b.y_min);
    let (east, north) = mercator_to_lng_lat(b.x_max, b.y_max);
    BoundingBox {
        north,
        south,
        east,
        west,
    }
}

/// Tile containing a point at the given zoom.
pub fn lat_lng_to_tile(lat: f64, lng: f64, zoom: u8) -> (u32, u32) {
    let n = 2.0_f64.powi(zoom as i32);
    let lat_rad = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();

    let x = ((lng + 180.0) / 360.0 * n).floor();
    let y = ((1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0 * n).floor();

    let max_index = n - 1.0;
    (x.clamp(0.0, max_index) as u32, y.clamp(0.0, max_index) as u32)
}

/// Range of tiles covered by a bounding box.
///
/// Degenerate boxes produce an empty range rather than an error so callers
/// can iterate unconditionally.
pub fn bbox_to_tile_range(bbox: &BoundingBox, zoom: u8) -> TileRange {
    if bbox.is_degenerate() {
        return TileRange::empty(zoom);
    }

    let (x_a, y_a) = lat_lng_to_tile(bbox.north, bbox.west, zoom);
    let (x_b, y_b) = lat_lng_to_tile(bbox.south, bbox.east, zoom);

    TileRange {
        zoom,
        min_x: x_a.min(x_b),
        min_y: y_a.min(y_b),
        max_x: x_a.max(x_b),
        max_y: y_a.max(y_b),
    }
}

/// Every tile covered by `bbox` across `min_zoom..=max_zoom`.
pub fn tile_set_for_bbox(bbox: &BoundingBox, min_zoom: u8, max_zoom: u8) -> BTreeSet<TileCoord> {
    (min_zoom..=max_zoom)
        .flat_map(|zoom| bbox_to_tile_range(bbox, zoom).tiles().collect::<Vec<_>>())
        .collect()
}

// ============================================================================
// Rendering parameters
// ============================================================================

/// Douglas-Peucker tolerance in Mercator metres for a zoom level.
///
/// Non-increasing in zoom; zero from [`DETAIL_ZOOM`] upward.
pub fn simplification_tolerance(zoom: u8) -> f64 {
    match zoom {
        0..=7 => 500.0,
        8..=9 => 200.0,
        10..=11 => 50.0,
        12..=13 => 10.0,
        14 => 2.0,
        _ => 0.0,
    }
}

/// Convert an XYZ row to the TMS row used by MBTiles. Its own inverse.
pub fn xyz_to_tms(zoom: u8, y: u32) -> u32 {
    ((1u64 << zoom) - 1 - y as u64) as u32
}

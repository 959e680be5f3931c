// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Tile coordinates, ranges and bounding boxes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An XYZ tile address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileCoord {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

impl TileCoord {
    pub fn new(z: u8, x: u32, y: u32) -> Self {
        Self { z, x, y }
    }

    /// True when `x` and `y` are inside the `2^z` grid.
    pub fn is_valid(&self) -> bool {
        if self.z > crate::config::MAX_SUPPORTED_ZOOM {
            return false;
        }
        let n = 1u64 << self.z;
        (self.x as u64) < n && (self.y as u64) < n
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// Geographic bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl BoundingBox {
    /// A box is degenerate when it has no area (or is inverted / not finite).
    pub fn is_degenerate(&self) -> bool {
        let finite = [self.north, self.south, self.east, self.west]
            .iter()
            .all(|v| v.is_finite());
        !finite || self.north <= self.south || self.east <= self.west
    }
}

/// Tile bounds in Web Mercator metres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MercatorBounds {
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
}

/// Inclusive range of tile indices at one zoom level.
///
/// `min_x > max_x` marks an empty range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRange {
    pub zoom: u8,
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

impl TileRange {
    pub fn empty(zoom: u8) -> Self {
        Self {
            zoom,
            min_x: 1,
            min_y: 1,
            max_x: 0,
            max_y: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min_x > self.max_x || self.min_y > self.max_y
    }

    /// Number of tiles in the range.
    pub fn len(&self) -> usize {
        if self.is_empty() {
            return 0;
        }
        let cols = (self.max_x - self.min_x) as usize + 1;
        let rows = (self.max_y - self.min_y) as usize + 1;
        cols * rows
    }

    /// Iterate every coordinate in the range, row-major.
    pub fn tiles(&self) -> impl Iterator<Item = TileCoord> + '_ {
        let (xs, ys) = if self.is_empty() {
            (1..=0, 1..=0)
        } else {
            (self.min_x..=self.max_x, self.min_y..=self.max_y)
        };
        let zoom = self.zoom;
        ys.flat_map(move |y| xs.clone().map(move |x| TileCoord::new(zoom, x, y)))
    }
}

/// A rendered tile held by a cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedTile {
    pub coord: TileCoord,
    /// Encoded vector tile bytes
    pub data: Vec<u8>,
    /// Monotonic freshness token
    pub version: u64,
}

impl CachedTile {
    /// Strong ETag value for conditional requests.
    pub fn etag(&self) -> String {
        format!("\"{}-{:x}\"", self.coord, self.version).replace('/', "-")
    }
}

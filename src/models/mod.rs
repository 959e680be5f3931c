// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the tile engine.

pub mod engagement;
pub mod tile;
pub mod trail;

pub use engagement::EngagementStats;
pub use tile::{BoundingBox, CachedTile, MercatorBounds, TileCoord, TileRange};
pub use trail::{
    Comment, Difficulty, ElevationData, ElevationPoint, Rating, TrackFile, Trail, TrailDocument,
};

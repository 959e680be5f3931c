// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Tile caches.
//!
//! Two backends sit behind [`TileCache`]: a volatile [`MemoryCache`] and a
//! durable MBTiles [`ArchiveCache`]. The orchestrator holds them as a closed
//! list of [`TileCacheBackend`] values and treats every entry the same way.

pub mod archive;
pub mod memory;

pub use archive::ArchiveCache;
pub use memory::MemoryCache;

use crate::error::AppError;
use crate::models::{CachedTile, TileCoord};
use std::sync::Arc;

/// Errors raised by a cache backend.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0} lock poisoned")]
    Poisoned(&'static str),
}

impl From<CacheError> for AppError {
    fn from(err: CacheError) -> Self {
        AppError::Cache(err.to_string())
    }
}

/// Storage for rendered tiles.
///
/// A cache only holds zooms within `min_zoom()..=max_zoom()`; stores outside
/// that range are ignored.
pub trait TileCache: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn min_zoom(&self) -> u8;

    fn max_zoom(&self) -> u8;

    fn supports(&self, zoom: u8) -> bool {
        (self.min_zoom()..=self.max_zoom()).contains(&zoom)
    }

    fn get_tile(&self, coord: TileCoord) -> Result<Option<CachedTile>, CacheError>;

    /// Insert or overwrite the tile at `tile.coord`.
    fn store_tile(&self, tile: &CachedTile) -> Result<(), CacheError>;

    fn clear_tile(&self, coord: TileCoord) -> Result<(), CacheError>;

    fn clear_all(&self) -> Result<(), CacheError>;
}

/// The cache variants the service can register.
#[derive(Clone)]
pub enum TileCacheBackend {
    Memory(Arc<MemoryCache>),
    Archive(Arc<ArchiveCache>),
}

impl TileCacheBackend {
    fn inner(&self) -> &dyn TileCache {
        match self {
            TileCacheBackend::Memory(cache) => cache.as_ref(),
            TileCacheBackend::Archive(cache) => cache.as_ref(),
        }
    }
}

impl TileCache for TileCacheBackend {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn min_zoom(&self) -> u8 {
        self.inner().min_zoom()
    }

    fn max_zoom(&self) -> u8 {
        self.inner().max_zoom()
    }

    fn get_tile(&self, coord: TileCoord) -> Result<Option<CachedTile>, CacheError> {
        self.inner().get_tile(coord)
    }

    fn store_tile(&self, tile: &CachedTile) -> Result<(), CacheError> {
        self.inner().store_tile(tile)
    }

    fn clear_tile(&self, coord: TileCoord) -> Result<(), CacheError> {
        self.inner().clear_tile(coord)
    }

    fn clear_all(&self) -> Result<(), CacheError> {
        self.inner().clear_all()
    }
}

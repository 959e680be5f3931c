// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Volatile in-process tile cache.

use crate::cache::{CacheError, TileCache};
use crate::models::{CachedTile, TileCoord};
use std::collections::HashMap;
use std::sync::RwLock;

/// Tile map behind a reader/writer lock.
///
/// Lookups take the read lock; stores, clears and `clear_all` take the write
/// lock. The map never leaves this type.
pub struct MemoryCache {
    tiles: RwLock<HashMap<TileCoord, CachedTile>>,
    min_zoom: u8,
    max_zoom: u8,
}

impl MemoryCache {
    pub fn new(min_zoom: u8, max_zoom: u8) -> Self {
        Self {
            tiles: RwLock::new(HashMap::new()),
            min_zoom,
            max_zoom,
        }
    }

    /// Number of cached tiles.
    pub fn len(&self) -> usize {
        self.tiles.read().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TileCache for MemoryCache {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn min_zoom(&self) -> u8 {
        self.min_zoom
    }

    fn max_zoom(&self) -> u8 {
        self.max_zoom
    }

    fn get_tile(&self, coord: TileCoord) -> Result<Option<CachedTile>, CacheError> {
        let tiles = self
            .tiles
            .read()
            .map_err(|_| CacheError::Poisoned("memory cache"))?;
        Ok(tiles.get(&coord).cloned())
    }

    fn store_tile(&self, tile: &CachedTile) -> Result<(), CacheError> {
        if !self.supports(tile.coord.z) {
            return Ok(());
        }
        self.tiles
            .write()
            .map_err(|_| CacheError::Poisoned("memory cache"))?
            .insert(tile.coord, tile.clone());
        Ok(())
    }

    fn clear_tile(&self, coord: TileCoord) -> Result<(), CacheError> {
        self.tiles
            .write()
            .map_err(|_| CacheError::Poisoned("memory cache"))?
            .remove(&coord);
        Ok(())
    }

    fn clear_all(&self) -> Result<(), CacheError> {
        let old = {
            let mut tiles = self
                .tiles
                .write()
                .map_err(|_| CacheError::Poisoned("memory cache"))?;
            std::mem::take(&mut *tiles)
        };
        tracing::debug!(tiles = old.len(), "Memory cache cleared");
        drop(old);
        Ok(())
    }
}

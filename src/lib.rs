// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Trail-Tiles: vector tile sync and caching for a trail-sharing map
//!
//! This crate keeps a spatial store of trails in step with the document
//! store that owns them, renders Mapbox vector tiles from it and serves them
//! through a memory cache and a durable MBTiles archive.

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use cache::{ArchiveCache, MemoryCache, TileCacheBackend};
use config::{ArchiveMode, Config};
use db::{DocumentStore, GeospatialStore};
use error::Result;
use services::{SyncOrchestrator, SyncQueue};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub sync: Arc<SyncOrchestrator<DocumentStore>>,
    pub queue: SyncQueue,
    /// Archive cache, kept for snapshots
    pub archive: Arc<ArchiveCache>,
}

impl AppState {
    /// Open the stores and caches and start the sync workers.
    ///
    /// In snapshot mode the newest snapshot is restored into the archive
    /// before any tile is served. Must be called inside a tokio runtime.
    pub fn build(config: Config, documents: DocumentStore) -> Result<Self> {
        let store = Arc::new(GeospatialStore::open(
            &config.spatial_db_path,
            config.min_zoom,
            config.max_zoom,
        )?);

        let archive = match config.archive_mode {
            ArchiveMode::Snapshot => {
                let archive = ArchiveCache::in_memory(config.min_zoom, config.max_zoom)?;
                archive.restore_latest(&config.snapshot_dir)?;
                archive
            }
            ArchiveMode::File => {
                ArchiveCache::open_file(&config.archive_path, config.min_zoom, config.max_zoom)?
            }
        };
        let archive = Arc::new(archive);

        let memory = Arc::new(MemoryCache::new(config.min_zoom, config.max_zoom));
        let caches = vec![
            TileCacheBackend::Memory(memory),
            TileCacheBackend::Archive(archive.clone()),
        ];

        let sync = Arc::new(SyncOrchestrator::new(documents, store, caches));
        let queue = SyncQueue::start(
            sync.clone(),
            config.sync_workers,
            config.sync_queue_capacity,
        );

        Ok(Self {
            config,
            sync,
            queue,
            archive,
        })
    }
}

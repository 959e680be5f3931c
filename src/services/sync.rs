// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Sync orchestrator.
//!
//! Reacts to document-store mutations by updating the spatial store,
//! working out which tiles changed and pushing fresh renders to every cache.
//! Also serves tiles through the caches with a render on miss.

use crate::cache::{TileCache, TileCacheBackend};
use crate::db::{GeospatialStore, TrailSource};
use crate::error::{AppError, Result};
use crate::models::{CachedTile, EngagementStats, TileCoord, Trail, TrailDocument};
use crate::services::ingest::ingest_gpx;
use crate::services::queue::SyncEvent;
use crate::services::tiles::tile_set_for_bbox;
use dashmap::DashMap;
use futures_util::{stream, StreamExt};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Concurrent document-store fetches during a full resync.
const MAX_CONCURRENT_FETCHES: usize = 16;

/// Sync state of one trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    /// Not in the spatial store.
    Absent,
    /// Document changed; tiles not regenerated yet.
    Stale,
    Synced,
}

/// Outcome of one render fan-out batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RenderReport {
    /// Tiles rendered and stored
    pub rendered: usize,
    /// Tiles with no features, removed from caches
    pub cleared: usize,
    /// Tiles skipped after a render error
    pub failed: usize,
}

impl RenderReport {
    pub fn total(&self) -> usize {
        self.rendered + self.cleared + self.failed
    }
}

/// Result of a full resynchronization.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResyncReport {
    pub trails_synced: usize,
    pub trails_failed: usize,
    pub tiles_rendered: usize,
    pub tiles_failed: usize,
}

/// Monotonic tile version source: milliseconds since the epoch, bumped to
/// stay strictly increasing.
#[derive(Debug, Default)]
pub struct VersionClock {
    last: AtomicU64,
}

impl VersionClock {
    pub fn next(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(last + 1);
            match self.last.compare_exchange_weak(
                last,
                candidate,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return candidate,
                Err(actual) => last = actual,
            }
        }
    }

    /// Never hand out a version at or below `version`.
    pub fn observe(&self, version: u64) {
        self.last.fetch_max(version, Ordering::AcqRel);
    }
}

/// Keeps the spatial store and the tile caches in step with the document store.
pub struct SyncOrchestrator<S: TrailSource> {
    source: S,
    store: Arc<GeospatialStore>,
    caches: Vec<TileCacheBackend>,
    states: DashMap<String, SyncState>,
    clock: VersionClock,
    warm: AtomicBool,
}

impl<S: TrailSource> SyncOrchestrator<S> {
    /// Build an orchestrator. Caches are consulted in the order given.
    pub fn new(source: S, store: Arc<GeospatialStore>, caches: Vec<TileCacheBackend>) -> Self {
        let clock = VersionClock::default();
        for cache in &caches {
            if let TileCacheBackend::Archive(archive) = cache {
                match archive.max_version() {
                    Ok(version) => clock.observe(version),
                    Err(e) => tracing::warn!(error = %e, "Failed to read archived tile versions"),
                }
            }
        }

        Self {
            source,
            store,
            caches,
            states: DashMap::new(),
            clock,
            warm: AtomicBool::new(false),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn store(&self) -> &GeospatialStore {
        &self.store
    }

    pub fn caches(&self) -> &[TileCacheBackend] {
        &self.caches
    }

    pub fn sync_state(&self, trail_id: &str) -> SyncState {
        self.states
            .get(trail_id)
            .map(|s| *s)
            .unwrap_or(SyncState::Absent)
    }

    /// True once a full resync has completed.
    pub fn is_warm(&self) -> bool {
        self.warm.load(Ordering::Acquire)
    }

    pub fn mark_warm(&self) {
        self.warm.store(true, Ordering::Release);
    }

    /// Apply one queued event.
    pub async fn handle(&self, event: SyncEvent) -> Result<()> {
        match event {
            SyncEvent::TrailCreated(id) => self.trail_created(&id).await.map(|_| ()),
            SyncEvent::TrailUpdated(id) => self.trail_updated(&id).await.map(|_| ()),
            SyncEvent::TrailDeleted(id) => self.trail_deleted(&id).await.map(|_| ()),
            SyncEvent::RatingChanged(id) | SyncEvent::CommentChanged(id) => {
                self.engagement_changed(&id).await.map(|_| ())
            }
            SyncEvent::FullResync => self.full_resync().await.map(|_| ()),
        }
    }

    // ─── Mutation handlers ───────────────────────────────────────

    /// A trail was created: ingest, store and render its tiles.
    pub async fn trail_created(&self, trail_id: &str) -> Result<RenderReport> {
        let doc = self
            .source
            .get_trail(trail_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("trail {} not in document store", trail_id)))?;

        let trail = self.load_trail(&doc).await?;
        self.store.upsert_trail(&trail)?;
        self.states.insert(trail_id.to_string(), SyncState::Stale);

        let tiles = self.affected_tiles(trail_id)?;
        let report = self.refresh(trail_id, tiles)?;
        self.states.insert(trail_id.to_string(), SyncState::Synced);

        tracing::info!(
            trail_id,
            rendered = report.rendered,
            failed = report.failed,
            "Trail created"
        );
        Ok(report)
    }

    /// A trail changed: regenerate the union of its old and new tile sets.
    ///
    /// A trail that vanished from the document store is handled as a delete.
    pub async fn trail_updated(&self, trail_id: &str) -> Result<RenderReport> {
        let Some(doc) = self.source.get_trail(trail_id).await? else {
            tracing::info!(trail_id, "Updated trail no longer exists, deleting");
            return self.trail_deleted(trail_id).await;
        };

        let old_tiles = self.affected_tiles(trail_id)?;
        self.states.insert(trail_id.to_string(), SyncState::Stale);

        let trail = self.load_trail(&doc).await?;
        self.store.upsert_trail(&trail)?;
        let new_tiles = self.affected_tiles(trail_id)?;

        let report = match (old_tiles, new_tiles) {
            (Some(old), Some(new)) => {
                let union: BTreeSet<TileCoord> = old.union(&new).copied().collect();
                self.render_and_push(&union)?
            }
            (_, new) => {
                tracing::warn!(trail_id, "Tile set unknown before or after update, clearing all caches");
                self.clear_all_caches()?;
                self.render_and_push(&new.unwrap_or_default())?
            }
        };
        self.states.insert(trail_id.to_string(), SyncState::Synced);

        tracing::info!(
            trail_id,
            rendered = report.rendered,
            cleared = report.cleared,
            failed = report.failed,
            "Trail updated"
        );
        Ok(report)
    }

    /// A trail was deleted: drop it and regenerate the tiles it covered.
    pub async fn trail_deleted(&self, trail_id: &str) -> Result<RenderReport> {
        let tiles = self.affected_tiles(trail_id)?;
        let was_present = self.store.delete_trail(trail_id)?;
        self.states.remove(trail_id);

        let report = self.refresh(trail_id, tiles)?;

        tracing::info!(
            trail_id,
            was_present,
            rendered = report.rendered,
            cleared = report.cleared,
            "Trail deleted"
        );
        Ok(report)
    }

    /// Ratings or comments of a trail changed: refresh engagement columns
    /// and regenerate the trail's tiles.
    pub async fn engagement_changed(&self, trail_id: &str) -> Result<RenderReport> {
        let stats = self.engagement_for(trail_id).await?;

        if !self.store.update_engagement_stats(trail_id, &stats)? {
            tracing::warn!(trail_id, "Engagement changed for unsynced trail, clearing all caches");
            self.clear_all_caches()?;
            return Ok(RenderReport::default());
        }

        let tiles = self.affected_tiles(trail_id)?;
        let report = self.refresh(trail_id, tiles)?;

        tracing::info!(
            trail_id,
            rating_count = stats.rating_count,
            comment_count = stats.comment_count,
            rendered = report.rendered,
            "Engagement updated"
        );
        Ok(report)
    }

    /// Rebuild the spatial store and every cache from the document store.
    ///
    /// Tiles shared by several trails are rendered once, after all trails are
    /// loaded. Trails that fail to ingest are logged and counted.
    pub async fn full_resync(&self) -> Result<ResyncReport> {
        tracing::info!("Starting full resync");

        self.store.clear()?;
        self.clear_all_caches()?;
        self.states.clear();

        let docs = self.source.list_all_trails().await?;
        let loaded: Vec<(String, Result<Trail>)> = stream::iter(docs)
            .map(|doc| async move {
                let result = self.load_trail(&doc).await;
                (doc.id, result)
            })
            .buffer_unordered(MAX_CONCURRENT_FETCHES)
            .collect()
            .await;

        let mut report = ResyncReport::default();
        let mut tiles = BTreeSet::new();
        let mut synced = Vec::new();

        for (trail_id, result) in loaded {
            let trail = match result {
                Ok(trail) => trail,
                Err(e) if e.is_trail_local() => {
                    tracing::warn!(trail_id = %trail_id, error = %e, "Skipping trail during resync");
                    report.trails_failed += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };

            self.store.upsert_trail(&trail)?;
            tiles.extend(self.store.trail_tile_set(&trail_id)?);
            self.states.insert(trail_id.clone(), SyncState::Stale);
            synced.push(trail_id);
        }

        let render = self.render_and_push(&tiles)?;
        for trail_id in synced {
            self.states.insert(trail_id, SyncState::Synced);
            report.trails_synced += 1;
        }
        report.tiles_rendered = render.rendered;
        report.tiles_failed = render.failed;
        self.mark_warm();

        tracing::info!(
            trails_synced = report.trails_synced,
            trails_failed = report.trails_failed,
            tiles_rendered = report.tiles_rendered,
            tiles_failed = report.tiles_failed,
            "Full resync complete"
        );
        Ok(report)
    }

    // ─── Rendering ───────────────────────────────────────────────

    /// Render every tile in `tiles` and push the results to all caches.
    ///
    /// A tile with no features is cleared from the caches. A tile that fails
    /// to render is logged and skipped. Only a lost spatial store aborts the
    /// batch.
    pub fn render_and_push(&self, tiles: &BTreeSet<TileCoord>) -> Result<RenderReport> {
        let mut report = RenderReport::default();

        for &coord in tiles {
            match self.store.render_tile(coord) {
                Ok(Some(data)) => {
                    let tile = CachedTile {
                        coord,
                        data,
                        version: self.clock.next(),
                    };
                    self.push(&tile, &self.caches);
                    report.rendered += 1;
                }
                Ok(None) => {
                    for cache in &self.caches {
                        if let Err(e) = cache.clear_tile(coord) {
                            tracing::warn!(cache = cache.name(), tile = %coord, error = %e, "Cache clear failed");
                        }
                    }
                    report.cleared += 1;
                }
                Err(e @ AppError::StoreUnavailable(_)) => return Err(e),
                Err(e) => {
                    tracing::warn!(tile = %coord, error = %e, "Tile render failed, skipping");
                    report.failed += 1;
                }
            }
        }

        tracing::debug!(
            rendered = report.rendered,
            cleared = report.cleared,
            failed = report.failed,
            "Render batch complete"
        );
        Ok(report)
    }

    /// Fetch a tile through the caches, rendering it on a total miss.
    ///
    /// A hit in a later cache back-fills the earlier ones. `None` means the
    /// tile has no features.
    pub async fn get_tile(&self, coord: TileCoord) -> Result<Option<CachedTile>> {
        let (min_zoom, max_zoom) = self.store.zoom_range();
        if !coord.is_valid() || coord.z < min_zoom || coord.z > max_zoom {
            return Err(AppError::BadRequest(format!("tile {} out of range", coord)));
        }

        for (i, cache) in self.caches.iter().enumerate() {
            if !cache.supports(coord.z) {
                continue;
            }
            match cache.get_tile(coord) {
                Ok(Some(tile)) => {
                    self.push(&tile, &self.caches[..i]);
                    return Ok(Some(tile));
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(cache = cache.name(), tile = %coord, error = %e, "Cache read failed");
                }
            }
        }

        let Some(data) = self.store.render_tile(coord)? else {
            return Ok(None);
        };
        let tile = CachedTile {
            coord,
            data,
            version: self.clock.next(),
        };
        self.push(&tile, &self.caches);
        tracing::debug!(tile = %coord, bytes = tile.data.len(), "Rendered tile on cache miss");
        Ok(Some(tile))
    }

    // ─── Helpers ─────────────────────────────────────────────────

    fn push(&self, tile: &CachedTile, caches: &[TileCacheBackend]) {
        for cache in caches {
            if !cache.supports(tile.coord.z) {
                continue;
            }
            if let Err(e) = cache.store_tile(tile) {
                tracing::warn!(cache = cache.name(), tile = %tile.coord, error = %e, "Cache store failed");
            }
        }
    }

    /// Clear every registered cache.
    pub fn clear_all_caches(&self) -> Result<()> {
        for cache in &self.caches {
            cache.clear_all()?;
        }
        Ok(())
    }

    /// Tiles a trail touches, or `None` when they cannot be worked out from
    /// its bounding box: the trail is not in the spatial store, or the box
    /// has no area. A flat box yields an empty tile range, yet the trail
    /// still renders into the tiles it sits on.
    fn affected_tiles(&self, trail_id: &str) -> Result<Option<BTreeSet<TileCoord>>> {
        let bbox = match self.store.trail_bounding_box(trail_id) {
            Ok(bbox) => bbox,
            Err(AppError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        if bbox.is_degenerate() {
            return Ok(None);
        }
        let (min_zoom, max_zoom) = self.store.zoom_range();
        Ok(Some(tile_set_for_bbox(&bbox, min_zoom, max_zoom)))
    }

    /// Regenerate `tiles`, or clear every cache when they are unknown.
    fn refresh(&self, trail_id: &str, tiles: Option<BTreeSet<TileCoord>>) -> Result<RenderReport> {
        match tiles {
            Some(tiles) => self.render_and_push(&tiles),
            None => {
                tracing::warn!(trail_id, "Tile set unknown, clearing all caches");
                self.clear_all_caches()?;
                Ok(RenderReport::default())
            }
        }
    }

    async fn engagement_for(&self, trail_id: &str) -> Result<EngagementStats> {
        let ratings = self.source.ratings_for_trail(trail_id).await?;
        let comments = self.source.comments_for_trail(trail_id).await?;
        Ok(EngagementStats::compute(&ratings, &comments))
    }

    /// Fetch the track, ingest it and assemble the spatial-store row.
    async fn load_trail(&self, doc: &TrailDocument) -> Result<Trail> {
        let bytes = self.source.fetch_track(&doc.id).await?.ok_or_else(|| {
            AppError::EmptyGeometry(format!("trail {} has no track file", doc.id))
        })?;
        let track = ingest_gpx(&bytes)?;
        let engagement = self.engagement_for(&doc.id).await?;

        Ok(Trail::from_document(
            doc,
            track.geometry,
            track.elevation,
            track.distance,
            engagement,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{ArchiveCache, MemoryCache};
    use crate::db::MemoryDocumentStore;
    use crate::models::Rating;
    use crate::services::tiles::{bbox_to_tile_range, lat_lng_to_tile};
    use chrono::Utc;

    fn gpx(points: &[(f64, f64)]) -> Vec<u8> {
        let pts: String = points
            .iter()
            .map(|(lng, lat)| format!(r#"<trkpt lat="{}" lon="{}"><ele>500</ele></trkpt>"#, lat, lng))
            .collect();
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="tests" xmlns="http://www.topografix.com/GPX/1/1"><trk><trkseg>{}</trkseg></trk></gpx>"#,
            pts
        )
        .into_bytes()
    }

    fn doc(id: &str) -> TrailDocument {
        TrailDocument {
            id: id.to_string(),
            name: format!("Trail {}", id),
            description: String::new(),
            level: Default::default(),
            tags: vec!["flow".to_string()],
            owner: "u1".to_string(),
            ridden: false,
            created: Utc::now(),
            updated: Utc::now(),
        }
    }

    struct Harness {
        docs: MemoryDocumentStore,
        memory: Arc<MemoryCache>,
        archive: Arc<ArchiveCache>,
        sync: SyncOrchestrator<MemoryDocumentStore>,
    }

    fn harness() -> Harness {
        let docs = MemoryDocumentStore::new();
        let store = Arc::new(GeospatialStore::in_memory(6, 18).unwrap());
        let memory = Arc::new(MemoryCache::new(6, 18));
        let archive = Arc::new(ArchiveCache::in_memory(6, 18).unwrap());
        let sync = SyncOrchestrator::new(
            docs.clone(),
            store,
            vec![
                TileCacheBackend::Memory(memory.clone()),
                TileCacheBackend::Archive(archive.clone()),
            ],
        );
        Harness {
            docs,
            memory,
            archive,
            sync,
        }
    }

    fn add_trail(h: &Harness, id: &str, points: &[(f64, f64)]) {
        h.docs.put_trail(doc(id));
        h.docs.put_track(id, gpx(points));
    }

    #[test]
    fn test_version_clock_is_strictly_increasing() {
        let clock = VersionClock::default();
        let mut last = 0;
        for _ in 0..1000 {
            let v = clock.next();
            assert!(v > last);
            last = v;
        }
        clock.observe(u64::MAX / 2);
        assert!(clock.next() > u64::MAX / 2);
    }

    #[tokio::test]
    async fn test_create_renders_tile_set_into_both_caches() {
        let h = harness();
        add_trail(&h, "t1", &[(6.62, 46.52), (6.64, 46.53)]);

        let report = h.sync.trail_created("t1").await.unwrap();
        let tiles = h.sync.store().trail_tile_set("t1").unwrap();
        assert_eq!(report.total(), tiles.len());
        assert!(report.rendered > 0);
        assert_eq!(h.sync.sync_state("t1"), SyncState::Synced);

        let (x, y) = lat_lng_to_tile(46.525, 6.63, 12);
        let coord = TileCoord::new(12, x, y);
        assert!(h.memory.get_tile(coord).unwrap().is_some());
        assert!(h.archive.get_tile(coord).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_create_with_broken_track_fails_locally() {
        let h = harness();
        h.docs.put_trail(doc("bad"));
        h.docs.put_track("bad", b"<gpx".to_vec());

        let err = h.sync.trail_created("bad").await.unwrap_err();
        assert!(matches!(err, AppError::MalformedInput(_)));
        assert!(err.is_trail_local());
        assert_eq!(h.sync.sync_state("bad"), SyncState::Absent);
        assert!(h.memory.is_empty());
    }

    #[tokio::test]
    async fn test_update_regenerates_old_and_new_positions() {
        let h = harness();
        add_trail(&h, "t1", &[(6.62, 46.52), (6.64, 46.53)]);
        h.sync.trail_created("t1").await.unwrap();

        let old_coord = {
            let (x, y) = lat_lng_to_tile(46.525, 6.63, 14);
            TileCoord::new(14, x, y)
        };
        assert!(h.memory.get_tile(old_coord).unwrap().is_some());
        let old_set = h.sync.store().trail_tile_set("t1").unwrap();

        h.docs.put_track("t1", gpx(&[(8.52, 47.36), (8.55, 47.38)]));
        let report = h.sync.trail_updated("t1").await.unwrap();
        let new_set = h.sync.store().trail_tile_set("t1").unwrap();

        let union: BTreeSet<_> = old_set.union(&new_set).copied().collect();
        assert_eq!(report.total(), union.len());
        assert!(report.cleared >= old_set.difference(&new_set).count());
        // vacated tile no longer served from cache
        assert!(h.memory.get_tile(old_coord).unwrap().is_none());
        assert!(h.archive.get_tile(old_coord).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_clears_tiles_and_state() {
        let h = harness();
        add_trail(&h, "t1", &[(6.62, 46.52), (6.64, 46.53)]);
        h.sync.trail_created("t1").await.unwrap();
        assert!(!h.memory.is_empty());

        h.docs.remove_trail("t1");
        let report = h.sync.trail_deleted("t1").await.unwrap();
        assert_eq!(report.rendered, 0);
        assert!(report.cleared > 0);
        assert!(h.memory.is_empty());
        assert_eq!(h.archive.tile_count().unwrap(), 0);
        assert_eq!(h.sync.sync_state("t1"), SyncState::Absent);

        // second delete falls back to a full clear and still succeeds
        assert_eq!(
            h.sync.trail_deleted("t1").await.unwrap(),
            RenderReport::default()
        );
    }

    #[tokio::test]
    async fn test_update_of_vanished_trail_deletes_it() {
        let h = harness();
        add_trail(&h, "t1", &[(6.62, 46.52), (6.64, 46.53)]);
        h.sync.trail_created("t1").await.unwrap();
        h.docs.remove_trail("t1");

        h.sync.trail_updated("t1").await.unwrap();
        assert!(h.sync.store().get_trail("t1").unwrap().is_none());
        assert_eq!(h.sync.sync_state("t1"), SyncState::Absent);
    }

    #[tokio::test]
    async fn test_engagement_change_updates_store() {
        let h = harness();
        add_trail(&h, "t1", &[(6.62, 46.52), (6.64, 46.53)]);
        h.docs.put_rating(Rating {
            id: "r1".to_string(),
            trail: "t1".to_string(),
            user: "u2".to_string(),
            value: 4.0,
        });
        h.sync.trail_created("t1").await.unwrap();
        let stored = h.sync.store().get_trail("t1").unwrap().unwrap();
        assert_eq!(stored.engagement.rating_count, 1);

        h.docs.remove_rating("r1");
        h.sync.engagement_changed("t1").await.unwrap();
        let stored = h.sync.store().get_trail("t1").unwrap().unwrap();
        assert_eq!(stored.engagement, EngagementStats::default());
    }

    #[tokio::test]
    async fn test_full_resync_renders_shared_tiles_once() {
        let h = harness();
        add_trail(&h, "a", &[(6.62, 46.52), (6.64, 46.53)]);
        add_trail(&h, "b", &[(6.621, 46.521), (6.639, 46.529)]);
        h.docs.put_trail(doc("no-track"));

        let report = h.sync.full_resync().await.unwrap();
        assert_eq!(report.trails_synced, 2);
        assert_eq!(report.trails_failed, 1);

        let union: BTreeSet<_> = h
            .sync
            .store()
            .trail_tile_set("a")
            .unwrap()
            .union(&h.sync.store().trail_tile_set("b").unwrap())
            .copied()
            .collect();
        assert!(report.tiles_rendered > 0);
        assert!(report.tiles_rendered + report.tiles_failed <= union.len());
        assert_eq!(report.tiles_failed, 0);
        assert!(h.sync.is_warm());
        assert_eq!(h.sync.sync_state("a"), SyncState::Synced);
    }

    #[tokio::test]
    async fn test_get_tile_back_fills_earlier_cache() {
        let h = harness();
        add_trail(&h, "t1", &[(6.62, 46.52), (6.64, 46.53)]);
        h.sync.trail_created("t1").await.unwrap();

        let (x, y) = lat_lng_to_tile(46.525, 6.63, 13);
        let coord = TileCoord::new(13, x, y);
        let archived = h.archive.get_tile(coord).unwrap().unwrap();
        h.memory.clear_all().unwrap();

        let served = h.sync.get_tile(coord).await.unwrap().unwrap();
        assert_eq!(served, archived);
        assert_eq!(h.memory.get_tile(coord).unwrap(), Some(archived));
    }

    #[tokio::test]
    async fn test_get_tile_renders_on_total_miss() {
        let h = harness();
        add_trail(&h, "t1", &[(6.62, 46.52), (6.64, 46.53)]);
        h.sync.trail_created("t1").await.unwrap();
        h.sync.clear_all_caches().unwrap();

        let (x, y) = lat_lng_to_tile(46.525, 6.63, 10);
        let coord = TileCoord::new(10, x, y);
        let tile = h.sync.get_tile(coord).await.unwrap().unwrap();
        assert_eq!(h.archive.get_tile(coord).unwrap(), Some(tile.clone()));

        let range = bbox_to_tile_range(
            &crate::models::BoundingBox {
                north: -33.0,
                south: -34.0,
                east: 152.0,
                west: 151.0,
            },
            10,
        );
        let empty = TileCoord::new(10, range.min_x, range.min_y);
        assert!(h.sync.get_tile(empty).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_tile_rejects_out_of_range() {
        let h = harness();
        assert!(matches!(
            h.sync.get_tile(TileCoord::new(3, 0, 0)).await,
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            h.sync.get_tile(TileCoord::new(10, 5000, 0)).await,
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_versions_increase_across_rerenders() {
        let h = harness();
        add_trail(&h, "t1", &[(6.62, 46.52), (6.64, 46.53)]);
        h.sync.trail_created("t1").await.unwrap();
        let (x, y) = lat_lng_to_tile(46.525, 6.63, 12);
        let coord = TileCoord::new(12, x, y);
        let before = h.memory.get_tile(coord).unwrap().unwrap();

        h.sync.trail_updated("t1").await.unwrap();
        let after = h.memory.get_tile(coord).unwrap().unwrap();
        assert_eq!(before.data, after.data);
        assert!(after.version > before.version);
        assert_ne!(before.etag(), after.etag());
    }

    /// Straight north-south track: its bounding box has no width.
    const MERIDIAN: &[(f64, f64)] = &[(7.0, 46.0), (7.0, 46.01), (7.0, 46.02)];

    fn meridian_tile() -> TileCoord {
        let (x, y) = lat_lng_to_tile(46.01, 7.0, 14);
        TileCoord::new(14, x, y)
    }

    #[tokio::test]
    async fn test_flat_trail_tiles_cleared_on_delete() {
        let h = harness();
        add_trail(&h, "flat", MERIDIAN);
        h.sync.trail_created("flat").await.unwrap();
        assert!(h.sync.store().trail_tile_set("flat").unwrap().is_empty());

        let coord = meridian_tile();
        assert!(h.sync.get_tile(coord).await.unwrap().is_some());
        assert!(h.memory.get_tile(coord).unwrap().is_some());
        assert!(h.archive.get_tile(coord).unwrap().is_some());

        h.docs.remove_trail("flat");
        h.sync.trail_deleted("flat").await.unwrap();

        assert!(h.memory.get_tile(coord).unwrap().is_none());
        assert!(h.archive.get_tile(coord).unwrap().is_none());
        assert!(h.sync.get_tile(coord).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_flat_trail_moved_away_leaves_no_stale_tile() {
        let h = harness();
        add_trail(&h, "flat", MERIDIAN);
        h.sync.trail_created("flat").await.unwrap();
        let coord = meridian_tile();
        assert!(h.sync.get_tile(coord).await.unwrap().is_some());

        h.docs.put_track("flat", gpx(&[(8.52, 47.36), (8.55, 47.38)]));
        h.sync.trail_updated("flat").await.unwrap();

        assert!(h.memory.get_tile(coord).unwrap().is_none());
        assert!(h.archive.get_tile(coord).unwrap().is_none());
        assert!(h.sync.get_tile(coord).await.unwrap().is_none());
        assert_eq!(h.sync.sync_state("flat"), SyncState::Synced);
    }

    #[tokio::test]
    async fn test_flat_trail_engagement_change_reaches_served_tile() {
        let h = harness();
        add_trail(&h, "flat", MERIDIAN);
        h.sync.trail_created("flat").await.unwrap();
        let coord = meridian_tile();
        let unrated = h.sync.get_tile(coord).await.unwrap().unwrap();

        h.docs.put_rating(Rating {
            id: "r1".to_string(),
            trail: "flat".to_string(),
            user: "u2".to_string(),
            value: 5.0,
        });
        h.sync.engagement_changed("flat").await.unwrap();

        let served = h.sync.get_tile(coord).await.unwrap().unwrap();
        assert_ne!(served.data, unrated.data);
        assert_eq!(
            Some(served.data),
            h.sync.store().render_tile(coord).unwrap()
        );
    }

    #[tokio::test]
    async fn test_flat_trail_created_over_cached_tile_invalidates_it() {
        let h = harness();
        add_trail(&h, "t1", &[(6.99, 46.005), (7.01, 46.015)]);
        h.sync.trail_created("t1").await.unwrap();
        let coord = meridian_tile();
        let before = h.sync.get_tile(coord).await.unwrap().unwrap();

        add_trail(&h, "flat", MERIDIAN);
        h.sync.trail_created("flat").await.unwrap();

        let served = h.sync.get_tile(coord).await.unwrap().unwrap();
        assert_ne!(served.data, before.data);
    }

    #[tokio::test]
    async fn test_render_batch_skips_undecodable_trail() {
        let h = harness();
        add_trail(&h, "good", &[(6.62, 46.52), (6.64, 46.53)]);
        add_trail(&h, "bad", &[(8.52, 47.36), (8.55, 47.38)]);
        h.sync.trail_created("good").await.unwrap();
        h.sync.trail_created("bad").await.unwrap();
        h.sync
            .store()
            .execute_raw("UPDATE trails SET rating_count = 'many' WHERE id = 'bad'")
            .unwrap();

        let good = h.sync.store().trail_tile_set("good").unwrap();
        let bad = h.sync.store().trail_tile_set("bad").unwrap();
        let union: BTreeSet<_> = good.union(&bad).copied().collect();

        let report = h.sync.render_and_push(&union).unwrap();
        assert!(report.failed >= bad.len());
        assert!(report.rendered > 0);
        assert_eq!(report.total(), union.len());
    }
}

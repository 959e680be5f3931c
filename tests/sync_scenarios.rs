// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! End-to-end sync scenarios against the in-memory stack.

use std::collections::BTreeSet;
use trail_tiles::cache::TileCache;
use trail_tiles::models::{EngagementStats, TileCoord};
use trail_tiles::services::tiles::{bbox_to_tile_range, lat_lng_to_tile};
use trail_tiles::services::SyncState;

mod common;

#[tokio::test]
async fn test_three_point_trail_spans_two_columns_at_zoom_10() {
    let app = common::create_test_app();
    common::add_trail(
        &app.docs,
        "three",
        &[(5.20, 46.50), (5.30, 46.51), (5.35, 46.52)],
    );
    app.state.sync.trail_created("three").await.unwrap();

    let store = app.state.sync.store();
    let set = store.trail_tile_set("three").unwrap();

    let at_10: BTreeSet<TileCoord> = set.iter().filter(|t| t.z == 10).copied().collect();
    let expected: BTreeSet<TileCoord> = [TileCoord::new(10, 526, 362), TileCoord::new(10, 527, 362)]
        .into_iter()
        .collect();
    assert_eq!(at_10, expected);

    let bbox = store.trail_bounding_box("three").unwrap();
    for zoom in 6..=18u8 {
        let at_zoom: BTreeSet<TileCoord> = set.iter().filter(|t| t.z == zoom).copied().collect();
        let from_range: BTreeSet<TileCoord> = bbox_to_tile_range(&bbox, zoom).tiles().collect();
        assert_eq!(at_zoom, from_range, "zoom {}", zoom);
    }
    assert!(set.iter().all(|t| (6..=18).contains(&t.z)));
}

#[tokio::test]
async fn test_moved_trail_refreshes_vacated_tiles() {
    let app = common::create_test_app();
    common::add_trail(&app.docs, "mover", common::LAUSANNE);
    let sync = &app.state.sync;
    sync.trail_created("mover").await.unwrap();

    let (x, y) = lat_lng_to_tile(46.525, 6.63, 15);
    let vacated = TileCoord::new(15, x, y);
    assert!(sync.get_tile(vacated).await.unwrap().is_some());

    let before = sync.store().trail_tile_set("mover").unwrap();
    app.docs
        .put_track("mover", common::gpx_track(&[(7.44, 46.94), (7.46, 46.95)]));
    let report = sync.trail_updated("mover").await.unwrap();
    let after = sync.store().trail_tile_set("mover").unwrap();

    assert_eq!(report.total(), before.union(&after).count());
    assert!(sync.get_tile(vacated).await.unwrap().is_none());
    for cache in sync.caches() {
        assert!(cache.get_tile(vacated).unwrap().is_none(), "{}", cache.name());
    }
    assert_eq!(sync.sync_state("mover"), SyncState::Synced);
}

#[tokio::test]
async fn test_last_rating_deleted_zeroes_engagement() {
    let app = common::create_test_app();
    let sync = &app.state.sync;
    common::add_trail(&app.docs, "rated", common::LAUSANNE);
    sync.trail_created("rated").await.unwrap();

    let (x, y) = lat_lng_to_tile(46.525, 6.63, 14);
    let coord = TileCoord::new(14, x, y);
    let unrated = sync.store().render_tile(coord).unwrap().unwrap();

    app.docs.put_rating(common::rating("r1", "rated", 5.0));
    sync.engagement_changed("rated").await.unwrap();
    let rated = sync.get_tile(coord).await.unwrap().unwrap();
    assert_ne!(rated.data, unrated);

    app.docs.remove_rating("r1");
    sync.engagement_changed("rated").await.unwrap();

    let stored = sync.store().get_trail("rated").unwrap().unwrap();
    assert_eq!(stored.engagement, EngagementStats::default());
    let served = sync.get_tile(coord).await.unwrap().unwrap();
    assert_eq!(served.data, unrated);
    assert!(served.version > rated.version);
}

#[tokio::test]
async fn test_full_resync_with_no_trails_empties_everything() {
    let app = common::create_test_app();
    let sync = &app.state.sync;
    common::add_trail(&app.docs, "gone", common::LAUSANNE);
    sync.trail_created("gone").await.unwrap();
    assert_eq!(sync.store().trail_count().unwrap(), 1);

    app.docs.remove_trail("gone");
    let report = sync.full_resync().await.unwrap();

    assert_eq!(report.trails_synced, 0);
    assert_eq!(report.trails_failed, 0);
    assert_eq!(report.tiles_rendered, 0);
    assert_eq!(sync.store().trail_count().unwrap(), 0);
    assert_eq!(app.state.archive.tile_count().unwrap(), 0);
    assert!(sync.is_warm());
    assert_eq!(sync.sync_state("gone"), SyncState::Absent);
}

#[tokio::test]
async fn test_resync_isolates_malformed_trail() {
    let app = common::create_test_app();
    common::add_trail(&app.docs, "good", common::LAUSANNE);
    app.docs.put_trail(common::trail_doc("broken"));
    app.docs.put_track("broken", b"this is not gpx".to_vec());

    let report = app.state.sync.full_resync().await.unwrap();
    assert_eq!(report.trails_synced, 1);
    assert_eq!(report.trails_failed, 1);
    assert!(report.tiles_rendered > 0);
    assert_eq!(app.state.sync.sync_state("good"), SyncState::Synced);
    assert_eq!(app.state.sync.sync_state("broken"), SyncState::Absent);
}

#[tokio::test]
async fn test_queued_events_reach_the_store() {
    let app = common::create_test_app();
    common::add_trail(&app.docs, "queued", common::LAUSANNE);

    app.state
        .queue
        .submit(trail_tiles::services::SyncEvent::TrailCreated("queued".to_string()))
        .unwrap();
    app.state.queue.wait_idle().await;

    assert_eq!(app.state.sync.sync_state("queued"), SyncState::Synced);
    assert_eq!(app.state.queue.stats().processed, 1);
}

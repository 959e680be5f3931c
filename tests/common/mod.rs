// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use trail_tiles::config::Config;
use trail_tiles::db::{DocumentStore, MemoryDocumentStore};
use trail_tiles::models::{Rating, TrailDocument};
use trail_tiles::routes::create_router;
use trail_tiles::AppState;

/// Offline app: in-memory document store, spatial store and archive.
#[allow(dead_code)]
pub struct TestApp {
    pub router: axum::Router,
    pub state: Arc<AppState>,
    pub docs: MemoryDocumentStore,
    /// Snapshot directory, removed when the app is dropped
    pub snapshots: tempfile::TempDir,
}

/// Create a test app with offline dependencies.
#[allow(dead_code)]
pub fn create_test_app() -> TestApp {
    let snapshots = tempfile::tempdir().expect("tempdir");
    let (router, state, docs) = create_test_app_in(snapshots.path());
    TestApp {
        router,
        state,
        docs,
        snapshots,
    }
}

/// Create a test app whose archive snapshots live in `dir`.
#[allow(dead_code)]
pub fn create_test_app_in(dir: &Path) -> (axum::Router, Arc<AppState>, MemoryDocumentStore) {
    let mut config = Config::test_default();
    config.snapshot_dir = dir.to_path_buf();

    let docs = MemoryDocumentStore::new();
    let state = Arc::new(
        AppState::build(config, DocumentStore::Memory(docs.clone())).expect("build app state"),
    );
    (create_router(state.clone()), state, docs)
}

/// GPX file with one track through `points` (lon, lat).
#[allow(dead_code)]
pub fn gpx_track(points: &[(f64, f64)]) -> Vec<u8> {
    let trkpts: String = points
        .iter()
        .enumerate()
        .map(|(i, (lng, lat))| {
            format!(
                r#"<trkpt lat="{}" lon="{}"><ele>{}</ele></trkpt>"#,
                lat,
                lng,
                400 + 10 * i
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="tests" xmlns="http://www.topografix.com/GPX/1/1">
  <trk><name>test</name><trkseg>{}</trkseg></trk>
</gpx>"#,
        trkpts
    )
    .into_bytes()
}

#[allow(dead_code)]
pub fn trail_doc(id: &str) -> TrailDocument {
    let now = Utc::now();
    TrailDocument {
        id: id.to_string(),
        name: format!("Trail {}", id),
        description: "Test trail".to_string(),
        level: Default::default(),
        tags: vec!["flow".to_string(), "jumps".to_string()],
        owner: "user-1".to_string(),
        ridden: true,
        created: now,
        updated: now,
    }
}

/// Put a trail document and its track into the document store.
#[allow(dead_code)]
pub fn add_trail(docs: &MemoryDocumentStore, id: &str, points: &[(f64, f64)]) {
    docs.put_trail(trail_doc(id));
    docs.put_track(id, gpx_track(points));
}

#[allow(dead_code)]
pub fn rating(id: &str, trail: &str, value: f64) -> Rating {
    Rating {
        id: id.to_string(),
        trail: trail.to_string(),
        user: "user-2".to_string(),
        value,
    }
}

/// Trail near Lausanne used across tests; its midpoint is (6.63, 46.525).
#[allow(dead_code)]
pub const LAUSANNE: &[(f64, f64)] = &[(6.62, 46.52), (6.63, 46.525), (6.64, 46.53)];

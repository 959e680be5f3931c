// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - tile math, ingestion, rendering and sync.

pub mod ingest;
pub mod queue;
pub mod snapshot;
pub mod sync;
pub mod tiles;
pub mod vector_tile;

pub use ingest::{ingest_gpx, IngestedTrack};
pub use queue::{QueueStats, SyncEvent, SyncQueue};
pub use sync::{RenderReport, ResyncReport, SyncOrchestrator, SyncState};

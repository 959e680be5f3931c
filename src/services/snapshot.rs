// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Periodic archive snapshots.

use crate::cache::ArchiveCache;
use crate::error::{AppError, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Export the archive on the blocking pool if it changed.
pub async fn snapshot_once(
    archive: Arc<ArchiveCache>,
    dir: PathBuf,
    retention: Duration,
) -> Result<Option<PathBuf>> {
    tokio::task::spawn_blocking(move || archive.snapshot_if_dirty(&dir, retention))
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("snapshot task panicked: {}", e)))?
        .map_err(AppError::from)
}

/// Run [`snapshot_once`] every `interval` until the task is aborted.
///
/// Failures are logged; the dirty flag stays set so the next tick retries.
pub fn spawn_snapshot_loop(
    archive: Arc<ArchiveCache>,
    dir: &Path,
    interval: Duration,
    retention: Duration,
) -> JoinHandle<()> {
    let dir = dir.to_path_buf();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match snapshot_once(archive.clone(), dir.clone(), retention).await {
                Ok(Some(path)) => tracing::debug!(path = %path.display(), "Snapshot tick wrote file"),
                Ok(None) => {}
                Err(e) => tracing::error!(error = %e, "Archive snapshot failed"),
            }
        }
    })
}

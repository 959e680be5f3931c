// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Bounded sync queue.
//!
//! Mutation notifications are queued here and applied by a fixed pool of
//! workers, so the notifying request returns immediately and a burst of
//! mutations is met with backpressure instead of unbounded background work.

use crate::db::TrailSource;
use crate::error::{AppError, Result};
use crate::services::sync::SyncOrchestrator;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, Notify};

/// A unit of sync work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    TrailCreated(String),
    TrailUpdated(String),
    TrailDeleted(String),
    /// Trail ID whose ratings changed
    RatingChanged(String),
    /// Trail ID whose comments changed
    CommentChanged(String),
    FullResync,
}

impl SyncEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            SyncEvent::TrailCreated(_) => "trail_created",
            SyncEvent::TrailUpdated(_) => "trail_updated",
            SyncEvent::TrailDeleted(_) => "trail_deleted",
            SyncEvent::RatingChanged(_) => "rating_changed",
            SyncEvent::CommentChanged(_) => "comment_changed",
            SyncEvent::FullResync => "full_resync",
        }
    }

    pub fn trail_id(&self) -> Option<&str> {
        match self {
            SyncEvent::TrailCreated(id)
            | SyncEvent::TrailUpdated(id)
            | SyncEvent::TrailDeleted(id)
            | SyncEvent::RatingChanged(id)
            | SyncEvent::CommentChanged(id) => Some(id),
            SyncEvent::FullResync => None,
        }
    }
}

/// Snapshot of the queue counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    /// Accepted but not yet picked up
    pub queued: usize,
    pub in_flight: usize,
    pub processed: u64,
    pub failed: u64,
}

#[derive(Default)]
struct Counters {
    queued: AtomicUsize,
    in_flight: AtomicUsize,
    processed: AtomicU64,
    failed: AtomicU64,
    idle: Notify,
}

impl Counters {
    fn pending(&self) -> usize {
        self.queued.load(Ordering::Acquire) + self.in_flight.load(Ordering::Acquire)
    }
}

/// Handle for submitting sync events.
#[derive(Clone)]
pub struct SyncQueue {
    tx: mpsc::Sender<SyncEvent>,
    counters: Arc<Counters>,
    workers: usize,
}

impl SyncQueue {
    /// Spawn `workers` tasks sharing one channel of `capacity` events.
    pub fn start<S: TrailSource>(
        orchestrator: Arc<SyncOrchestrator<S>>,
        workers: usize,
        capacity: usize,
    ) -> Self {
        let (tx, rx) = mpsc::channel::<SyncEvent>(capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let counters = Arc::new(Counters::default());
        let workers = workers.max(1);

        for worker_id in 0..workers {
            let rx = Arc::clone(&rx);
            let orchestrator = Arc::clone(&orchestrator);
            let counters = Arc::clone(&counters);
            tokio::spawn(async move {
                worker_task(worker_id, rx, orchestrator, counters).await;
            });
        }

        tracing::info!(workers, capacity, "Sync queue started");

        Self {
            tx,
            counters,
            workers,
        }
    }

    /// Queue an event without waiting.
    ///
    /// Fails with `QueueFull` when the channel is at capacity.
    pub fn submit(&self, event: SyncEvent) -> Result<()> {
        self.counters.queued.fetch_add(1, Ordering::AcqRel);
        match self.tx.try_send(event) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.counters.queued.fetch_sub(1, Ordering::AcqRel);
                self.counters.idle.notify_waiters();
                match err {
                    mpsc::error::TrySendError::Full(event) => {
                        tracing::warn!(event = event.kind(), "Sync queue full, rejecting event");
                        Err(AppError::QueueFull)
                    }
                    mpsc::error::TrySendError::Closed(_) => Err(AppError::Internal(
                        anyhow::anyhow!("sync queue is closed"),
                    )),
                }
            }
        }
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            queued: self.counters.queued.load(Ordering::Acquire),
            in_flight: self.counters.in_flight.load(Ordering::Acquire),
            processed: self.counters.processed.load(Ordering::Acquire),
            failed: self.counters.failed.load(Ordering::Acquire),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers
    }

    /// Resolve once nothing is queued or running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.counters.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.counters.pending() == 0 {
                return;
            }
            notified.await;
        }
    }
}

async fn worker_task<S: TrailSource>(
    worker_id: usize,
    rx: Arc<Mutex<mpsc::Receiver<SyncEvent>>>,
    orchestrator: Arc<SyncOrchestrator<S>>,
    counters: Arc<Counters>,
) {
    loop {
        let event = {
            let mut rx = rx.lock().await;
            match rx.recv().await {
                Some(event) => event,
                None => {
                    tracing::debug!(worker_id, "Sync worker shutting down (channel closed)");
                    return;
                }
            }
        };

        counters.in_flight.fetch_add(1, Ordering::AcqRel);
        counters.queued.fetch_sub(1, Ordering::AcqRel);

        let kind = event.kind();
        let trail_id = event.trail_id().map(str::to_string);
        match orchestrator.handle(event).await {
            Ok(()) => {
                counters.processed.fetch_add(1, Ordering::AcqRel);
                tracing::debug!(worker_id, event = kind, trail_id = ?trail_id, "Sync event applied");
            }
            Err(e) => {
                counters.failed.fetch_add(1, Ordering::AcqRel);
                if e.is_trail_local() {
                    tracing::warn!(worker_id, event = kind, trail_id = ?trail_id, error = %e, "Sync event failed for trail");
                } else {
                    tracing::error!(worker_id, event = kind, trail_id = ?trail_id, error = %e, "Sync event failed");
                }
            }
        }

        counters.in_flight.fetch_sub(1, Ordering::AcqRel);
        counters.idle.notify_waiters();
    }
}

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Trail-Tiles API Server
//!
//! Serves vector tiles of the trail map and keeps them in sync with the
//! document store through mutation webhooks.

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use trail_tiles::{
    config::{Config, DocumentStoreKind},
    db::{DocumentStore, FirestoreDb, MemoryDocumentStore},
    services::{
        snapshot::{snapshot_once, spawn_snapshot_loop},
        SyncEvent,
    },
    AppState,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(
        port = config.port,
        min_zoom = config.min_zoom,
        max_zoom = config.max_zoom,
        "Starting Trail-Tiles API"
    );

    let documents = match config.document_store {
        DocumentStoreKind::Firestore => DocumentStore::Firestore(
            FirestoreDb::new(&config.gcp_project_id)
                .await
                .expect("Failed to connect to Firestore"),
        ),
        DocumentStoreKind::Memory => {
            tracing::warn!("Using in-memory document store; no trails will be loaded");
            DocumentStore::Memory(MemoryDocumentStore::new())
        }
    };

    let state = Arc::new(AppState::build(config.clone(), documents)?);

    if config.resync_on_start {
        state.queue.submit(SyncEvent::FullResync)?;
        tracing::info!("Startup resync queued");
    }

    let snapshot_task = state.archive.is_in_memory().then(|| {
        tracing::info!(
            dir = %config.snapshot_dir.display(),
            interval_secs = config.snapshot_interval.as_secs(),
            "Archive snapshots enabled"
        );
        spawn_snapshot_loop(
            state.archive.clone(),
            &config.snapshot_dir,
            config.snapshot_interval,
            config.snapshot_retention,
        )
    });

    // Build router
    let app = trail_tiles::routes::create_router(state.clone());

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down, draining sync queue");
    state.queue.wait_idle().await;

    if let Some(task) = snapshot_task {
        task.abort();
    }
    if state.archive.is_in_memory() {
        let archive = state.archive.clone();
        match snapshot_once(archive, config.snapshot_dir.clone(), config.snapshot_retention).await {
            Ok(Some(path)) => tracing::info!(path = %path.display(), "Final snapshot written"),
            Ok(None) => tracing::info!("Archive unchanged, no final snapshot"),
            Err(e) => tracing::error!(error = %e, "Final snapshot failed"),
        }
    }

    Ok(())
}

/// Resolve on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("trail_tiles=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}

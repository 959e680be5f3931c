// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Read interface over the document store that owns trail records.

use crate::db::{FirestoreDb, MemoryDocumentStore};
use crate::error::Result;
use crate::models::{Comment, Rating, TrailDocument};
use std::future::Future;

/// Canonical trail data the sync engine reads from.
pub trait TrailSource: Send + Sync + 'static {
    /// Fetch one trail document; `None` if it does not exist.
    fn get_trail(&self, id: &str) -> impl Future<Output = Result<Option<TrailDocument>>> + Send;

    /// Every trail document.
    fn list_all_trails(&self) -> impl Future<Output = Result<Vec<TrailDocument>>> + Send;

    /// Raw GPX bytes for a trail; `None` if no track was uploaded.
    fn fetch_track(&self, trail_id: &str) -> impl Future<Output = Result<Option<Vec<u8>>>> + Send;

    fn ratings_for_trail(&self, trail_id: &str) -> impl Future<Output = Result<Vec<Rating>>> + Send;

    fn comments_for_trail(
        &self,
        trail_id: &str,
    ) -> impl Future<Output = Result<Vec<Comment>>> + Send;
}

/// Document store selected at startup.
#[derive(Clone)]
pub enum DocumentStore {
    Firestore(FirestoreDb),
    Memory(MemoryDocumentStore),
}

impl TrailSource for DocumentStore {
    async fn get_trail(&self, id: &str) -> Result<Option<TrailDocument>> {
        match self {
            DocumentStore::Firestore(db) => db.get_trail(id).await,
            DocumentStore::Memory(db) => db.get_trail(id).await,
        }
    }

    async fn list_all_trails(&self) -> Result<Vec<TrailDocument>> {
        match self {
            DocumentStore::Firestore(db) => db.list_all_trails().await,
            DocumentStore::Memory(db) => db.list_all_trails().await,
        }
    }

    async fn fetch_track(&self, trail_id: &str) -> Result<Option<Vec<u8>>> {
        match self {
            DocumentStore::Firestore(db) => db.fetch_track(trail_id).await,
            DocumentStore::Memory(db) => db.fetch_track(trail_id).await,
        }
    }

    async fn ratings_for_trail(&self, trail_id: &str) -> Result<Vec<Rating>> {
        match self {
            DocumentStore::Firestore(db) => db.ratings_for_trail(trail_id).await,
            DocumentStore::Memory(db) => db.ratings_for_trail(trail_id).await,
        }
    }

    async fn comments_for_trail(&self, trail_id: &str) -> Result<Vec<Comment>> {
        match self {
            DocumentStore::Firestore(db) => db.comments_for_trail(trail_id).await,
            DocumentStore::Memory(db) => db.comments_for_trail(trail_id).await,
        }
    }
}

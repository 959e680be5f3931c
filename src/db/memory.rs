// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process document store for tests and local development.

use crate::db::TrailSource;
use crate::error::Result;
use crate::models::{Comment, Rating, TrailDocument};
use dashmap::DashMap;
use std::sync::Arc;

/// Document store held in concurrent maps. Clones share the same data.
#[derive(Clone, Default)]
pub struct MemoryDocumentStore {
    trails: Arc<DashMap<String, TrailDocument>>,
    tracks: Arc<DashMap<String, Vec<u8>>>,
    ratings: Arc<DashMap<String, Rating>>,
    comments: Arc<DashMap<String, Comment>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_trail(&self, doc: TrailDocument) {
        self.trails.insert(doc.id.clone(), doc);
    }

    /// Remove a trail together with its track file.
    pub fn remove_trail(&self, id: &str) -> Option<TrailDocument> {
        self.tracks.remove(id);
        self.trails.remove(id).map(|(_, doc)| doc)
    }

    pub fn put_track(&self, trail_id: &str, gpx: impl Into<Vec<u8>>) {
        self.tracks.insert(trail_id.to_string(), gpx.into());
    }

    pub fn put_rating(&self, rating: Rating) {
        self.ratings.insert(rating.id.clone(), rating);
    }

    pub fn remove_rating(&self, id: &str) -> Option<Rating> {
        self.ratings.remove(id).map(|(_, r)| r)
    }

    pub fn put_comment(&self, comment: Comment) {
        self.comments.insert(comment.id.clone(), comment);
    }

    pub fn remove_comment(&self, id: &str) -> Option<Comment> {
        self.comments.remove(id).map(|(_, c)| c)
    }
}

impl TrailSource for MemoryDocumentStore {
    async fn get_trail(&self, id: &str) -> Result<Option<TrailDocument>> {
        Ok(self.trails.get(id).map(|doc| doc.value().clone()))
    }

    async fn list_all_trails(&self) -> Result<Vec<TrailDocument>> {
        let mut docs: Vec<TrailDocument> =
            self.trails.iter().map(|e| e.value().clone()).collect();
        docs.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(docs)
    }

    async fn fetch_track(&self, trail_id: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.tracks.get(trail_id).map(|t| t.value().clone()))
    }

    async fn ratings_for_trail(&self, trail_id: &str) -> Result<Vec<Rating>> {
        Ok(self
            .ratings
            .iter()
            .filter(|r| r.trail == trail_id)
            .map(|r| r.value().clone())
            .collect())
    }

    async fn comments_for_trail(&self, trail_id: &str) -> Result<Vec<Comment>> {
        Ok(self
            .comments
            .iter()
            .filter(|c| c.trail == trail_id)
            .map(|c| c.value().clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn doc(id: &str) -> TrailDocument {
        TrailDocument {
            id: id.to_string(),
            name: id.to_string(),
            description: String::new(),
            level: Default::default(),
            tags: vec![],
            owner: "u1".to_string(),
            ridden: false,
            created: Utc::now(),
            updated: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_filters_engagement_by_trail() {
        let store = MemoryDocumentStore::new();
        for (id, trail) in [("r1", "a"), ("r2", "a"), ("r3", "b")] {
            store.put_rating(Rating {
                id: id.to_string(),
                trail: trail.to_string(),
                user: "u".to_string(),
                value: 3.0,
            });
        }
        assert_eq!(store.ratings_for_trail("a").await.unwrap().len(), 2);
        assert_eq!(store.ratings_for_trail("c").await.unwrap().len(), 0);

        store.remove_rating("r3");
        assert!(store.ratings_for_trail("b").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_trail_drops_track_and_clones_share_state() {
        let store = MemoryDocumentStore::new();
        let other = store.clone();
        store.put_trail(doc("b"));
        store.put_trail(doc("a"));
        store.put_track("a", b"<gpx/>".to_vec());

        let ids: Vec<String> = other
            .list_all_trails()
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);

        assert!(other.remove_trail("a").is_some());
        assert!(store.get_trail("a").await.unwrap().is_none());
        assert!(store.fetch_track("a").await.unwrap().is_none());
    }
}

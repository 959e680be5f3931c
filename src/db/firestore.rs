// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper implementing [`TrailSource`].
//!
//! Reads from four collections:
//! - Trails (trail records, keyed by trail ID)
//! - Tracks (base64-encoded GPX uploads, keyed by trail ID)
//! - Ratings and Comments (engagement, filtered by `trail`)

use crate::db::{collections, TrailSource};
use crate::error::AppError;
use crate::models::{Comment, Rating, TrackFile, TrailDocument};
use base64::Engine;

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0cmFpbC10aWxlcyJ9."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create an offline client; every read fails with `Database`.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }
}

impl TrailSource for FirestoreDb {
    async fn get_trail(&self, id: &str) -> Result<Option<TrailDocument>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::TRAILS)
            .obj()
            .one(id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn list_all_trails(&self) -> Result<Vec<TrailDocument>, AppError> {
        let mut docs: Vec<TrailDocument> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::TRAILS)
            .obj::<TrailDocument>()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        docs.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(docs)
    }

    async fn fetch_track(&self, trail_id: &str) -> Result<Option<Vec<u8>>, AppError> {
        let track: Option<TrackFile> = self
            .get_client()?
            .fluent()
            .select()
            .by_id_in(collections::TRACKS)
            .obj()
            .one(trail_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        track
            .map(|t| {
                base64::engine::general_purpose::STANDARD
                    .decode(t.gpx_base64.as_bytes())
                    .map_err(|e| {
                        AppError::MalformedInput(format!(
                            "track for trail {} is not valid base64: {}",
                            trail_id, e
                        ))
                    })
            })
            .transpose()
    }

    async fn ratings_for_trail(&self, trail_id: &str) -> Result<Vec<Rating>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::RATINGS)
            .filter(|q| q.for_all([q.field("trail").eq(trail_id)]))
            .obj::<Rating>()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn comments_for_trail(&self, trail_id: &str) -> Result<Vec<Comment>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .from(collections::COMMENTS)
            .filter(|q| q.for_all([q.field("trail").eq(trail_id)]))
            .obj::<Comment>()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Spatial store for synchronized trails.
//!
//! Holds one row per trail in SQLite with the line geometry (WKT), its
//! bounding box, elevation summary and denormalized engagement columns, so a
//! tile render is a single bounding-box query with no joins.

use crate::error::{AppError, Result};
use crate::models::{
    BoundingBox, Difficulty, ElevationData, EngagementStats, TileCoord, Trail,
};
use crate::services::tiles::{tile_lng_lat_bounds, tile_set_for_bbox};
use crate::services::vector_tile;
use chrono::{DateTime, Utc};
use geo::LineString;
use rusqlite::{named_params, Connection, OptionalExtension, Row};
use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard};
use wkt::{ToWkt, TryFromWkt};

const TRAIL_COLUMNS: &str = "id, name, description, level, tags, owner, geometry, \
     elevation_profile, distance, elevation_gain, elevation_loss, rating_average, \
     rating_count, comment_count, ridden, created, updated";

/// Spatial store backed by SQLite.
pub struct GeospatialStore {
    conn: Mutex<Connection>,
    min_zoom: u8,
    max_zoom: u8,
}

impl GeospatialStore {
    /// Open (or create) the store at `path`. `":memory:"` gives a private
    /// in-memory database.
    pub fn open(path: &str, min_zoom: u8, max_zoom: u8) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        tracing::info!(path, min_zoom, max_zoom, "Spatial store opened");
        Ok(Self {
            conn: Mutex::new(conn),
            min_zoom,
            max_zoom,
        })
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory(min_zoom: u8, max_zoom: u8) -> Result<Self> {
        Self::open(":memory:", min_zoom, max_zoom)
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS trails (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT NOT NULL,
                level TEXT NOT NULL,
                tags TEXT NOT NULL,              -- JSON array, sorted
                owner TEXT NOT NULL,
                geometry TEXT NOT NULL,          -- WKT LINESTRING, lon/lat
                elevation_profile TEXT NOT NULL, -- JSON array of {distance, elevation}
                distance REAL NOT NULL,
                elevation_gain REAL NOT NULL,
                elevation_loss REAL NOT NULL,
                min_lng REAL NOT NULL,
                min_lat REAL NOT NULL,
                max_lng REAL NOT NULL,
                max_lat REAL NOT NULL,
                rating_average REAL NOT NULL DEFAULT 0,
                rating_count INTEGER NOT NULL DEFAULT 0,
                comment_count INTEGER NOT NULL DEFAULT 0,
                ridden INTEGER NOT NULL DEFAULT 0,
                created TEXT NOT NULL,
                updated TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_trails_bbox
                ON trails(min_lng, max_lng, min_lat, max_lat);
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::StoreUnavailable("spatial store lock poisoned".to_string()))
    }

    /// Zoom range covered by [`Self::trail_tile_set`].
    pub fn zoom_range(&self) -> (u8, u8) {
        (self.min_zoom, self.max_zoom)
    }

    // ─── Trail rows ──────────────────────────────────────────────

    /// Insert or replace a trail keyed by id. Repeating the call with the same
    /// trail leaves the row unchanged.
    pub fn upsert_trail(&self, trail: &Trail) -> Result<()> {
        let bbox = trail.bounding_box().ok_or_else(|| {
            AppError::EmptyGeometry(format!("trail {} has no coordinates", trail.id))
        })?;
        let tags = serde_json::to_string(&trail.tags)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("tags encoding: {}", e)))?;
        let profile = serde_json::to_string(&trail.elevation.profile)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("profile encoding: {}", e)))?;

        self.conn()?.execute(
            r#"
            INSERT INTO trails (
                id, name, description, level, tags, owner, geometry, elevation_profile,
                distance, elevation_gain, elevation_loss,
                min_lng, min_lat, max_lng, max_lat,
                rating_average, rating_count, comment_count, ridden, created, updated
            ) VALUES (
                :id, :name, :description, :level, :tags, :owner, :geometry, :profile,
                :distance, :gain, :loss,
                :min_lng, :min_lat, :max_lng, :max_lat,
                :rating_average, :rating_count, :comment_count, :ridden, :created, :updated
            )
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                level = excluded.level,
                tags = excluded.tags,
                owner = excluded.owner,
                geometry = excluded.geometry,
                elevation_profile = excluded.elevation_profile,
                distance = excluded.distance,
                elevation_gain = excluded.elevation_gain,
                elevation_loss = excluded.elevation_loss,
                min_lng = excluded.min_lng,
                min_lat = excluded.min_lat,
                max_lng = excluded.max_lng,
                max_lat = excluded.max_lat,
                rating_average = excluded.rating_average,
                rating_count = excluded.rating_count,
                comment_count = excluded.comment_count,
                ridden = excluded.ridden,
                created = excluded.created,
                updated = excluded.updated
            "#,
            named_params! {
                ":id": trail.id,
                ":name": trail.name,
                ":description": trail.description,
                ":level": trail.level.as_str(),
                ":tags": tags,
                ":owner": trail.owner,
                ":geometry": trail.geometry.wkt_string(),
                ":profile": profile,
                ":distance": trail.distance,
                ":gain": trail.elevation.gain,
                ":loss": trail.elevation.loss,
                ":min_lng": bbox.west,
                ":min_lat": bbox.south,
                ":max_lng": bbox.east,
                ":max_lat": bbox.north,
                ":rating_average": trail.engagement.rating_average,
                ":rating_count": trail.engagement.rating_count,
                ":comment_count": trail.engagement.comment_count,
                ":ridden": trail.ridden,
                ":created": trail.created.to_rfc3339(),
                ":updated": trail.updated.to_rfc3339(),
            },
        )?;

        tracing::debug!(trail_id = %trail.id, "Trail upserted into spatial store");
        Ok(())
    }

    /// Delete a trail. Returns whether a row was present.
    pub fn delete_trail(&self, id: &str) -> Result<bool> {
        let removed = self
            .conn()?
            .execute("DELETE FROM trails WHERE id = ?1", [id])?;
        Ok(removed > 0)
    }

    /// Fetch one trail.
    pub fn get_trail(&self, id: &str) -> Result<Option<Trail>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM trails WHERE id = ?1",
            TRAIL_COLUMNS
        ))?;
        let raw = stmt.query_row([id], RawTrail::from_row).optional()?;
        raw.map(RawTrail::into_trail).transpose()
    }

    /// Number of synchronized trails.
    pub fn trail_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM trails", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Remove every trail. Returns the number of rows deleted.
    pub fn clear(&self) -> Result<usize> {
        let removed = self.conn()?.execute("DELETE FROM trails", [])?;
        tracing::info!(removed, "Spatial store cleared");
        Ok(removed)
    }

    /// Overwrite the three engagement columns of a trail.
    ///
    /// Returns `false` when the trail is not in the store.
    pub fn update_engagement_stats(&self, id: &str, stats: &EngagementStats) -> Result<bool> {
        let updated = self.conn()?.execute(
            "UPDATE trails SET rating_average = :avg, rating_count = :ratings, \
             comment_count = :comments WHERE id = :id",
            named_params! {
                ":avg": stats.rating_average,
                ":ratings": stats.rating_count,
                ":comments": stats.comment_count,
                ":id": id,
            },
        )?;
        Ok(updated > 0)
    }

    // ─── Spatial queries ─────────────────────────────────────────

    /// Stored bounding box of a trail.
    pub fn trail_bounding_box(&self, id: &str) -> Result<BoundingBox> {
        self.conn()?
            .query_row(
                "SELECT min_lng, min_lat, max_lng, max_lat FROM trails WHERE id = ?1",
                [id],
                |row| {
                    Ok(BoundingBox {
                        west: row.get(0)?,
                        south: row.get(1)?,
                        east: row.get(2)?,
                        north: row.get(3)?,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| AppError::NotFound(format!("trail {} is not synchronized", id)))
    }

    /// Every tile the trail touches across the configured zoom range.
    pub fn trail_tile_set(&self, id: &str) -> Result<BTreeSet<TileCoord>> {
        let bbox = self.trail_bounding_box(id)?;
        Ok(tile_set_for_bbox(&bbox, self.min_zoom, self.max_zoom))
    }

    /// Trails whose bounding box intersects `bbox`, ordered by id.
    pub fn trails_in_bbox(&self, bbox: &BoundingBox) -> Result<Vec<Trail>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM trails \
             WHERE max_lng >= :west AND min_lng <= :east \
               AND max_lat >= :south AND min_lat <= :north \
             ORDER BY id",
            TRAIL_COLUMNS
        ))?;
        let rows = stmt
            .query_map(
                named_params! {
                    ":west": bbox.west,
                    ":east": bbox.east,
                    ":south": bbox.south,
                    ":north": bbox.north,
                },
                RawTrail::from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        drop(stmt);
        drop(conn);

        rows.into_iter().map(RawTrail::into_trail).collect()
    }

    /// Render the vector tile at `coord`. `None` means no trail intersects it.
    pub fn render_tile(&self, coord: TileCoord) -> Result<Option<Vec<u8>>> {
        if !coord.is_valid() {
            return Err(AppError::BadRequest(format!("invalid tile {}", coord)));
        }
        let bounds = tile_lng_lat_bounds(coord);
        let trails = self.trails_in_bbox(&bounds).map_err(|e| match e {
            AppError::StoreUnavailable(_) => e,
            other => AppError::RenderFailure(format!("tile {}: {}", coord, other)),
        })?;
        if trails.is_empty() {
            return Ok(None);
        }
        vector_tile::encode_tile(coord, &trails)
    }
}

#[cfg(test)]
impl GeospatialStore {
    /// Run a raw statement, for tests that need a damaged row.
    pub(crate) fn execute_raw(&self, sql: &str) -> Result<usize> {
        Ok(self.conn()?.execute(sql, [])?)
    }
}

/// Row as read from SQLite, before text columns are decoded.
struct RawTrail {
    id: String,
    name: String,
    description: String,
    level: String,
    tags: String,
    owner: String,
    geometry: String,
    profile: String,
    distance: f64,
    gain: f64,
    loss: f64,
    engagement: EngagementStats,
    ridden: bool,
    created: String,
    updated: String,
}

impl RawTrail {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            description: row.get("description")?,
            level: row.get("level")?,
            tags: row.get("tags")?,
            owner: row.get("owner")?,
            geometry: row.get("geometry")?,
            profile: row.get("elevation_profile")?,
            distance: row.get("distance")?,
            gain: row.get("elevation_gain")?,
            loss: row.get("elevation_loss")?,
            engagement: EngagementStats {
                rating_average: row.get("rating_average")?,
                rating_count: row.get("rating_count")?,
                comment_count: row.get("comment_count")?,
            },
            ridden: row.get("ridden")?,
            created: row.get("created")?,
            updated: row.get("updated")?,
        })
    }

    fn into_trail(self) -> Result<Trail> {
        let corrupt = |what: &str, detail: String| {
            AppError::Internal(anyhow::anyhow!(
                "trail {} has corrupt {}: {}",
                self.id,
                what,
                detail
            ))
        };

        let geometry = LineString::<f64>::try_from_wkt_str(&self.geometry)
            .map_err(|e| corrupt("geometry", e.to_string()))?;
        let level: Difficulty = self
            .level
            .parse()
            .map_err(|e: String| corrupt("level", e))?;
        let tags: BTreeSet<String> =
            serde_json::from_str(&self.tags).map_err(|e| corrupt("tags", e.to_string()))?;
        let profile =
            serde_json::from_str(&self.profile).map_err(|e| corrupt("profile", e.to_string()))?;
        let created = parse_timestamp(&self.created).map_err(|e| corrupt("created", e))?;
        let updated = parse_timestamp(&self.updated).map_err(|e| corrupt("updated", e))?;

        Ok(Trail {
            id: self.id,
            name: self.name,
            description: self.description,
            level,
            tags,
            owner: self.owner,
            geometry,
            elevation: ElevationData {
                gain: self.gain,
                loss: self.loss,
                profile,
            },
            distance: self.distance,
            engagement: self.engagement,
            ridden: self.ridden,
            created,
            updated,
        })
    }
}

fn parse_timestamp(raw: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| e.to_string())
}

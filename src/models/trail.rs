// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Trail records: the document-store shape and the spatial-store shape.

use crate::models::{BoundingBox, EngagementStats};
use chrono::{DateTime, Utc};
use geo::LineString;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Difficulty level of a trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    #[default]
    Easy,
    Moderate,
    Difficult,
    Expert,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Moderate => "moderate",
            Difficulty::Difficult => "difficult",
            Difficulty::Expert => "expert",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "easy" => Ok(Difficulty::Easy),
            "moderate" => Ok(Difficulty::Moderate),
            "difficult" => Ok(Difficulty::Difficult),
            "expert" => Ok(Difficulty::Expert),
            other => Err(format!("unknown difficulty: {}", other)),
        }
    }
}

/// Trail record as stored in the document store.
///
/// The document store owns the canonical copy; geometry lives in the
/// separately uploaded track file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrailDocument {
    /// Opaque record ID (also used as document ID)
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub level: Difficulty,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Owning user reference
    pub owner: String,
    #[serde(default)]
    pub ridden: bool,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

/// Raw track file stored next to a trail in the document store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackFile {
    pub trail_id: String,
    /// GPX bytes, base64 encoded
    pub gpx_base64: String,
}

/// One sample of an elevation profile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElevationPoint {
    /// Distance along the track in metres
    pub distance: f64,
    /// Elevation in metres
    pub elevation: f64,
}

/// Elevation profile and summary derived from a track.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElevationData {
    /// Accumulated positive elevation change (m)
    pub gain: f64,
    /// Accumulated negative elevation change, as a positive number (m)
    pub loss: f64,
    pub profile: Vec<ElevationPoint>,
}

impl ElevationData {
    pub fn min(&self) -> Option<f64> {
        self.profile.iter().map(|p| p.elevation).reduce(f64::min)
    }

    pub fn max(&self) -> Option<f64> {
        self.profile.iter().map(|p| p.elevation).reduce(f64::max)
    }

    pub fn start(&self) -> Option<f64> {
        self.profile.first().map(|p| p.elevation)
    }

    pub fn end(&self) -> Option<f64> {
        self.profile.last().map(|p| p.elevation)
    }
}

/// Trail row owned by the spatial store once synchronized.
#[derive(Debug, Clone, PartialEq)]
pub struct Trail {
    pub id: String,
    pub name: String,
    pub description: String,
    pub level: Difficulty,
    pub tags: BTreeSet<String>,
    pub owner: String,
    /// Line geometry in lon/lat order
    pub geometry: LineString<f64>,
    pub elevation: ElevationData,
    /// Track length in metres
    pub distance: f64,
    pub engagement: EngagementStats,
    pub ridden: bool,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl Trail {
    /// Assemble a spatial-store row from the document and its ingested track.
    pub fn from_document(
        doc: &TrailDocument,
        geometry: LineString<f64>,
        elevation: ElevationData,
        distance: f64,
        engagement: EngagementStats,
    ) -> Self {
        Self {
            id: doc.id.clone(),
            name: doc.name.clone(),
            description: doc.description.clone(),
            level: doc.level,
            tags: doc.tags.iter().cloned().collect(),
            owner: doc.owner.clone(),
            geometry,
            elevation,
            distance,
            engagement,
            ridden: doc.ridden,
            created: doc.created,
            updated: doc.updated,
        }
    }

    /// Bounding box of the geometry, `None` for an empty line.
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        use geo::BoundingRect;
        self.geometry.bounding_rect().map(|rect| BoundingBox {
            north: rect.max().y,
            south: rect.min().y,
            east: rect.max().x,
            west: rect.min().x,
        })
    }
}

/// A rating left on a trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rating {
    pub id: String,
    /// Trail the rating belongs to
    pub trail: String,
    pub user: String,
    /// Score, 1 to 5
    pub value: f64,
}

/// A comment left on a trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    /// Trail the comment belongs to
    pub trail: String,
    pub user: String,
    pub text: String,
}

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Track file ingestion.
//!
//! Turns an uploaded GPX file into the line geometry and the elevation
//! profile stored for a trail. The spatial store keeps the line as WKT.

use crate::error::{AppError, Result};
use crate::models::{ElevationData, ElevationPoint};
use geo::{Coord, LineString};

/// Mean Earth radius used for track distances, in metres.
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Geometry and elevation extracted from one track file.
#[derive(Debug, Clone)]
pub struct IngestedTrack {
    pub geometry: LineString<f64>,
    pub elevation: ElevationData,
    /// Track length in metres
    pub distance: f64,
}

/// Parse GPX bytes into a trail geometry.
///
/// Only the first track is used; all of its segments are concatenated.
pub fn ingest_gpx(bytes: &[u8]) -> Result<IngestedTrack> {
    let gpx = gpx::read(bytes).map_err(|e| AppError::MalformedInput(e.to_string()))?;

    let track = gpx
        .tracks
        .first()
        .ok_or_else(|| AppError::MalformedInput("GPX file contains no tracks".to_string()))?;

    let points: Vec<&gpx::Waypoint> = track
        .segments
        .iter()
        .flat_map(|segment| segment.points.iter())
        .collect();

    if points.is_empty() {
        return Err(AppError::EmptyGeometry(
            "first track contains no points".to_string(),
        ));
    }

    let mut coords = Vec::with_capacity(points.len());
    let mut elevation = ElevationData::default();
    let mut distance = 0.0;
    let mut previous: Option<Coord<f64>> = None;
    let mut previous_elevation: Option<f64> = None;

    for waypoint in points {
        let point = waypoint.point();
        let coord = Coord {
            x: point.x(),
            y: point.y(),
        };

        if let Some(prev) = previous {
            distance += haversine_distance(prev, coord);
        }
        previous = Some(coord);
        coords.push(coord);

        if let Some(ele) = waypoint.elevation {
            elevation.profile.push(ElevationPoint {
                distance,
                elevation: ele,
            });
            if let Some(prev_ele) = previous_elevation {
                let delta = ele - prev_ele;
                if delta > 0.0 {
                    elevation.gain += delta;
                } else {
                    elevation.loss += -delta;
                }
            }
            previous_elevation = Some(ele);
        }
    }

    let geometry = LineString::new(coords);

    tracing::debug!(
        points = geometry.0.len(),
        distance_m = distance,
        gain_m = elevation.gain,
        loss_m = elevation.loss,
        "Ingested track"
    );

    Ok(IngestedTrack {
        geometry,
        elevation,
        distance,
    })
}

/// Great-circle distance between two lon/lat coordinates, in metres.
pub fn haversine_distance(a: Coord<f64>, b: Coord<f64>) -> f64 {
    let lat1 = a.y.to_radians();
    let lat2 = b.y.to_radians();
    let d_lat = (b.y - a.y).to_radians();
    let d_lng = (b.x - a.x).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Vector tile encoding for the `trails` layer.

use crate::error::{AppError, Result};
use crate::models::{TileCoord, Trail};
use crate::services::tiles::{
    lng_lat_to_mercator, simplification_tolerance, tile_bounds, TILE_BUFFER, TILE_EXTENT,
};
use geo::{BooleanOps, Coord, LineString, MultiLineString, Rect, Simplify};
use mvt::{Feature, GeomEncoder, GeomType, Tile};

/// Name of the single layer in every tile.
pub const LAYER_NAME: &str = "trails";

/// Encode the trails intersecting `coord` as a vector tile.
///
/// Returns `None` when no trail leaves any geometry inside the buffered tile.
/// Trails are encoded in the order given; callers pass them sorted by id so
/// identical inputs give identical bytes.
pub fn encode_tile(coord: TileCoord, trails: &[Trail]) -> Result<Option<Vec<u8>>> {
    let mut tile = Tile::new(TILE_EXTENT);
    let mut layer = tile.create_layer(LAYER_NAME);

    for trail in trails {
        let parts = tile_geometry(coord, &trail.geometry);
        if parts.is_empty() {
            continue;
        }

        let mut encoder = GeomEncoder::new(GeomType::Linestring);
        for part in &parts {
            for &(x, y) in part {
                encoder = encoder.point(x, y).map_err(render_error)?;
            }
            encoder = encoder.complete().map_err(render_error)?;
        }
        let geom = encoder.encode().map_err(render_error)?;

        let mut feature = layer.into_feature(geom);
        add_properties(&mut feature, trail);
        layer = feature.into_layer();
    }

    if layer.num_features() == 0 {
        return Ok(None);
    }

    tile.add_layer(layer).map_err(render_error)?;
    let bytes = tile.to_bytes().map_err(render_error)?;
    Ok(Some(bytes))
}

fn render_error(err: mvt::Error) -> AppError {
    AppError::RenderFailure(err.to_string())
}

/// Project, simplify, clip and quantize a lon/lat line into tile units.
///
/// Each returned part has at least two distinct points.
fn tile_geometry(coord: TileCoord, line: &LineString<f64>) -> Vec<Vec<(f64, f64)>> {
    if line.0.len() < 2 {
        return Vec::new();
    }

    let bounds = tile_bounds(coord.z, coord.x, coord.y);
    let extent = TILE_EXTENT as f64;
    let width = bounds.x_max - bounds.x_min;
    let height = bounds.y_max - bounds.y_min;

    let mercator: LineString<f64> = line
        .coords()
        .map(|c| {
            let (x, y) = lng_lat_to_mercator(c.x, c.y);
            Coord { x, y }
        })
        .collect();

    let tolerance = simplification_tolerance(coord.z);
    let simplified = if tolerance > 0.0 {
        mercator.simplify(&tolerance)
    } else {
        mercator
    };

    let pixels: LineString<f64> = simplified
        .coords()
        .map(|c| Coord {
            x: (c.x - bounds.x_min) / width * extent,
            y: (bounds.y_max - c.y) / height * extent,
        })
        .collect();

    let buffer = TILE_BUFFER as f64;
    let clip_area = Rect::new(
        Coord {
            x: -buffer,
            y: -buffer,
        },
        Coord {
            x: extent + buffer,
            y: extent + buffer,
        },
    )
    .to_polygon();
    let clipped = clip_area.clip(&MultiLineString::new(vec![pixels]), false);

    clipped
        .0
        .iter()
        .map(|part| {
            let mut points: Vec<(f64, f64)> = Vec::with_capacity(part.0.len());
            for c in part.coords() {
                let p = (c.x.round(), c.y.round());
                if points.last() != Some(&p) {
                    points.push(p);
                }
            }
            points
        })
        .filter(|points| points.len() >= 2)
        .collect()
}

/// Attach the per-trail properties the map client reads.
fn add_properties(feature: &mut Feature, trail: &Trail) {
    feature.add_tag_string("id", &trail.id);
    feature.add_tag_string("name", &trail.name);
    feature.add_tag_string("description", &trail.description);
    feature.add_tag_string("level", trail.level.as_str());
    let tags: Vec<&String> = trail.tags.iter().collect();
    feature.add_tag_string(
        "tags",
        &serde_json::to_string(&tags).unwrap_or_else(|_| "[]".to_string()),
    );
    feature.add_tag_string("owner", &trail.owner);

    if let Some(bbox) = trail.bounding_box() {
        feature.add_tag_double("bbox_north", bbox.north);
        feature.add_tag_double("bbox_south", bbox.south);
        feature.add_tag_double("bbox_east", bbox.east);
        feature.add_tag_double("bbox_west", bbox.west);
    }
    if let (Some(start), Some(end)) = (trail.geometry.0.first(), trail.geometry.0.last()) {
        feature.add_tag_double("start_lng", start.x);
        feature.add_tag_double("start_lat", start.y);
        feature.add_tag_double("end_lng", end.x);
        feature.add_tag_double("end_lat", end.y);
    }

    feature.add_tag_double("distance", trail.distance);
    feature.add_tag_double("elevation_gain", trail.elevation.gain);
    feature.add_tag_double("elevation_loss", trail.elevation.loss);
    let optional = [
        ("elevation_min", trail.elevation.min()),
        ("elevation_max", trail.elevation.max()),
        ("elevation_start", trail.elevation.start()),
        ("elevation_end", trail.elevation.end()),
    ];
    for (key, value) in optional {
        if let Some(value) = value {
            feature.add_tag_double(key, value);
        }
    }

    feature.add_tag_double("rating_average", trail.engagement.rating_average);
    feature.add_tag_uint("rating_count", trail.engagement.rating_count as u64);
    feature.add_tag_uint("comment_count", trail.engagement.comment_count as u64);
    feature.add_tag_bool("ridden", trail.ridden);
}

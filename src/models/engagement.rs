//! Denormalized engagement aggregates for tile rendering.
//!
//! Recomputed from the rating and comment collections whenever they change,
//! then written into the spatial store so rendering never joins.

use serde::{Deserialize, Serialize};

use crate::models::{Comment, Rating};

/// Per-trail engagement summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EngagementStats {
    /// Mean rating value, 0 when unrated
    pub rating_average: f64,
    pub rating_count: u32,
    pub comment_count: u32,
}

impl EngagementStats {
    /// Aggregate the current ratings and comments of one trail.
    pub fn compute(ratings: &[Rating], comments: &[Comment]) -> Self {
        let rating_count = ratings.len() as u32;
        let rating_average = if ratings.is_empty() {
            0.0
        } else {
            ratings.iter().map(|r| r.value).sum::<f64>() / ratings.len() as f64
        };

        Self {
            rating_average,
            rating_count,
            comment_count: comments.len() as u32,
        }
    }
}

//! Distance metrics and score transforms.
//!
//! The metric is fixed per engine instance. Internally the index works with
//! *distances* (lower is closer); results exposed to callers carry *scores*
//! (higher is better). [`DistanceMetric::score`] converts between the two:
//!
//! - **Cosine**: `(1.0 - distance).clamp(0.0, 1.0)`, a similarity in `[0, 1]`
//! - **Euclidean**: negated distance, so descending score order is ascending
//!   distance order
//! - **DotProduct**: negated stored distance (the graph stores `-dot`)

use serde::{Deserialize, Serialize};

/// Similarity metric used by an index instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// Cosine distance: `1 - cos(a, b)`. Scores land in `[0, 1]`.
    #[default]
    Cosine,
    /// Euclidean (L2) distance.
    Euclidean,
    /// Negated dot product, for inner-product similarity search.
    DotProduct,
}

impl DistanceMetric {
    /// Computes the raw graph distance between two vectors (lower is closer).
    #[inline]
    #[must_use]
    pub fn distance(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::Cosine => cosine_distance(a, b),
            Self::Euclidean => euclidean_distance(a, b),
            Self::DotProduct => -dot_product(a, b),
        }
    }

    /// Transforms a raw distance into the score exposed in results.
    #[inline]
    #[must_use]
    pub fn score(self, raw_distance: f32) -> f32 {
        match self {
            Self::Cosine => (1.0 - raw_distance).clamp(0.0, 1.0),
            Self::Euclidean => -raw_distance,
            Self::DotProduct => -raw_distance,
        }
    }
}

impl std::fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cosine => write!(f, "cosine"),
            Self::Euclidean => write!(f, "euclidean"),
            Self::DotProduct => write!(f, "dot_product"),
        }
    }
}

/// Dot product of two equal-length vectors.
#[inline]
#[must_use]
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Cosine distance: `1 - (a·b) / (|a| |b|)`.
///
/// A zero-magnitude operand yields the maximum distance of 1.0 rather than
/// NaN, so degenerate vectors sort last instead of poisoning the ordering.
#[inline]
#[must_use]
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot = dot_product(a, b);
    let norm_a = dot_product(a, a).sqrt();
    let norm_b = dot_product(b, b).sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a * norm_b)
}

/// Euclidean (L2) distance.
#[inline]
#[must_use]
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum::<f32>()
        .sqrt()
}

//! HNSW parameters and search effort profiles.

use serde::{Deserialize, Serialize};

/// HNSW construction parameters.
///
/// Use [`HnswParams::auto`] for dimension-based defaults, or build custom
/// parameters for a specific workload.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HnswParams {
    /// Bi-directional links per node (the M parameter). Higher improves
    /// recall at the cost of memory and insert speed.
    pub max_connections: usize,
    /// Candidate list size during construction. Higher improves recall at
    /// the cost of indexing speed.
    pub ef_construction: usize,
    /// Neighbor diversification factor. 1.0 is classic HNSW pruning.
    pub alpha: f32,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self::auto(768)
    }
}

impl HnswParams {
    /// Dimension-tuned defaults.
    #[must_use]
    pub fn auto(dimension: usize) -> Self {
        match dimension {
            0..=768 => Self {
                max_connections: 16,
                ef_construction: 200,
                alpha: 1.0,
            },
            _ => Self {
                max_connections: 24,
                ef_construction: 300,
                alpha: 1.0,
            },
        }
    }

    /// Parameters favoring recall over indexing speed.
    #[must_use]
    pub fn high_recall(dimension: usize) -> Self {
        let base = Self::auto(dimension);
        Self {
            max_connections: base.max_connections + 8,
            ef_construction: base.ef_construction + 200,
            ..base
        }
    }

    /// Fully custom parameters.
    #[must_use]
    pub const fn custom(max_connections: usize, ef_construction: usize, alpha: f32) -> Self {
        Self {
            max_connections,
            ef_construction,
            alpha,
        }
    }
}

/// Recall/latency trade-off for a single query.
///
/// The effort maps to `ef_search`, the number of candidate paths explored at
/// the bottom layer. It is a per-query tunable, never a hardcoded constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchEffort {
    /// `ef_search = 64` (floored at `2k`).
    Fast,
    /// `ef_search = 128` (floored at `4k`).
    #[default]
    Balanced,
    /// `ef_search = 256` (floored at `8k`).
    Accurate,
    /// `ef_search = 512` (floored at `16k`).
    HighRecall,
    /// Explicit `ef_search` value (floored at `k`).
    Custom(usize),
}

impl SearchEffort {
    /// Resolves the `ef_search` value for a query returning `k` results.
    #[must_use]
    pub fn ef_search(self, k: usize) -> usize {
        match self {
            Self::Fast => 64.max(k * 2),
            Self::Balanced => 128.max(k * 4),
            Self::Accurate => 256.max(k * 8),
            Self::HighRecall => 512.max(k * 16),
            Self::Custom(ef) => ef.max(k),
        }
    }
}

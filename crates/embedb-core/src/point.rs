//! Core record and search-result types.

use serde::{Deserialize, Serialize};

/// A stored record: a stable id, a fixed-dimension vector, and an opaque
/// JSON payload.
///
/// Points are immutable once stored. An update is modeled as an upsert of
/// the same id, which atomically replaces the previous record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Unique stable identifier.
    pub id: u64,
    /// Embedding vector. Length must equal the engine's configured dimension.
    pub vector: Vec<f32>,
    /// Opaque payload returned with search results. Owned exclusively by the
    /// vector store; the index never sees it.
    pub payload: Option<serde_json::Value>,
}

impl Point {
    /// Creates a new point.
    #[must_use]
    pub fn new(id: u64, vector: Vec<f32>, payload: Option<serde_json::Value>) -> Self {
        Self {
            id,
            vector,
            payload,
        }
    }
}

/// A single ranked search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Id of the matching record.
    pub id: u64,
    /// Similarity score. Higher is always better, regardless of metric.
    pub score: f32,
    /// Payload resolved from the vector store.
    pub payload: Option<serde_json::Value>,
}

/// The outcome of a query: ranked results plus a degradation flag.
///
/// `degraded` is set when the caller's time budget expired before the search
/// finished; the results are the best found so far rather than an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOutcome {
    /// Results ordered by descending score, ties broken by ascending id.
    pub results: Vec<SearchResult>,
    /// True if the time budget expired and the result set is partial.
    pub degraded: bool,
}

impl SearchOutcome {
    /// A complete (non-degraded) outcome.
    #[must_use]
    pub fn complete(results: Vec<SearchResult>) -> Self {
        Self {
            results,
            degraded: false,
        }
    }

    /// An empty, complete outcome.
    #[must_use]
    pub fn empty() -> Self {
        Self::complete(Vec::new())
    }
}

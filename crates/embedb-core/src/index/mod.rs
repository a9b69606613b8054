//! Approximate nearest-neighbor indexing.
//!
//! # Module Organization
//!
//! - `params`: construction parameters and search effort profiles
//! - `layer` / `graph`: the navigable small world graph itself
//! - `hnsw`: record ids, tombstones, and capacity over the graph
//! - `handle`: generation handle for atomic-swap rebuilds
//!
//! The [`VectorIndex`] trait is the contract the rest of the crate programs
//! against; [`HnswIndex`] is the in-tree implementation. Any structure that
//! honors the contract (including a binding to a native ANN library) can be
//! substituted behind it.

mod graph;
mod handle;
mod hnsw;
mod layer;
mod params;

use std::time::Instant;

use crate::error::Result;

pub use handle::{IndexHandle, IndexState};
pub(crate) use handle::PendingOp;
pub use hnsw::HnswIndex;
pub use params::{HnswParams, SearchEffort};

/// Candidates returned by an index search.
#[derive(Debug, Clone)]
pub struct IndexHits {
    /// `(record id, score)` pairs, best first. Tombstoned records are
    /// already filtered out.
    pub candidates: Vec<(u64, f32)>,
    /// True when a deadline expired and the candidates are best-so-far.
    pub truncated: bool,
}

/// Contract for an approximate nearest-neighbor structure.
///
/// Implementations must make writes visible within a documented staleness
/// window, honor tombstones at query time, and answer searches against an
/// empty structure with an empty result rather than an error.
pub trait VectorIndex: Send + Sync {
    /// Adds `id`'s vector to the structure. Re-inserting an id replaces its
    /// previous vector.
    fn insert(&self, id: u64, vector: &[f32]) -> Result<()>;

    /// Tombstones `id` immediately. Returns whether it was present.
    fn remove(&self, id: u64) -> bool;

    /// Returns up to `k` live candidates for `query`, best first.
    fn search(
        &self,
        query: &[f32],
        k: usize,
        effort: SearchEffort,
        deadline: Option<Instant>,
    ) -> Result<IndexHits>;

    /// Number of live (non-tombstoned) entries.
    fn len(&self) -> usize;

    /// True when no live entries exist.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

//! The HNSW index: record ids, tombstones, and capacity over the raw graph.
//!
//! The graph underneath is append-only, so deletion is logical: removed
//! nodes go into a tombstone bitmap and are filtered out of every search
//! immediately. Physical reclamation happens when a rebuild constructs a
//! fresh index from the live records.

use std::time::Instant;

use parking_lot::RwLock;
use roaring::RoaringBitmap;
use rustc_hash::FxHashMap;

use crate::distance::DistanceMetric;
use crate::error::{Error, Result};

use super::graph::HnswGraph;
use super::layer::NodeId;
use super::params::{HnswParams, SearchEffort};
use super::{IndexHits, VectorIndex};

/// Approximate nearest-neighbor index with immediate tombstoning.
///
/// # Staleness window
///
/// Zero operations: `insert` wires the vector into the graph synchronously,
/// so a write is searchable the moment the call returns. `remove` flips a
/// tombstone bit, so a delete is invisible to searches the moment the call
/// returns; physical removal may lag until the next rebuild.
///
/// Searches are safe under concurrency; `insert`/`remove` callers must
/// serialize writes among themselves (the engine's writer lock does this).
pub struct HnswIndex {
    graph: HnswGraph,
    dimension: usize,
    metric: DistanceMetric,
    params: HnswParams,
    capacity: usize,
    /// Record id -> live graph node.
    id_to_node: RwLock<FxHashMap<u64, NodeId>>,
    /// Graph node -> record id (dense, grows with the graph).
    node_to_id: RwLock<Vec<u64>>,
    /// Graph nodes that no longer back a live record.
    dead_nodes: RwLock<RoaringBitmap>,
}

impl HnswIndex {
    /// Creates an empty index.
    ///
    /// `capacity` bounds the total node count (live + tombstoned); inserts
    /// past it fail with [`Error::IndexFull`] until a rebuild compacts.
    #[must_use]
    pub fn new(
        dimension: usize,
        metric: DistanceMetric,
        params: HnswParams,
        capacity: usize,
    ) -> Self {
        Self {
            graph: HnswGraph::new(metric, params, capacity.min(4096)),
            dimension,
            metric,
            params,
            capacity,
            id_to_node: RwLock::new(FxHashMap::default()),
            node_to_id: RwLock::new(Vec::new()),
            dead_nodes: RwLock::new(RoaringBitmap::new()),
        }
    }

    /// Construction parameters of this index.
    #[must_use]
    pub fn params(&self) -> HnswParams {
        self.params
    }

    /// Metric fixed for this index.
    #[must_use]
    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Total nodes including tombstoned ones (capacity accounting).
    #[must_use]
    pub fn total_nodes(&self) -> usize {
        self.graph.len()
    }

    /// Number of tombstoned nodes awaiting physical removal.
    #[must_use]
    pub fn tombstones(&self) -> u64 {
        self.dead_nodes.read().len()
    }

    /// Fraction of nodes that are tombstoned, in `[0, 1]`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)] // Node counts are far below 2^52.
    pub fn tombstone_ratio(&self) -> f32 {
        let total = self.graph.len();
        if total == 0 {
            return 0.0;
        }
        self.tombstones() as f32 / total as f32
    }
}

impl VectorIndex for HnswIndex {
    fn insert(&self, id: u64, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        if self.graph.len() >= self.capacity {
            return Err(Error::IndexFull {
                capacity: self.capacity,
            });
        }

        let node = self.graph.insert(vector.to_vec());
        let node_u32 = u32::try_from(node).map_err(|_| Error::IndexFull {
            capacity: self.capacity,
        })?;

        {
            let mut node_to_id = self.node_to_id.write();
            if node_to_id.len() <= node {
                node_to_id.resize(node + 1, u64::MAX);
            }
            node_to_id[node] = id;
        }

        let old_node = self.id_to_node.write().insert(id, node);
        if let Some(old) = old_node {
            // Re-insert under the same id: the previous node becomes a
            // tombstone, keeping one live node per record.
            self.dead_nodes.write().insert(u32::try_from(old).expect("node ids fit u32"));
        }
        // A fresh insert is never dead, but a re-used id may have been
        // tombstoned by an earlier remove.
        self.dead_nodes.write().remove(node_u32);
        Ok(())
    }

    fn remove(&self, id: u64) -> bool {
        let Some(node) = self.id_to_node.write().remove(&id) else {
            return false;
        };
        self.dead_nodes
            .write()
            .insert(u32::try_from(node).expect("node ids fit u32"));
        true
    }

    fn search(
        &self,
        query: &[f32],
        k: usize,
        effort: SearchEffort,
        deadline: Option<Instant>,
    ) -> Result<IndexHits> {
        if query.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if k == 0 {
            return Err(Error::InvalidTopK(0));
        }
        if self.graph.is_empty() {
            return Ok(IndexHits {
                candidates: Vec::new(),
                truncated: false,
            });
        }

        // Oversample by the tombstone count so k live results survive the
        // filter whenever k live nodes exist.
        #[allow(clippy::cast_possible_truncation)] // Bounded by graph.len().
        let dead = self.tombstones() as usize;
        let fetch_k = (k + dead).min(self.graph.len());
        let ef = effort.ef_search(k).max(fetch_k);

        let hits = self.graph.search(query, fetch_k, ef, deadline);

        let dead_nodes = self.dead_nodes.read();
        let node_to_id = self.node_to_id.read();
        let candidates = hits
            .nodes
            .into_iter()
            .filter(|&(node, _)| {
                u32::try_from(node).map_or(false, |n| !dead_nodes.contains(n))
            })
            .take(k)
            .map(|(node, raw)| (node_to_id[node], self.metric.score(raw)))
            .collect();

        Ok(IndexHits {
            candidates,
            truncated: hits.truncated,
        })
    }

    fn len(&self) -> usize {
        self.id_to_node.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> HnswIndex {
        HnswIndex::new(2, DistanceMetric::Cosine, HnswParams::auto(2), 1000)
    }

    fn ids(hits: &IndexHits) -> Vec<u64> {
        hits.candidates.iter().map(|&(id, _)| id).collect()
    }

    #[test]
    fn test_empty_index_returns_empty() {
        let idx = index();
        let hits = idx
            .search(&[1.0, 0.0], 5, SearchEffort::Balanced, None)
            .unwrap();
        assert!(hits.candidates.is_empty());
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let idx = index();
        assert!(matches!(
            idx.insert(1, &[1.0, 0.0, 0.0]),
            Err(Error::DimensionMismatch {
                expected: 2,
                actual: 3
            })
        ));
        assert!(matches!(
            idx.search(&[1.0], 1, SearchEffort::Balanced, None),
            Err(Error::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_invalid_k_rejected() {
        let idx = index();
        idx.insert(1, &[1.0, 0.0]).unwrap();
        assert!(matches!(
            idx.search(&[1.0, 0.0], 0, SearchEffort::Balanced, None),
            Err(Error::InvalidTopK(0))
        ));
    }

    #[test]
    fn test_self_retrieval() {
        let idx = index();
        idx.insert(10, &[1.0, 0.0]).unwrap();
        idx.insert(20, &[0.0, 1.0]).unwrap();
        idx.insert(30, &[1.0, 1.0]).unwrap();

        let hits = idx
            .search(&[0.0, 1.0], 1, SearchEffort::Balanced, None)
            .unwrap();
        assert_eq!(ids(&hits), vec![20]);
    }

    #[test]
    fn test_remove_is_immediately_invisible() {
        let idx = index();
        idx.insert(1, &[1.0, 0.0]).unwrap();
        idx.insert(2, &[0.0, 1.0]).unwrap();

        assert!(idx.remove(2));
        assert!(!idx.remove(2));

        let hits = idx
            .search(&[0.0, 1.0], 2, SearchEffort::Balanced, None)
            .unwrap();
        assert!(!ids(&hits).contains(&2));
        assert_eq!(idx.len(), 1);
        assert_eq!(idx.tombstones(), 1);
    }

    #[test]
    fn test_reinsert_same_id_keeps_one_live_node() {
        let idx = index();
        idx.insert(1, &[1.0, 0.0]).unwrap();
        idx.insert(1, &[0.0, 1.0]).unwrap();

        assert_eq!(idx.len(), 1);
        let hits = idx
            .search(&[0.0, 1.0], 5, SearchEffort::Balanced, None)
            .unwrap();
        assert_eq!(ids(&hits), vec![1]);
    }

    #[test]
    fn test_k_larger_than_live_count() {
        let idx = index();
        idx.insert(1, &[1.0, 0.0]).unwrap();
        idx.insert(2, &[0.0, 1.0]).unwrap();
        idx.remove(1);

        let hits = idx
            .search(&[1.0, 0.0], 10, SearchEffort::Balanced, None)
            .unwrap();
        assert_eq!(hits.candidates.len(), 1);
    }

    #[test]
    fn test_capacity_exhaustion() {
        let idx = HnswIndex::new(2, DistanceMetric::Cosine, HnswParams::auto(2), 3);
        idx.insert(1, &[1.0, 0.0]).unwrap();
        idx.insert(2, &[0.0, 1.0]).unwrap();
        idx.insert(3, &[1.0, 1.0]).unwrap();
        assert!(matches!(
            idx.insert(4, &[0.5, 0.5]),
            Err(Error::IndexFull { capacity: 3 })
        ));
        // Tombstoning does not free capacity; only a rebuild does.
        idx.remove(1);
        assert!(matches!(
            idx.insert(4, &[0.5, 0.5]),
            Err(Error::IndexFull { .. })
        ));
    }

    #[test]
    fn test_tombstone_ratio() {
        let idx = index();
        for i in 0..10 {
            idx.insert(i, &[i as f32, 1.0]).unwrap();
        }
        for i in 0..3 {
            idx.remove(i);
        }
        assert!((idx.tombstone_ratio() - 0.3).abs() < 1e-6);
    }
}

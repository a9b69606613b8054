//! A single layer of the HNSW graph: per-node adjacency lists.

use parking_lot::RwLock;

/// Index of a node inside the graph's vector table.
pub(crate) type NodeId = usize;

/// Adjacency lists for one graph layer.
///
/// Each node's neighbor list sits behind its own lock so concurrent inserts
/// touching different nodes do not contend.
pub(crate) struct Layer {
    neighbors: Vec<RwLock<Vec<NodeId>>>,
}

impl Layer {
    /// Creates an empty layer with room for `capacity` nodes.
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            neighbors: Vec::with_capacity(capacity),
        }
    }

    /// Grows the layer so `node` has an adjacency slot.
    pub(crate) fn ensure_capacity(&mut self, node: NodeId) {
        while self.neighbors.len() <= node {
            self.neighbors.push(RwLock::new(Vec::new()));
        }
    }

    /// Returns a copy of `node`'s neighbor list (empty for unknown nodes).
    pub(crate) fn get_neighbors(&self, node: NodeId) -> Vec<NodeId> {
        self.neighbors
            .get(node)
            .map(|list| list.read().clone())
            .unwrap_or_default()
    }

    /// Replaces `node`'s neighbor list.
    pub(crate) fn set_neighbors(&self, node: NodeId, new_neighbors: Vec<NodeId>) {
        if let Some(list) = self.neighbors.get(node) {
            *list.write() = new_neighbors;
        }
    }
}

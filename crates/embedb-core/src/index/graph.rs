//! The hierarchical navigable small world graph.
//!
//! Implements the structure from the Malkov & Yashunin paper: an exponential
//! layer distribution, greedy descent through the upper layers, and an
//! ef-bounded beam search at the bottom layer. Neighbor selection uses
//! alpha diversification with a distance-pruned fallback.
//!
//! Lock order is `vectors` → `layers` → per-node neighbor lists; no method
//! holds a later lock while acquiring an earlier one.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

use parking_lot::RwLock;
use rustc_hash::FxHashSet;

use crate::distance::DistanceMetric;

use super::layer::{Layer, NodeId};
use super::params::HnswParams;

/// f32 wrapper with a total order, for use in binary heaps.
///
/// Distances are never NaN (inputs are finite and the metrics produce finite
/// outputs), so `total_cmp` gives the ordering we want.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct OrderedFloat(pub f32);

impl Eq for OrderedFloat {}

impl PartialOrd for OrderedFloat {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedFloat {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Graph-level search result: candidates plus a deadline-truncation flag.
pub(crate) struct GraphHits {
    /// `(node, raw distance)` pairs, ascending distance.
    pub nodes: Vec<(NodeId, f32)>,
    /// True when the deadline expired before the beam search converged.
    pub truncated: bool,
}

/// Navigable small world graph over densely numbered nodes.
///
/// Nodes are append-only; logical deletion is handled a level up by the
/// index via tombstones. Layer 0 holds every node with `2 * M` links, upper
/// layers thin out exponentially.
pub(crate) struct HnswGraph {
    metric: DistanceMetric,
    vectors: RwLock<Vec<Vec<f32>>>,
    layers: RwLock<Vec<Layer>>,
    entry_point: RwLock<Option<NodeId>>,
    max_layer: AtomicUsize,
    count: AtomicUsize,
    /// xorshift state for layer selection.
    rng_state: AtomicU64,
    max_connections: usize,
    max_connections_0: usize,
    ef_construction: usize,
    /// `1 / ln(M)`, the layer distribution multiplier.
    level_mult: f64,
    alpha: f32,
}

impl HnswGraph {
    const MAX_LEVEL: usize = 15;

    pub(crate) fn new(metric: DistanceMetric, params: HnswParams, capacity_hint: usize) -> Self {
        let max_connections = params.max_connections;
        Self {
            metric,
            vectors: RwLock::new(Vec::with_capacity(capacity_hint)),
            layers: RwLock::new(vec![Layer::new(capacity_hint)]),
            entry_point: RwLock::new(None),
            max_layer: AtomicUsize::new(0),
            count: AtomicUsize::new(0),
            rng_state: AtomicU64::new(0x5DEE_CE66_D1A4_B5B5),
            max_connections,
            max_connections_0: max_connections * 2,
            ef_construction: params.ef_construction,
            level_mult: 1.0 / (max_connections as f64).ln(),
            alpha: params.alpha,
        }
    }

    /// Total nodes in the graph, including logically deleted ones.
    pub(crate) fn len(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        self.metric.distance(a, b)
    }

    fn get_vector(&self, node: NodeId) -> Vec<f32> {
        self.vectors.read()[node].clone()
    }

    /// Draws a layer from the truncated exponential distribution.
    // SAFETY: the cast chain is bounded: uniform is in (0, 1], -ln(uniform)
    // is non-negative, and the result is capped at MAX_LEVEL.
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    fn random_layer(&self) -> usize {
        let mut state = self
            .rng_state
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |mut s| {
                if s == 0 {
                    s = 0x853c_49e6_748f_ea9b;
                }
                s ^= s << 13;
                s ^= s >> 7;
                s ^= s << 17;
                Some(s)
            })
            .unwrap_or(0x853c_49e6_748f_ea9b);
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;

        let uniform = ((state as f64) / (u64::MAX as f64)).max(f64::MIN_POSITIVE);
        let level = (-uniform.ln() * self.level_mult).floor() as usize;
        level.min(Self::MAX_LEVEL)
    }

    /// Inserts a vector and wires it into every layer up to its drawn level.
    pub(crate) fn insert(&self, vector: Vec<f32>) -> NodeId {
        let node = {
            let mut vectors = self.vectors.write();
            let id = vectors.len();
            vectors.push(vector);
            id
        };

        let node_layer = self.random_layer();
        {
            let mut layers = self.layers.write();
            while layers.len() <= node_layer {
                layers.push(Layer::new(node + 1));
            }
            for layer in layers.iter_mut() {
                layer.ensure_capacity(node);
            }
        }

        let entry_point = *self.entry_point.read();
        if let Some(ep) = entry_point {
            let query = self.get_vector(node);
            let mut current = ep;
            let max_layer = self.max_layer.load(Ordering::Relaxed);

            for layer_idx in (node_layer + 1..=max_layer).rev() {
                current = self.greedy_descend(&query, current, layer_idx);
            }

            for layer_idx in (0..=node_layer.min(max_layer)).rev() {
                let neighbors =
                    self.search_layer(&query, vec![current], self.ef_construction, layer_idx, None);
                let max_conn = if layer_idx == 0 {
                    self.max_connections_0
                } else {
                    self.max_connections
                };

                let selected = self.select_neighbors(&neighbors.nodes, max_conn);
                self.layers.read()[layer_idx].set_neighbors(node, selected.clone());
                for &neighbor in &selected {
                    self.connect_back(node, neighbor, layer_idx, max_conn);
                }
                if let Some(&(best, _)) = neighbors.nodes.first() {
                    current = best;
                }
            }
        } else {
            *self.entry_point.write() = Some(node);
        }

        if node_layer > self.max_layer.load(Ordering::Relaxed) {
            self.max_layer.store(node_layer, Ordering::Relaxed);
            *self.entry_point.write() = Some(node);
        }
        self.count.fetch_add(1, Ordering::Relaxed);
        node
    }

    /// Searches for the `k` nearest nodes, exploring `ef_search` candidates.
    ///
    /// An expired deadline stops the beam search and returns the best
    /// candidates found so far, flagged as truncated.
    pub(crate) fn search(
        &self,
        query: &[f32],
        k: usize,
        ef_search: usize,
        deadline: Option<Instant>,
    ) -> GraphHits {
        let Some(ep) = *self.entry_point.read() else {
            return GraphHits {
                nodes: Vec::new(),
                truncated: false,
            };
        };

        let max_layer = self.max_layer.load(Ordering::Relaxed);
        let mut current = ep;
        for layer_idx in (1..=max_layer).rev() {
            current = self.greedy_descend(query, current, layer_idx);
        }

        let mut hits = self.search_layer(query, vec![current], ef_search.max(k), 0, deadline);
        hits.nodes.truncate(k);
        hits
    }

    /// Greedy single-path descent within one layer.
    fn greedy_descend(&self, query: &[f32], entry: NodeId, layer: usize) -> NodeId {
        let mut best = entry;
        let mut best_dist = self.distance(query, &self.get_vector(best));

        loop {
            let neighbors = self.layers.read()[layer].get_neighbors(best);
            let mut improved = false;

            for neighbor in neighbors {
                let dist = self.distance(query, &self.get_vector(neighbor));
                if dist < best_dist {
                    best = neighbor;
                    best_dist = dist;
                    improved = true;
                }
            }

            if !improved {
                return best;
            }
        }
    }

    /// Beam search within one layer, keeping the `ef` closest candidates.
    fn search_layer(
        &self,
        query: &[f32],
        entry_points: Vec<NodeId>,
        ef: usize,
        layer: usize,
        deadline: Option<Instant>,
    ) -> GraphHits {
        let mut visited: FxHashSet<NodeId> = FxHashSet::default();
        let mut candidates: BinaryHeap<Reverse<(OrderedFloat, NodeId)>> = BinaryHeap::new();
        let mut results: BinaryHeap<(OrderedFloat, NodeId)> = BinaryHeap::new();
        let mut truncated = false;

        let vectors = self.vectors.read();

        for ep in entry_points {
            let dist = self.distance(query, &vectors[ep]);
            candidates.push(Reverse((OrderedFloat(dist), ep)));
            results.push((OrderedFloat(dist), ep));
            visited.insert(ep);
        }

        while let Some(Reverse((OrderedFloat(c_dist), c_node))) = candidates.pop() {
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    truncated = true;
                    break;
                }
            }

            let furthest = results.peek().map_or(f32::MAX, |r| r.0 .0);
            if c_dist > furthest && results.len() >= ef {
                break;
            }

            let neighbors = self.layers.read()[layer].get_neighbors(c_node);
            for neighbor in neighbors {
                if visited.insert(neighbor) {
                    let dist = self.distance(query, &vectors[neighbor]);
                    let furthest = results.peek().map_or(f32::MAX, |r| r.0 .0);

                    if dist < furthest || results.len() < ef {
                        candidates.push(Reverse((OrderedFloat(dist), neighbor)));
                        results.push((OrderedFloat(dist), neighbor));
                        if results.len() > ef {
                            results.pop();
                        }
                    }
                }
            }
        }

        let mut nodes: Vec<(NodeId, f32)> = results.into_iter().map(|(d, n)| (n, d.0)).collect();
        nodes.sort_by(|a, b| a.1.total_cmp(&b.1));
        GraphHits { nodes, truncated }
    }

    /// Alpha-diversified neighbor selection with a closest-first fallback.
    fn select_neighbors(&self, candidates: &[(NodeId, f32)], max_neighbors: usize) -> Vec<NodeId> {
        if candidates.len() <= max_neighbors {
            return candidates.iter().map(|&(n, _)| n).collect();
        }

        let mut selected: Vec<NodeId> = Vec::with_capacity(max_neighbors);
        let mut selected_vecs: Vec<Vec<f32>> = Vec::with_capacity(max_neighbors);

        for &(candidate, candidate_dist) in candidates {
            if selected.len() >= max_neighbors {
                break;
            }
            let candidate_vec = self.get_vector(candidate);
            let diverse = selected_vecs.iter().all(|sel| {
                self.alpha * candidate_dist <= self.distance(&candidate_vec, sel)
            });
            if diverse || selected.is_empty() {
                selected.push(candidate);
                selected_vecs.push(candidate_vec);
            }
        }

        // Top up with the closest remaining candidates if diversification
        // was too aggressive.
        if selected.len() < max_neighbors {
            for &(candidate, _) in candidates {
                if selected.len() >= max_neighbors {
                    break;
                }
                if !selected.contains(&candidate) {
                    selected.push(candidate);
                }
            }
        }

        selected
    }

    /// Adds the reverse edge `neighbor -> node`, pruning to `max_conn` by
    /// distance when the neighbor's list is full.
    fn connect_back(&self, node: NodeId, neighbor: NodeId, layer: usize, max_conn: usize) {
        let neighbor_vec = self.get_vector(neighbor);
        let current = self.layers.read()[layer].get_neighbors(neighbor);

        if current.len() < max_conn {
            let layers = self.layers.read();
            let mut neighbors = layers[layer].get_neighbors(neighbor);
            neighbors.push(node);
            layers[layer].set_neighbors(neighbor, neighbors);
            return;
        }

        let mut all = current;
        all.push(node);
        let mut with_dist: Vec<(NodeId, f32)> = all
            .into_iter()
            .map(|n| {
                let d = self.distance(&neighbor_vec, &self.get_vector(n));
                (n, d)
            })
            .collect();
        with_dist.sort_by(|a, b| a.1.total_cmp(&b.1));

        let pruned: Vec<NodeId> = with_dist.into_iter().take(max_conn).map(|(n, _)| n).collect();
        self.layers.read()[layer].set_neighbors(neighbor, pruned);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> HnswGraph {
        HnswGraph::new(DistanceMetric::Cosine, HnswParams::auto(2), 16)
    }

    #[test]
    fn test_empty_graph_search() {
        let g = graph();
        let hits = g.search(&[1.0, 0.0], 5, 64, None);
        assert!(hits.nodes.is_empty());
        assert!(!hits.truncated);
    }

    #[test]
    fn test_insert_and_self_retrieval() {
        let g = graph();
        let a = g.insert(vec![1.0, 0.0]);
        let b = g.insert(vec![0.0, 1.0]);
        let c = g.insert(vec![1.0, 1.0]);

        let hits = g.search(&[1.0, 0.0], 1, 64, None);
        assert_eq!(hits.nodes[0].0, a);

        let hits = g.search(&[0.0, 1.0], 1, 64, None);
        assert_eq!(hits.nodes[0].0, b);

        let hits = g.search(&[0.9, 0.9], 1, 64, None);
        assert_eq!(hits.nodes[0].0, c);
    }

    #[test]
    fn test_results_sorted_by_distance() {
        let g = graph();
        for i in 0..50 {
            let angle = i as f32 * 0.02;
            g.insert(vec![angle.cos(), angle.sin()]);
        }
        let hits = g.search(&[1.0, 0.0], 10, 128, None);
        assert_eq!(hits.nodes.len(), 10);
        for pair in hits.nodes.windows(2) {
            assert!(pair[0].1 <= pair[1].1);
        }
    }

    #[test]
    fn test_expired_deadline_flags_truncation() {
        let g = graph();
        for i in 0..100 {
            let angle = i as f32 * 0.01;
            g.insert(vec![angle.cos(), angle.sin()]);
        }
        let past = Instant::now() - std::time::Duration::from_secs(1);
        let hits = g.search(&[1.0, 0.0], 10, 128, Some(past));
        assert!(hits.truncated);
    }
}

//! The query engine: candidate retrieval, payload resolution, filtering,
//! and deterministic ranking.
//!
//! A query consults the active index generation for candidates, resolves
//! payloads from the store, applies the optional payload filter, and ranks
//! the survivors. Two guarantees matter here:
//!
//! - **Determinism**: results are ordered by descending score with ties
//!   broken by ascending id, so identical inputs produce identical output.
//! - **Degradation over failure**: an expired time budget returns the best
//!   results found so far (flagged), and a candidate whose record is missing
//!   from the store is skipped and counted, never fatal.

use std::time::{Duration, Instant};

use crate::config::{LimitsConfig, SearchConfig};
use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::index::{SearchEffort, VectorIndex};
use crate::metrics::OperationalMetrics;
use crate::point::{SearchOutcome, SearchResult};
use crate::store::VectorStore;

/// A fully specified similarity query.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    /// Query vector. Must match the engine dimension.
    pub vector: Vec<f32>,
    /// Maximum number of results.
    pub top_k: usize,
    /// Recall/latency trade-off; engine default when `None`.
    pub effort: Option<SearchEffort>,
    /// Optional payload filter applied after retrieval.
    pub filter: Option<Filter>,
    /// Optional time budget; expiry degrades the result instead of failing.
    pub time_budget: Option<Duration>,
}

impl QueryRequest {
    /// A plain top-k query with engine defaults.
    #[must_use]
    pub fn new(vector: Vec<f32>, top_k: usize) -> Self {
        Self {
            vector,
            top_k,
            effort: None,
            filter: None,
            time_budget: None,
        }
    }
}

/// Executes queries against one index generation and the record store.
pub(crate) struct QueryEngine<'a> {
    pub index: &'a dyn VectorIndex,
    pub store: &'a VectorStore,
    pub metrics: &'a OperationalMetrics,
    pub defaults: &'a SearchConfig,
    pub limits: &'a LimitsConfig,
}

impl QueryEngine<'_> {
    /// Runs one query end to end.
    pub(crate) fn execute(&self, request: &QueryRequest) -> Result<SearchOutcome> {
        if request.top_k == 0 || request.top_k > self.limits.max_top_k {
            return Err(Error::InvalidTopK(request.top_k));
        }
        if request.vector.len() != self.store.dimension() {
            return Err(Error::DimensionMismatch {
                expected: self.store.dimension(),
                actual: request.vector.len(),
            });
        }

        let effort = request.effort.unwrap_or(self.defaults.default_effort);
        let budget = request.time_budget.or_else(|| {
            self.defaults
                .default_time_budget_ms
                .map(Duration::from_millis)
        });
        let deadline = budget.map(|b| Instant::now() + b);

        // Filtered queries fetch more candidates so enough survive the
        // post-filter to fill k.
        let fetch_k = if request.filter.is_some() {
            request.top_k.saturating_mul(self.defaults.oversample)
        } else {
            request.top_k
        };

        let hits = self.index.search(&request.vector, fetch_k, effort, deadline)?;
        let mut degraded = hits.truncated;

        let mut results: Vec<SearchResult> = Vec::with_capacity(request.top_k);
        for (id, score) in hits.candidates {
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline && !results.is_empty() {
                    degraded = true;
                    break;
                }
            }

            let Some(point) = self.store.get(id) else {
                // The index can briefly reference a record the store has
                // already dropped. Skip it and keep going; this is a
                // recoverable consistency gap, not a query failure.
                OperationalMetrics::incr(&self.metrics.consistency_gaps);
                tracing::warn!(id, "index candidate missing from store, skipping");
                continue;
            };

            if let Some(filter) = &request.filter {
                if !filter.matches(point.payload.as_ref()) {
                    continue;
                }
            }

            results.push(SearchResult {
                id,
                score,
                payload: point.payload,
            });
        }

        // Deterministic ranking: descending score, ascending id on ties.
        results.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.id.cmp(&b.id)));
        results.truncate(request.top_k);

        OperationalMetrics::incr(&self.metrics.searches);
        if degraded {
            OperationalMetrics::incr(&self.metrics.degraded_searches);
        }

        Ok(SearchOutcome { results, degraded })
    }
}

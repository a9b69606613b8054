//! Operational counters, latency percentiles, and retrieval quality.
//!
//! Consistency gaps (the index referencing a record the store no longer has)
//! are absorbed by the query engine rather than failing the query; this
//! module is where they become observable.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

/// Process-wide counters maintained by the engine.
///
/// All counters are monotonic and lock-free; `snapshot` gives a consistent
/// enough view for a stats endpoint (individual loads are relaxed).
#[derive(Debug, Default)]
pub struct OperationalMetrics {
    /// Completed searches.
    pub searches: AtomicU64,
    /// Searches that returned partial results because a time budget expired.
    pub degraded_searches: AtomicU64,
    /// Candidates skipped because the store had no record for an indexed id.
    pub consistency_gaps: AtomicU64,
    /// Accepted upserts.
    pub upserts: AtomicU64,
    /// Accepted deletes.
    pub deletes: AtomicU64,
    /// Completed index rebuilds.
    pub rebuilds: AtomicU64,
}

/// Point-in-time copy of [`OperationalMetrics`], serializable for APIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Completed searches.
    pub searches: u64,
    /// Degraded (partial) searches.
    pub degraded_searches: u64,
    /// Skipped candidates due to missing store records.
    pub consistency_gaps: u64,
    /// Accepted upserts.
    pub upserts: u64,
    /// Accepted deletes.
    pub deletes: u64,
    /// Completed rebuilds.
    pub rebuilds: u64,
}

impl OperationalMetrics {
    /// Increments a counter by one.
    #[inline]
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a point-in-time copy of all counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            searches: self.searches.load(Ordering::Relaxed),
            degraded_searches: self.degraded_searches.load(Ordering::Relaxed),
            consistency_gaps: self.consistency_gaps.load(Ordering::Relaxed),
            upserts: self.upserts.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            rebuilds: self.rebuilds.load(Ordering::Relaxed),
        }
    }
}

/// Latency statistics including percentiles.
///
/// Percentiles are more useful than the mean for tail behavior; p99 is what
/// the latency budget in the service contract is written against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LatencyStats {
    /// Minimum latency observed.
    pub min: Duration,
    /// Maximum latency observed.
    pub max: Duration,
    /// Mean latency.
    pub mean: Duration,
    /// 50th percentile (median).
    pub p50: Duration,
    /// 95th percentile.
    pub p95: Duration,
    /// 99th percentile.
    pub p99: Duration,
}

/// Computes latency percentiles from duration samples.
#[must_use]
pub fn compute_latency_percentiles(samples: &[Duration]) -> LatencyStats {
    if samples.is_empty() {
        return LatencyStats::default();
    }

    let mut sorted: Vec<Duration> = samples.to_vec();
    sorted.sort();

    let n = sorted.len();
    let sum: Duration = sorted.iter().sum();
    // SAFETY: the mean of durations cannot exceed the maximum sample, which
    // fits in u64 nanoseconds.
    #[allow(clippy::cast_possible_truncation)]
    let mean = Duration::from_nanos((sum.as_nanos() / n as u128) as u64);

    LatencyStats {
        min: sorted[0],
        max: sorted[n - 1],
        mean,
        p50: percentile(&sorted, 50),
        p95: percentile(&sorted, 95),
        p99: percentile(&sorted, 99),
    }
}

/// Computes a percentile from a sorted list of durations.
fn percentile(sorted: &[Duration], p: usize) -> Duration {
    let n = sorted.len();
    // SAFETY: p is in [0, 100] so the index lands in [0, n-1] after round().
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    let idx = ((p as f64 / 100.0) * (n - 1) as f64).round() as usize;
    sorted[idx.min(n - 1)]
}

/// Recall@k: fraction of ground-truth neighbors present in `results`.
///
/// Used to compare an index generation against a freshly built one, e.g. to
/// assert a rebuild did not regress retrieval quality.
#[must_use]
#[allow(clippy::cast_precision_loss)] // Result counts are far below 2^52.
pub fn recall_at_k(ground_truth: &[u64], results: &[u64]) -> f64 {
    if ground_truth.is_empty() {
        return 0.0;
    }
    let hits = results
        .iter()
        .filter(|id| ground_truth.contains(id))
        .count();
    hits as f64 / ground_truth.len() as f64
}

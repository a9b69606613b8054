//! The engine facade: document and vector operations over the store, the
//! index handle, and the embedding adapter.
//!
//! # Concurrency
//!
//! Searches take no engine lock: they load the active index generation and
//! read the store concurrently. Writes serialize on `write_lock` and are
//! applied in submission order. The embedding adapter is always called
//! *before* the writer lock is taken, so an adapter stall cannot stall
//! unrelated queries or writes.
//!
//! # Rebuild
//!
//! `rebuild_index` constructs the next generation without holding the
//! writer lock; reads and writes proceed against the active generation the
//! whole time (mid-rebuild writes are also buffered). The writer lock is
//! held only for the final drain-and-swap.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::config::{CompactionPolicy, EmbedbConfig};
use crate::embed::{EmbedError, Embedder};
use crate::error::{Error, Result};
use crate::index::{
    HnswIndex, HnswParams, IndexHandle, IndexState, PendingOp, VectorIndex,
};
use crate::metrics::{MetricsSnapshot, OperationalMetrics};
use crate::point::{Point, SearchOutcome};
use crate::search::{QueryEngine, QueryRequest};
use crate::store::VectorStore;

/// Engine status exposed by the stats operation.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    /// Live records in the store.
    pub records: usize,
    /// Live entries in the active index generation.
    pub indexed: usize,
    /// Tombstoned index entries awaiting a rebuild.
    pub tombstones: u64,
    /// Index lifecycle state.
    pub state: &'static str,
    /// Vector dimension.
    pub dimension: usize,
    /// Similarity metric.
    pub metric: String,
    /// Operation counters.
    pub metrics: MetricsSnapshot,
}

/// The embedding index and similarity-search engine.
pub struct Engine {
    config: EmbedbConfig,
    store: VectorStore,
    index: IndexHandle,
    embedder: Arc<dyn Embedder>,
    metrics: OperationalMetrics,
    /// Serializes all mutating operations.
    write_lock: Mutex<()>,
}

impl Engine {
    /// Opens the engine: recovers the store from snapshot + WAL and builds
    /// the initial index generation from the live records.
    ///
    /// # Errors
    ///
    /// Fails on invalid configuration, an adapter whose dimension disagrees
    /// with the configured one, corrupted persistent state, or I/O errors.
    pub fn open(config: EmbedbConfig, embedder: Arc<dyn Embedder>) -> Result<Self> {
        config.validate().map_err(|e| Error::Config(e.to_string()))?;
        if embedder.dimension() != config.hnsw.dimension {
            return Err(Error::Config(format!(
                "embedder dimension {} does not match configured dimension {}",
                embedder.dimension(),
                config.hnsw.dimension
            )));
        }

        let store = VectorStore::open(
            &config.storage.data_dir,
            config.hnsw.dimension,
            config.hnsw.metric,
            config.storage.snapshot_threshold_bytes,
            config.storage.sync_writes,
        )?;

        let index = Self::build_generation(&config, &store)?;
        tracing::info!(
            records = store.len(),
            dimension = config.hnsw.dimension,
            metric = %config.hnsw.metric,
            "engine opened"
        );

        Ok(Self {
            config,
            store,
            index: IndexHandle::new(index),
            embedder,
            metrics: OperationalMetrics::default(),
            write_lock: Mutex::new(()),
        })
    }

    /// Builds a fresh index generation from every live store record.
    fn build_generation(config: &EmbedbConfig, store: &VectorStore) -> Result<HnswIndex> {
        let params = HnswParams {
            max_connections: config.hnsw.max_connections,
            ef_construction: config.hnsw.ef_construction,
            ..HnswParams::auto(config.hnsw.dimension)
        };
        let index = HnswIndex::new(
            config.hnsw.dimension,
            config.hnsw.metric,
            params,
            config.hnsw.capacity,
        );
        for point in store.iter() {
            index.insert(point.id, &point.vector)?;
        }
        Ok(index)
    }

    /// Embeds `content` and upserts it under `id`.
    ///
    /// The adapter call happens before any engine lock is taken; adapter
    /// failures surface unchanged and are never retried here.
    pub fn index_document(
        &self,
        id: u64,
        content: &str,
        payload: Option<serde_json::Value>,
    ) -> Result<()> {
        let vector = self.embedder.embed(content)?;
        if vector.len() != self.store.dimension() {
            return Err(Error::Embedding(EmbedError::Dimension {
                expected: self.store.dimension(),
                actual: vector.len(),
            }));
        }
        self.upsert_vector(id, vector, payload)
    }

    /// Upserts a precomputed vector under `id`.
    ///
    /// The write is durable (WAL) and searchable when this returns.
    pub fn upsert_vector(
        &self,
        id: u64,
        vector: Vec<f32>,
        payload: Option<serde_json::Value>,
    ) -> Result<()> {
        if vector.len() != self.store.dimension() {
            return Err(Error::DimensionMismatch {
                expected: self.store.dimension(),
                actual: vector.len(),
            });
        }
        if let Some(payload) = &payload {
            let size = serde_json::to_vec(payload)
                .map(|b| b.len())
                .unwrap_or(usize::MAX);
            if size > self.config.limits.max_payload_bytes {
                return Err(Error::PayloadTooLarge {
                    limit: self.config.limits.max_payload_bytes,
                });
            }
        }

        {
            let _guard = self.write_lock.lock();
            let index = self.index.load();
            // Capacity is checked before the store mutates so a full index
            // rejects the write without leaving a half-applied record.
            if index.total_nodes() >= self.config.hnsw.capacity {
                return Err(Error::IndexFull {
                    capacity: self.config.hnsw.capacity,
                });
            }

            self.store.put(Point::new(id, vector.clone(), payload))?;
            index.insert(id, &vector)?;
            self.index.log_pending(PendingOp::Upsert(id, vector));
            OperationalMetrics::incr(&self.metrics.upserts);
        }

        self.maybe_snapshot();
        Ok(())
    }

    /// Deletes the record for `id`.
    ///
    /// The id is tombstoned in the index immediately: it is absent from all
    /// searches as soon as this returns, before any rebuild.
    ///
    /// # Errors
    ///
    /// `NotFound` when no such record exists.
    pub fn delete_document(&self, id: u64) -> Result<()> {
        {
            let _guard = self.write_lock.lock();
            if !self.store.delete(id)? {
                return Err(Error::NotFound(id));
            }
            let index = self.index.load();
            index.remove(id);
            self.index.log_pending(PendingOp::Delete(id));
            OperationalMetrics::incr(&self.metrics.deletes);
        }

        self.maybe_compact();
        Ok(())
    }

    /// Returns the record for `id`, if it exists.
    #[must_use]
    pub fn get(&self, id: u64) -> Option<Point> {
        self.store.get(id)
    }

    /// Runs a similarity query against the active index generation.
    pub fn search(&self, request: &QueryRequest) -> Result<SearchOutcome> {
        let index = self.index.load();
        QueryEngine {
            index: &*index,
            store: &self.store,
            metrics: &self.metrics,
            defaults: &self.config.search,
            limits: &self.config.limits,
        }
        .execute(request)
    }

    /// Embeds `query` and runs a similarity query with it.
    pub fn search_text(&self, query: &str, mut request: QueryRequest) -> Result<SearchOutcome> {
        request.vector = self.embedder.embed(query)?;
        self.search(&request)
    }

    /// Rebuilds the index from the live records and swaps it in atomically.
    ///
    /// Queries keep running against the previous generation throughout;
    /// writes are blocked only for the final drain of mid-rebuild
    /// operations.
    ///
    /// # Errors
    ///
    /// `RebuildInProgress` when another rebuild is running; the active
    /// generation stays in place on any failure.
    pub fn rebuild_index(&self) -> Result<()> {
        {
            let _guard = self.write_lock.lock();
            if !self.index.begin_rebuild() {
                return Err(Error::RebuildInProgress);
            }
        }

        let started = std::time::Instant::now();
        let built = Self::build_generation(&self.config, &self.store);

        match built {
            Ok(next) => {
                let _guard = self.write_lock.lock();
                self.index.finish_rebuild(next)?;
                OperationalMetrics::incr(&self.metrics.rebuilds);
                tracing::info!(elapsed = ?started.elapsed(), "index rebuilt");
                Ok(())
            }
            Err(e) => {
                self.index.abort_rebuild();
                tracing::error!(error = %e, "index rebuild failed, keeping previous generation");
                Err(e)
            }
        }
    }

    /// Writes a store snapshot now.
    pub fn create_snapshot(&self) -> Result<()> {
        self.store.create_snapshot()
    }

    /// Current index lifecycle state.
    #[must_use]
    pub fn index_state(&self) -> IndexState {
        self.index.state()
    }

    /// Engine status for observability endpoints.
    #[must_use]
    pub fn stats(&self) -> EngineStats {
        let index = self.index.load();
        EngineStats {
            records: self.store.len(),
            indexed: index.len(),
            tombstones: index.tombstones(),
            state: match self.index.state() {
                IndexState::Active => "active",
                IndexState::Rebuilding => "rebuilding",
            },
            dimension: self.store.dimension(),
            metric: self.config.hnsw.metric.to_string(),
            metrics: self.metrics.snapshot(),
        }
    }

    /// Snapshots when the WAL has outgrown the threshold. Failures are
    /// logged, not surfaced: the write that triggered this already
    /// succeeded and is durable in the WAL.
    fn maybe_snapshot(&self) {
        if self.store.should_snapshot() {
            if let Err(e) = self.store.create_snapshot() {
                tracing::error!(error = %e, "periodic snapshot failed");
            }
        }
    }

    /// Compacts (rebuilds) when the tombstone policy asks for it.
    fn maybe_compact(&self) {
        let CompactionPolicy::RebuildAtRatio { ratio } = self.config.compaction else {
            return;
        };
        let index = self.index.load();
        if index.tombstone_ratio() >= ratio && index.total_nodes() > 0 {
            match self.rebuild_index() {
                Ok(()) | Err(Error::RebuildInProgress) => {}
                Err(e) => tracing::error!(error = %e, "policy-triggered rebuild failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::NoopEmbedder;
    use serde_json::json;
    use tempfile::tempdir;

    fn engine_in(dir: &std::path::Path) -> Engine {
        let mut config = EmbedbConfig::default();
        config.storage.data_dir = dir.to_path_buf();
        config.hnsw.dimension = 2;
        Engine::open(config, Arc::new(NoopEmbedder::new(2))).unwrap()
    }

    #[test]
    fn test_upsert_search_delete_cycle() {
        let dir = tempdir().unwrap();
        let engine = engine_in(dir.path());

        engine
            .upsert_vector(1, vec![1.0, 0.0], Some(json!({"t": "a"})))
            .unwrap();
        engine.upsert_vector(2, vec![0.0, 1.0], None).unwrap();

        let outcome = engine
            .search(&QueryRequest::new(vec![1.0, 0.0], 1))
            .unwrap();
        assert_eq!(outcome.results[0].id, 1);
        assert_eq!(outcome.results[0].payload, Some(json!({"t": "a"})));

        engine.delete_document(1).unwrap();
        assert!(matches!(
            engine.delete_document(1),
            Err(Error::NotFound(1))
        ));
        let outcome = engine
            .search(&QueryRequest::new(vec![1.0, 0.0], 2))
            .unwrap();
        assert!(!outcome.results.iter().any(|r| r.id == 1));
    }

    #[test]
    fn test_text_operations_without_endpoint_fail_cleanly() {
        let dir = tempdir().unwrap();
        let engine = engine_in(dir.path());
        assert!(matches!(
            engine.index_document(1, "hello", None),
            Err(Error::Embedding(EmbedError::Unavailable(_)))
        ));
        assert!(matches!(
            engine.search_text("hello", QueryRequest::new(Vec::new(), 5)),
            Err(Error::Embedding(EmbedError::Unavailable(_)))
        ));
    }

    #[test]
    fn test_rebuild_preserves_results_and_reclaims_tombstones() {
        let dir = tempdir().unwrap();
        let mut config = EmbedbConfig::default();
        config.storage.data_dir = dir.path().to_path_buf();
        config.hnsw.dimension = 2;
        // Keep tombstones forever so the rebuild here is the explicit one.
        config.compaction = CompactionPolicy::KeepForever;
        let engine = Engine::open(config, Arc::new(NoopEmbedder::new(2))).unwrap();

        for i in 0..20 {
            let angle = i as f32 * 0.05;
            engine
                .upsert_vector(i, vec![angle.cos(), angle.sin()], None)
                .unwrap();
        }
        for i in 0..5 {
            engine.delete_document(i).unwrap();
        }
        assert_eq!(engine.stats().tombstones, 5);

        let before = engine
            .search(&QueryRequest::new(vec![1.0, 0.0], 5))
            .unwrap();
        engine.rebuild_index().unwrap();
        let after = engine
            .search(&QueryRequest::new(vec![1.0, 0.0], 5))
            .unwrap();

        assert_eq!(engine.stats().tombstones, 0);
        let before_ids: Vec<u64> = before.results.iter().map(|r| r.id).collect();
        let after_ids: Vec<u64> = after.results.iter().map(|r| r.id).collect();
        assert_eq!(before_ids, after_ids);
    }

    #[test]
    fn test_policy_compaction_triggers_rebuild() {
        let dir = tempdir().unwrap();
        let mut config = EmbedbConfig::default();
        config.storage.data_dir = dir.path().to_path_buf();
        config.hnsw.dimension = 2;
        config.compaction = CompactionPolicy::RebuildAtRatio { ratio: 0.25 };
        let engine = Engine::open(config, Arc::new(NoopEmbedder::new(2))).unwrap();

        for i in 0..8 {
            engine.upsert_vector(i, vec![i as f32, 1.0], None).unwrap();
        }
        engine.delete_document(0).unwrap();
        engine.delete_document(1).unwrap();
        // 2/8 = 0.25 hits the ratio; the delete call compacts inline.
        assert_eq!(engine.stats().tombstones, 0);
        assert_eq!(engine.stats().metrics.rebuilds, 1);
    }

    #[test]
    fn test_restart_recovers_engine_state() {
        let dir = tempdir().unwrap();
        {
            let engine = engine_in(dir.path());
            engine
                .upsert_vector(1, vec![1.0, 0.0], Some(json!({"n": 1})))
                .unwrap();
            engine.upsert_vector(2, vec![0.0, 1.0], None).unwrap();
            engine.delete_document(2).unwrap();
        }

        let engine = engine_in(dir.path());
        assert_eq!(engine.stats().records, 1);
        let outcome = engine
            .search(&QueryRequest::new(vec![1.0, 0.0], 5))
            .unwrap();
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].id, 1);
    }

    #[test]
    fn test_capacity_exhaustion_then_rebuild_frees_space() {
        let dir = tempdir().unwrap();
        let mut config = EmbedbConfig::default();
        config.storage.data_dir = dir.path().to_path_buf();
        config.hnsw.dimension = 2;
        config.hnsw.capacity = 4;
        config.compaction = CompactionPolicy::KeepForever;
        let engine = Engine::open(config, Arc::new(NoopEmbedder::new(2))).unwrap();

        for i in 0..4 {
            engine.upsert_vector(i, vec![i as f32, 1.0], None).unwrap();
        }
        assert!(matches!(
            engine.upsert_vector(9, vec![9.0, 1.0], None),
            Err(Error::IndexFull { capacity: 4 })
        ));

        engine.delete_document(0).unwrap();
        // Still full: tombstones hold their slots until the rebuild.
        assert!(matches!(
            engine.upsert_vector(9, vec![9.0, 1.0], None),
            Err(Error::IndexFull { .. })
        ));

        engine.rebuild_index().unwrap();
        engine.upsert_vector(9, vec![9.0, 1.0], None).unwrap();
    }
}

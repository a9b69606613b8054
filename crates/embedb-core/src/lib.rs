//! # embedb Core
//!
//! Embedding index and similarity-search engine.
//!
//! embedb stores fixed-dimension embedding vectors with opaque JSON
//! payloads, maintains an HNSW approximate nearest-neighbor index over
//! them, and serves low-latency top-k similarity queries under concurrent
//! read and write pressure.
//!
//! ## Features
//!
//! - **HNSW retrieval**: sub-linear approximate search with a per-query
//!   recall/latency effort knob
//! - **Atomic-swap rebuilds**: queries never observe a partially built
//!   index; writes stay searchable throughout
//! - **Immediate tombstones**: deletes vanish from results before any
//!   physical compaction
//! - **Durability**: CRC-protected write-ahead log plus snapshots; restart
//!   recovers every acknowledged write
//! - **Time-budgeted queries**: an expired budget degrades the result
//!   instead of failing it
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use embedb_core::{EmbedbConfig, Engine, NoopEmbedder, QueryRequest};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = EmbedbConfig::default();
//!     config.hnsw.dimension = 4;
//!
//!     let embedder = Arc::new(NoopEmbedder::new(4));
//!     let engine = Engine::open(config, embedder)?;
//!
//!     engine.upsert_vector(1, vec![0.1, 0.2, 0.3, 0.4], None)?;
//!
//!     let outcome = engine.search(&QueryRequest::new(vec![0.1, 0.2, 0.3, 0.4], 10))?;
//!     for hit in outcome.results {
//!         println!("{} {:.3}", hit.id, hit.score);
//!     }
//!     # Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![cfg_attr(
    test,
    allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::float_cmp
    )
)]

pub mod config;
pub mod distance;
pub mod embed;
pub mod engine;
pub mod error;
pub mod filter;
pub mod index;
pub mod metrics;
pub mod point;
pub mod search;
pub mod store;

pub use config::{
    CompactionPolicy, ConfigError, EmbedbConfig, HnswConfig, LimitsConfig, LoggingConfig,
    ModelConfig, SearchConfig, ServerConfig, StorageConfig,
};
pub use distance::DistanceMetric;
pub use embed::{EmbedError, Embedder, NoopEmbedder};
pub use engine::{Engine, EngineStats};
pub use error::{Error, Result};
pub use filter::{Condition, Filter};
pub use index::{HnswIndex, HnswParams, IndexHandle, IndexState, SearchEffort, VectorIndex};
pub use metrics::{
    compute_latency_percentiles, recall_at_k, LatencyStats, MetricsSnapshot, OperationalMetrics,
};
pub use point::{Point, SearchOutcome, SearchResult};
pub use search::QueryRequest;
pub use store::VectorStore;

//! Engine and server configuration.
//!
//! Configuration is explicit, passed-in state: it is loaded once at startup
//! (TOML file plus `EMBEDB_` environment overrides, via figment) and is
//! read-only afterwards. Nothing in the crate reads ambient process state;
//! the model cache path in particular travels through [`ModelConfig`], not
//! through environment lookups at call sites.

use std::path::PathBuf;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::distance::DistanceMetric;
use crate::index::SearchEffort;

/// Default configuration file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "embedb.toml";

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file/env providers failed to parse or merge.
    #[error("failed to load configuration: {0}")]
    Load(#[from] figment::Error),
    /// The merged configuration is semantically invalid.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Storage paths and durability knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the WAL, snapshot, and vector arena files.
    pub data_dir: PathBuf,
    /// WAL growth (bytes since the last snapshot) that triggers a new snapshot.
    pub snapshot_threshold_bytes: u64,
    /// Fsync the WAL on every write instead of relying on OS buffering.
    pub sync_writes: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            snapshot_threshold_bytes: 10 * 1024 * 1024,
            sync_writes: false,
        }
    }
}

/// HNSW index shape. Fixed at engine creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HnswConfig {
    /// Vector dimension. Every insert is validated against this.
    pub dimension: usize,
    /// Similarity metric, fixed per instance.
    pub metric: DistanceMetric,
    /// Bi-directional links per node (the M parameter).
    pub max_connections: usize,
    /// Candidate list size during construction.
    pub ef_construction: usize,
    /// Maximum number of elements (live + tombstoned) the index accepts
    /// before inserts are rejected with `IndexFull`.
    pub capacity: usize,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            dimension: 768,
            metric: DistanceMetric::Cosine,
            max_connections: 16,
            ef_construction: 200,
            capacity: 100_000,
        }
    }
}

/// Query-time defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Effort profile used when a request does not specify one.
    pub default_effort: SearchEffort,
    /// Multiplier applied to k when tombstones or filters require
    /// oversampling before post-filtering.
    pub oversample: usize,
    /// Default per-query time budget in milliseconds. `None` means unbounded.
    pub default_time_budget_ms: Option<u64>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_effort: SearchEffort::Balanced,
            oversample: 4,
            default_time_budget_ms: None,
        }
    }
}

/// Policy for reclaiming tombstoned index slots.
///
/// Whether deletions must be physically compacted or may remain tombstoned
/// indefinitely is workload-dependent, so it is a policy knob rather than a
/// fixed assumption.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CompactionPolicy {
    /// Tombstones are kept until an explicit `rebuild_index` call.
    KeepForever,
    /// A rebuild is triggered automatically once
    /// `tombstones / (live + tombstones)` exceeds `ratio`.
    RebuildAtRatio {
        /// Tombstone fraction in `(0, 1)` that triggers compaction.
        ratio: f32,
    },
}

impl Default for CompactionPolicy {
    fn default() -> Self {
        Self::RebuildAtRatio { ratio: 0.3 }
    }
}

/// Hard limits protecting the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum serialized payload size per record.
    pub max_payload_bytes: usize,
    /// Maximum accepted `top_k` per query.
    pub max_top_k: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: 1024 * 1024,
            max_top_k: 1024,
        }
    }
}

/// Embedding model wiring for the adapter.
///
/// The cache directory is where the external inference runtime keeps model
/// weights; the core never touches it, it only carries the value to the
/// adapter at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Base URL of the embedding inference endpoint. `None` disables text
    /// operations (vector operations keep working).
    pub endpoint: Option<String>,
    /// Model identifier passed to the inference endpoint.
    pub name: String,
    /// Local model cache directory, handed to the inference runtime.
    pub cache_dir: PathBuf,
    /// Request timeout for a single embed call.
    pub timeout_ms: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            name: "Qwen/Qwen3-Embedding-0.6B".to_string(),
            cache_dir: PathBuf::from("./models"),
            timeout_ms: 30_000,
        }
    }
}

/// HTTP server binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Comma-separated allowed CORS origins. `None` means permissive.
    pub cors_origin: Option<String>,
    /// Request body limit in bytes.
    pub body_limit_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            cors_origin: None,
            body_limit_bytes: 32 * 1024 * 1024,
        }
    }
}

/// Logging directives for the subscriber installed by the binary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive, e.g. `info,tower_http=debug`.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

/// Top-level configuration for the engine and its HTTP facade.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedbConfig {
    /// Storage paths and durability.
    pub storage: StorageConfig,
    /// Index shape.
    pub hnsw: HnswConfig,
    /// Query-time defaults.
    pub search: SearchConfig,
    /// Tombstone reclamation policy.
    pub compaction: CompactionPolicy,
    /// Service limits.
    pub limits: LimitsConfig,
    /// Embedding adapter wiring.
    pub model: ModelConfig,
    /// HTTP binding.
    pub server: ServerConfig,
    /// Logging directives.
    pub logging: LoggingConfig,
}

impl EmbedbConfig {
    /// Loads configuration from `embedb.toml` (if present) and `EMBEDB_*`
    /// environment variables, over built-in defaults.
    ///
    /// Nested keys use `__` in the environment: `EMBEDB_SERVER__PORT=9090`.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_file(DEFAULT_CONFIG_FILE)
    }

    /// Loads configuration from the given TOML file path plus environment
    /// overrides. A missing file is not an error; defaults apply.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("EMBEDB_").split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Validates cross-field invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hnsw.dimension == 0 {
            return Err(ConfigError::Invalid("hnsw.dimension must be >= 1".into()));
        }
        if self.hnsw.max_connections < 2 {
            return Err(ConfigError::Invalid(
                "hnsw.max_connections must be >= 2".into(),
            ));
        }
        if self.hnsw.ef_construction < self.hnsw.max_connections {
            return Err(ConfigError::Invalid(
                "hnsw.ef_construction must be >= hnsw.max_connections".into(),
            ));
        }
        if self.hnsw.capacity == 0 {
            return Err(ConfigError::Invalid("hnsw.capacity must be >= 1".into()));
        }
        if self.search.oversample == 0 {
            return Err(ConfigError::Invalid("search.oversample must be >= 1".into()));
        }
        if let CompactionPolicy::RebuildAtRatio { ratio } = self.compaction {
            if !(0.0..1.0).contains(&ratio) || ratio == 0.0 {
                return Err(ConfigError::Invalid(
                    "compaction.ratio must be in (0, 1)".into(),
                ));
            }
        }
        Ok(())
    }
}

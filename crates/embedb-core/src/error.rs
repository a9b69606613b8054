//! Error types for embedb.
//!
//! The taxonomy separates errors that are rejected synchronously with no
//! state change (validation), errors that are returned but not fatal
//! (not-found), and errors that are fatal to a single write but not to the
//! service (index capacity).

use thiserror::Error;

use crate::embed::EmbedError;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the embedding index and search engine.
#[derive(Debug, Error)]
pub enum Error {
    /// A vector's length does not match the dimension fixed for this engine.
    ///
    /// Rejected before any mutation: the store and index are left unchanged.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension the engine was created with.
        expected: usize,
        /// Length of the offending vector.
        actual: usize,
    },

    /// `top_k` must be at least 1.
    #[error("invalid top_k: {0} (must be >= 1)")]
    InvalidTopK(usize),

    /// A payload exceeds the configured size limit.
    #[error("payload too large: limit is {limit} bytes")]
    PayloadTooLarge {
        /// Configured maximum serialized payload size.
        limit: usize,
    },

    /// No record with this id exists.
    #[error("record {0} not found")]
    NotFound(u64),

    /// A rebuild is already running; only one may run at a time.
    #[error("index rebuild already in progress")]
    RebuildInProgress,

    /// The index is at capacity and cannot accept inserts until a rebuild
    /// reclaims tombstoned slots.
    #[error("index full: capacity {capacity} reached, rebuild to reclaim tombstoned slots")]
    IndexFull {
        /// Configured maximum element count.
        capacity: usize,
    },

    /// The embedding adapter failed to produce a vector.
    ///
    /// Surfaced to the caller unchanged; the engine issues no retries.
    #[error(transparent)]
    Embedding(#[from] EmbedError),

    /// Persisted state failed integrity validation during recovery.
    #[error("corrupted persistent state: {0}")]
    Corrupted(String),

    /// Underlying I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Configuration could not be loaded or validated.
    #[error("configuration error: {0}")]
    Config(String),
}

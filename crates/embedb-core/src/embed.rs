//! Embedding adapter interface.
//!
//! Model inference is an external collaborator: the engine only sees a
//! function from text to a fixed-length vector. Implementations live outside
//! the core (the server crate ships an HTTP-backed adapter); tests use a
//! deterministic stub.
//!
//! Adapter calls may be slow. The engine never holds a store or index lock
//! across an `embed` call, and it never retries on failure; retry policy
//! belongs to the caller.

use thiserror::Error;

/// Errors an embedding adapter may surface.
#[derive(Debug, Error)]
pub enum EmbedError {
    /// The underlying model or endpoint cannot produce a result right now.
    #[error("embedding unavailable: {0}")]
    Unavailable(String),
    /// The adapter produced a vector of the wrong length for this engine.
    #[error("embedding dimension mismatch: adapter produced {actual}, engine expects {expected}")]
    Dimension {
        /// Dimension the engine was created with.
        expected: usize,
        /// Length the adapter produced.
        actual: usize,
    },
}

/// Converts text or document content into an embedding vector.
pub trait Embedder: Send + Sync {
    /// Embeds the input into a vector of [`Embedder::dimension`] length.
    fn embed(&self, input: &str) -> Result<Vec<f32>, EmbedError>;

    /// Output dimension of this adapter.
    fn dimension(&self) -> usize;
}

/// Adapter used when no embedding endpoint is configured.
///
/// Vector operations keep working; text operations fail with
/// [`EmbedError::Unavailable`].
pub struct NoopEmbedder {
    dimension: usize,
}

impl NoopEmbedder {
    /// Creates a disabled adapter reporting the given dimension.
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Embedder for NoopEmbedder {
    fn embed(&self, _input: &str) -> Result<Vec<f32>, EmbedError> {
        Err(EmbedError::Unavailable(
            "no embedding endpoint configured".to_string(),
        ))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

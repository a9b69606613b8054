//! HTTP-backed embedding adapter.
//!
//! Model inference runs in a separate service (the thing that actually
//! holds the model weights and cache). This adapter POSTs text to its
//! `/embeddings` route and expects a JSON body of the form:
//!
//! ```json
//! { "embedding": [0.12, -0.03, ...] }
//! ```
//!
//! The client is blocking by design: engine write paths are synchronous and
//! handlers call them inside `spawn_blocking`. Failures map to
//! `EmbedError::Unavailable`; retrying is the caller's decision, never the
//! adapter's.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use embedb_core::{EmbedError, Embedder, ModelConfig};

#[derive(Serialize)]
struct EmbedRequestBody<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponseBody {
    embedding: Vec<f32>,
}

/// Embedding adapter backed by a remote inference endpoint.
pub struct RemoteEmbedder {
    client: reqwest::blocking::Client,
    url: String,
    model: String,
    dimension: usize,
}

impl RemoteEmbedder {
    /// Builds an adapter from the model configuration.
    ///
    /// # Errors
    ///
    /// Fails when no endpoint is configured or the HTTP client cannot be
    /// constructed.
    pub fn from_config(config: &ModelConfig, dimension: usize) -> Result<Self, EmbedError> {
        let endpoint = config
            .endpoint
            .as_deref()
            .ok_or_else(|| EmbedError::Unavailable("no embedding endpoint configured".into()))?;

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| EmbedError::Unavailable(format!("embedding client: {e}")))?;

        Ok(Self {
            client,
            url: format!("{}/embeddings", endpoint.trim_end_matches('/')),
            model: config.name.clone(),
            dimension,
        })
    }
}

impl Embedder for RemoteEmbedder {
    fn embed(&self, input: &str) -> Result<Vec<f32>, EmbedError> {
        let response = self
            .client
            .post(&self.url)
            .json(&EmbedRequestBody {
                model: &self.model,
                input,
            })
            .send()
            .map_err(|e| EmbedError::Unavailable(format!("embedding request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(EmbedError::Unavailable(format!(
                "embedding endpoint returned {}",
                response.status()
            )));
        }

        let body: EmbedResponseBody = response
            .json()
            .map_err(|e| EmbedError::Unavailable(format!("embedding response: {e}")))?;

        if body.embedding.len() != self.dimension {
            return Err(EmbedError::Dimension {
                expected: self.dimension,
                actual: body.embedding.len(),
            });
        }
        Ok(body.embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

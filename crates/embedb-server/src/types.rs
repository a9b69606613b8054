//! Request and response types for the REST API.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use embedb_core::SearchEffort;

/// Body for `POST /documents`: text content embedded server-side.
#[derive(Debug, Deserialize, ToSchema)]
pub struct IndexDocumentRequest {
    /// Stable document id.
    pub id: u64,
    /// Text content handed to the embedding adapter.
    pub content: String,
    /// Opaque payload returned with search results.
    #[serde(default)]
    pub payload: Option<Value>,
}

/// Body for `POST /vectors`: a precomputed embedding.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpsertVectorRequest {
    /// Stable record id.
    pub id: u64,
    /// Embedding vector of the engine's configured dimension.
    pub vector: Vec<f32>,
    /// Opaque payload returned with search results.
    #[serde(default)]
    pub payload: Option<Value>,
}

/// Body for `POST /search`.
///
/// Exactly one of `vector` and `query` must be set; `query` needs an
/// embedding endpoint configured.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SearchRequest {
    /// Query vector.
    #[serde(default)]
    pub vector: Option<Vec<f32>>,
    /// Text query embedded server-side.
    #[serde(default)]
    pub query: Option<String>,
    /// Maximum number of results.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Effort profile: `fast`, `balanced`, `accurate`, or `high_recall`.
    #[serde(default)]
    pub mode: Option<String>,
    /// Explicit `ef_search` override; wins over `mode`.
    #[serde(default)]
    pub ef_search: Option<usize>,
    /// Payload filter in the condition JSON format.
    #[serde(default)]
    pub filter: Option<Value>,
    /// Per-query time budget in milliseconds.
    #[serde(default)]
    pub time_budget_ms: Option<u64>,
}

fn default_top_k() -> usize {
    10
}

/// Maps a request's `mode`/`ef_search` pair to a search effort.
#[must_use]
pub fn resolve_effort(mode: Option<&str>, ef_search: Option<usize>) -> Option<SearchEffort> {
    if let Some(ef) = ef_search {
        return Some(SearchEffort::Custom(ef));
    }
    match mode? {
        "fast" => Some(SearchEffort::Fast),
        "balanced" => Some(SearchEffort::Balanced),
        "accurate" => Some(SearchEffort::Accurate),
        "high_recall" => Some(SearchEffort::HighRecall),
        _ => None,
    }
}

/// One search hit.
#[derive(Debug, Serialize, ToSchema)]
pub struct SearchResultResponse {
    /// Record id.
    pub id: u64,
    /// Similarity score, higher is better.
    pub score: f32,
    /// Stored payload.
    pub payload: Option<Value>,
}

/// Response for `POST /search`.
#[derive(Debug, Serialize, ToSchema)]
pub struct SearchResponse {
    /// Ranked results.
    pub results: Vec<SearchResultResponse>,
    /// True when a time budget expired and the results are partial.
    pub degraded: bool,
}

/// A stored document, as returned by `GET /documents/{id}`.
#[derive(Debug, Serialize, ToSchema)]
pub struct DocumentResponse {
    /// Record id.
    pub id: u64,
    /// Stored vector.
    pub vector: Vec<f32>,
    /// Stored payload.
    pub payload: Option<Value>,
}

/// Health probe body.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Always `online` when the process answers.
    pub status: &'static str,
    /// Live record count.
    pub records: usize,
    /// Index lifecycle state: `active` or `rebuilding`.
    pub index_state: String,
}

/// Error body returned by every non-2xx response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Human-readable description.
    pub error: String,
}

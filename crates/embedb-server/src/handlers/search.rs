//! Similarity search handler.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use embedb_core::{Filter, QueryRequest};

use crate::types::{resolve_effort, ErrorResponse, SearchRequest, SearchResponse, SearchResultResponse};
use crate::AppState;

use super::helpers::{engine_error, internal_error};

/// Searches by vector or by text (embedded server-side).
#[utoipa::path(
    post,
    path = "/search",
    tag = "search",
    request_body = SearchRequest,
    responses(
        (status = 200, description = "Ranked results", body = SearchResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 503, description = "Embedding backend unavailable", body = ErrorResponse)
    )
)]
pub async fn search(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SearchRequest>,
) -> impl IntoResponse {
    // Parse the filter up front; serde is cheap and the error belongs to
    // the client.
    let filter: Option<Filter> = match &req.filter {
        Some(filter_json) => match serde_json::from_value(filter_json.clone()) {
            Ok(f) => Some(f),
            Err(e) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(ErrorResponse {
                        error: format!("invalid filter: {e}"),
                    }),
                )
                    .into_response();
            }
        },
        None => None,
    };

    let effort = resolve_effort(req.mode.as_deref(), req.ef_search);
    if req.mode.is_some() && req.ef_search.is_none() && effort.is_none() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: format!(
                    "invalid mode: {}. Valid: fast, balanced, accurate, high_recall",
                    req.mode.unwrap_or_default()
                ),
            }),
        )
            .into_response();
    }

    let mut request = QueryRequest::new(req.vector.clone().unwrap_or_default(), req.top_k);
    request.effort = effort;
    request.filter = filter;
    request.time_budget = req.time_budget_ms.map(Duration::from_millis);

    let outcome = match (req.vector, req.query) {
        (Some(_), None) => {
            tokio::task::spawn_blocking(move || state.engine.search(&request)).await
        }
        (None, Some(text)) => {
            tokio::task::spawn_blocking(move || state.engine.search_text(&text, request)).await
        }
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: "exactly one of `vector` and `query` must be set".to_string(),
                }),
            )
                .into_response();
        }
    };

    match outcome {
        Ok(Ok(outcome)) => Json(SearchResponse {
            results: outcome
                .results
                .into_iter()
                .map(|r| SearchResultResponse {
                    id: r.id,
                    score: r.score,
                    payload: r.payload,
                })
                .collect(),
            degraded: outcome.degraded,
        })
        .into_response(),
        Ok(Err(e)) => engine_error("search", &e).into_response(),
        Err(e) => internal_error("search", &e).into_response(),
    }
}

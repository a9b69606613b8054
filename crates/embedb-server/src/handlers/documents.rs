//! Document and vector write/read handlers.
//!
//! Engine calls are synchronous (they take locks and touch the WAL), so
//! every mutating handler hops onto the blocking pool.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use crate::types::{DocumentResponse, ErrorResponse, IndexDocumentRequest, UpsertVectorRequest};
use crate::AppState;

use super::helpers::{engine_error, internal_error};

/// Embeds text content server-side and indexes it.
#[utoipa::path(
    post,
    path = "/documents",
    tag = "documents",
    request_body = IndexDocumentRequest,
    responses(
        (status = 201, description = "Document indexed"),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 503, description = "Embedding backend unavailable", body = ErrorResponse)
    )
)]
pub async fn index_document(
    State(state): State<Arc<AppState>>,
    Json(req): Json<IndexDocumentRequest>,
) -> impl IntoResponse {
    let result = tokio::task::spawn_blocking(move || {
        state
            .engine
            .index_document(req.id, &req.content, req.payload)
    })
    .await;

    match result {
        Ok(Ok(())) => StatusCode::CREATED.into_response(),
        Ok(Err(e)) => engine_error("index document", &e).into_response(),
        Err(e) => internal_error("index document", &e).into_response(),
    }
}

/// Upserts a precomputed embedding vector.
#[utoipa::path(
    post,
    path = "/vectors",
    tag = "documents",
    request_body = UpsertVectorRequest,
    responses(
        (status = 201, description = "Vector stored"),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 507, description = "Index at capacity", body = ErrorResponse)
    )
)]
pub async fn upsert_vector(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UpsertVectorRequest>,
) -> impl IntoResponse {
    let result = tokio::task::spawn_blocking(move || {
        state.engine.upsert_vector(req.id, req.vector, req.payload)
    })
    .await;

    match result {
        Ok(Ok(())) => StatusCode::CREATED.into_response(),
        Ok(Err(e)) => engine_error("upsert vector", &e).into_response(),
        Err(e) => internal_error("upsert vector", &e).into_response(),
    }
}

/// Fetches a stored document by id.
#[utoipa::path(
    get,
    path = "/documents/{id}",
    tag = "documents",
    params(("id" = u64, Path, description = "Record id")),
    responses(
        (status = 200, description = "The stored record", body = DocumentResponse),
        (status = 404, description = "Unknown id", body = ErrorResponse)
    )
)]
pub async fn get_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> impl IntoResponse {
    match state.engine.get(id) {
        Some(point) => Json(DocumentResponse {
            id: point.id,
            vector: point.vector,
            payload: point.payload,
        })
        .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("record {id} not found"),
            }),
        )
            .into_response(),
    }
}

/// Deletes a document. The id is gone from search results immediately.
#[utoipa::path(
    delete,
    path = "/documents/{id}",
    tag = "documents",
    params(("id" = u64, Path, description = "Record id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Unknown id", body = ErrorResponse)
    )
)]
pub async fn delete_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<u64>,
) -> impl IntoResponse {
    let result = tokio::task::spawn_blocking(move || state.engine.delete_document(id)).await;

    match result {
        Ok(Ok(())) => StatusCode::NO_CONTENT.into_response(),
        Ok(Err(e)) => engine_error("delete document", &e).into_response(),
        Err(e) => internal_error("delete document", &e).into_response(),
    }
}

//! Administrative operations: rebuild, snapshot, stats.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use crate::types::ErrorResponse;
use crate::AppState;

use super::helpers::{engine_error, internal_error};

/// Rebuilds the index from live records and swaps it in atomically.
///
/// Queries keep serving from the previous generation until the swap.
#[utoipa::path(
    post,
    path = "/rebuild",
    tag = "admin",
    responses(
        (status = 200, description = "Rebuild completed"),
        (status = 409, description = "A rebuild is already running", body = ErrorResponse)
    )
)]
pub async fn rebuild_index(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let result = tokio::task::spawn_blocking(move || state.engine.rebuild_index()).await;

    match result {
        Ok(Ok(())) => StatusCode::OK.into_response(),
        Ok(Err(e)) => engine_error("rebuild", &e).into_response(),
        Err(e) => internal_error("rebuild", &e).into_response(),
    }
}

/// Forces a durable snapshot of the record store.
#[utoipa::path(
    post,
    path = "/snapshot",
    tag = "admin",
    responses(
        (status = 200, description = "Snapshot written")
    )
)]
pub async fn create_snapshot(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let result = tokio::task::spawn_blocking(move || state.engine.create_snapshot()).await;

    match result {
        Ok(Ok(())) => StatusCode::OK.into_response(),
        Ok(Err(e)) => engine_error("snapshot", &e).into_response(),
        Err(e) => internal_error("snapshot", &e).into_response(),
    }
}

/// Engine statistics and operation counters.
pub async fn stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.engine.stats())
}

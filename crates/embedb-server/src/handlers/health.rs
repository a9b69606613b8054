//! Health probe.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use embedb_core::IndexState;

use crate::types::HealthResponse;
use crate::AppState;

/// Liveness and readiness in one: the process answers and reports how much
/// state it is serving.
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let stats = state.engine.stats();
    Json(HealthResponse {
        status: "online",
        records: stats.records,
        index_state: match state.engine.index_state() {
            IndexState::Active => "active".to_string(),
            IndexState::Rebuilding => "rebuilding".to_string(),
        },
    })
}

//! REST API layer for the embedb engine.
//!
//! The facade stays thin: it translates HTTP requests into engine
//! operations and engine errors into status codes. All engine calls run on
//! the blocking pool; the async runtime only shuffles bytes.

pub mod embedder;
pub mod handlers;
pub mod types;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use embedb_core::{Engine, ServerConfig};

pub use embedder::RemoteEmbedder;
pub use handlers::{
    create_snapshot, delete_document, get_document, health_check, index_document, rebuild_index,
    search, stats, upsert_vector,
};

/// Shared state handed to every handler.
pub struct AppState {
    /// The engine, shared across workers.
    pub engine: Engine,
}

/// OpenAPI description of the REST surface.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health_check,
        handlers::documents::index_document,
        handlers::documents::upsert_vector,
        handlers::documents::get_document,
        handlers::documents::delete_document,
        handlers::search::search,
        handlers::admin::rebuild_index,
        handlers::admin::create_snapshot,
    ),
    components(schemas(
        types::IndexDocumentRequest,
        types::UpsertVectorRequest,
        types::SearchRequest,
        types::SearchResponse,
        types::SearchResultResponse,
        types::DocumentResponse,
        types::HealthResponse,
        types::ErrorResponse,
    ))
)]
pub struct ApiDoc;

/// Builds the CORS layer from configuration.
///
/// With no configured origins the layer is permissive, which is fine for
/// development and should be restricted in production.
fn build_cors_layer(config: &ServerConfig) -> CorsLayer {
    match &config.cors_origin {
        Some(origins) => {
            use tower_http::cors::AllowOrigin;
            let origin_list: Vec<_> = origins
                .split(',')
                .filter_map(|o| o.trim().parse().ok())
                .collect();
            tracing::info!("CORS: restricted to {} origin(s)", origin_list.len());
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origin_list))
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any)
        }
        None => {
            tracing::warn!("CORS: permissive (dev mode). Set server.cors_origin to restrict.");
            CorsLayer::permissive()
        }
    }
}

/// Assembles the full router: routes, body limit, CORS, request tracing.
pub fn build_router(state: Arc<AppState>, config: &ServerConfig) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/documents", post(index_document))
        .route(
            "/documents/{id}",
            get(get_document).delete(delete_document),
        )
        .route("/vectors", post(upsert_vector))
        .route("/search", post(search))
        .route("/rebuild", post(rebuild_index))
        .route("/snapshot", post(create_snapshot))
        .route("/stats", get(stats))
        .route(
            "/api-docs/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        )
        .layer(DefaultBodyLimit::max(config.body_limit_bytes))
        .layer(build_cors_layer(config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

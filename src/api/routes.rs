use axum::{routing::get, Json, Router};
use utoipa::OpenApi;

use super::handlers::*;
use super::openapi::ApiDoc;

/// Create the stats API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        // Short alias for the per-symbol lookup
        .route("/stats/:symbol", get(get_symbol_stats))
        .route("/api/v1/stats", get(get_all_stats))
        .route("/api/v1/stats/:symbol", get(get_symbol_stats))
        .route("/api/v1/symbols", get(list_symbols))
        .route("/api/v1/dispatch/stats", get(get_dispatch_stats))
        .route("/api/v1/queue/stats", get(get_queue_stats))
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .with_state(state)
}

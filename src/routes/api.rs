use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::api;
use crate::state::AppState;
use std::sync::Arc;

/// Create the operational API router
///
/// These routes are public and read-only.
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(api::health_check))
        .route("/status", get(api::status))
        .route("/debug", get(api::debug_connections))
        .layer(TraceLayer::new_for_http())
}

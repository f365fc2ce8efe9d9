//! Axum HTTP surface (§6), built the same way the teacher's gateway
//! assembles its router: `Router::new().route(...).layer(...).with_state(...)`.

pub mod handlers;
pub mod state;

pub use state::AppState;

use axum::routing::{get, post};
use axum::Router;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

const REQUEST_TIMEOUT_SECS: u64 = 30;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/cache", get(handlers::cache_handler))
        .route("/health", get(handlers::health_handler))
        .route("/metrics", get(handlers::metrics_handler))
        .route("/debug", get(handlers::debug_handler))
        .route("/cluster/add", post(handlers::cluster_add_handler))
        .route("/cluster/remove", post(handlers::cluster_remove_handler))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(REQUEST_TIMEOUT_SECS)))
        .with_state(state)
}

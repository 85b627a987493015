use axum::{
    middleware::from_fn,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::{channels, handlers, middleware};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // API routes
    let api_routes = Router::new()
        // Health, config and status
        .route("/health", get(handlers::health))
        .route("/health/checks", get(handlers::health_checks))
        .route("/config", get(handlers::get_config))
        .route("/status", get(handlers::get_status))
        // Channels
        .route(
            "/channels",
            get(channels::list_channels).post(channels::add_channel),
        )
        .route(
            "/channels/{id}",
            get(channels::get_channel).delete(channels::remove_channel),
        )
        .route("/channels/{id}/check", post(channels::check_channel))
        .route("/channels/{id}/interval", put(channels::set_interval))
        .route("/channels/{id}/reset", post(channels::reset_history));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::metrics))
        .with_state(state)
        .layer(from_fn(middleware::metrics_middleware))
        .layer(TraceLayer::new_for_http())
}

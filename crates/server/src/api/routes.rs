use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::{downloads, handlers, middleware::metrics_middleware};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        // Health, config and metrics
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route("/metrics", get(handlers::metrics))
        // Downloads
        .route(
            "/downloads",
            post(downloads::submit_download).get(downloads::list_downloads),
        )
        .route(
            "/downloads/{torrent_ref}",
            get(downloads::get_download).delete(downloads::cancel_download),
        )
        .route(
            "/downloads/{torrent_ref}/clear",
            post(downloads::clear_download),
        )
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
}

//! API routes

use axum::{middleware, routing::get, Router};
use tower_http::trace::TraceLayer;

use super::handlers::{self, AppState};
use super::{middleware::monitor_http, views};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let monitoring_path = state.monitoring_path.to_string();

    Router::new()
        // Health
        .route("/health", get(handlers::health))

        // Monitoring reports
        .route(&monitoring_path, get(handlers::monitoring))
        .route(&format!("{monitoring_path}/counters"), get(handlers::list_counters))

        // Monitored views
        .route("/views/*page", get(views::render_view))

        .layer(middleware::from_fn_with_state(state.clone(), monitor_http))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

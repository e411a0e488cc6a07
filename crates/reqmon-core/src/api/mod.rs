//! HTTP API
//!
//! Serves the monitoring reports and a few monitored pages, with every
//! request recorded into the session counters.

pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod views;

pub use handlers::AppState;
pub use routes::create_router;

use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use crate::collector::MonitoringRegistry;
use crate::error::Result;

/// HTTP API server
pub struct HttpServer {
    state: AppState,
}

impl HttpServer {
    /// Create a new HTTP server over a monitoring session
    pub fn new(registry: Arc<MonitoringRegistry>, monitoring_path: &str) -> Self {
        Self {
            state: AppState::new(registry, monitoring_path),
        }
    }

    /// Start the HTTP server
    pub async fn serve(self, addr: &str) -> Result<()> {
        let app = create_router(self.state);

        let listener = TcpListener::bind(addr).await?;

        info!("HTTP server listening on {}", addr);

        axum::serve(listener, app).await?;

        Ok(())
    }
}

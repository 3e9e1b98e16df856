//! Server lifecycle management
//!
//! Builds the HTTP router over the shared services and runs it until
//! shutdown is requested.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use huddle_api::AppState;
use huddle_core::{bootstrap::Services, Config};
use huddle_sfu::SfuService;

/// Huddle server - owns the HTTP listener and the shared services
pub struct HuddleServer {
    config: Config,
    services: Services,
    sfu: Arc<SfuService>,
}

impl HuddleServer {
    #[must_use]
    pub const fn new(config: Config, services: Services, sfu: Arc<SfuService>) -> Self {
        Self {
            config,
            services,
            sfu,
        }
    }

    /// Run the HTTP server until ctrl-c
    pub async fn start(self) -> Result<()> {
        let state = AppState {
            user_service: self.services.user_service,
            meeting_service: self.services.meeting_service,
            jwt_service: self.services.jwt_service,
            sfu: self.sfu,
        };

        let app = huddle_api::router(
            state,
            Duration::from_secs(self.config.server.request_timeout_seconds),
        );

        let addr = self.config.http_address();
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        info!("HTTP server listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutdown signal received");
}

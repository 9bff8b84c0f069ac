//! Server setup and lifecycle management

use crate::api::create_router;
use crate::api::rest::state::AppState;
use crate::catalog::Catalog;
use crate::config::ServiceConfig;
use crate::error::{ServiceError, ServiceResult};
use review_engine::ReviewOrchestrator;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Review service
pub struct Server {
    config: ServiceConfig,
    engine: Arc<ReviewOrchestrator>,
}

impl Server {
    /// Load the bootstrap catalog and build the engine
    pub async fn new(config: ServiceConfig) -> ServiceResult<Self> {
        let catalog = match &config.catalog.path {
            Some(path) => Catalog::from_file(path)?,
            None => {
                tracing::warn!("No catalog configured; starting with an empty engine");
                Catalog::default()
            }
        };
        let engine = catalog.build(config.engine.clone()).await?;

        Ok(Self {
            config,
            engine: Arc::new(engine),
        })
    }

    pub fn engine(&self) -> Arc<ReviewOrchestrator> {
        self.engine.clone()
    }

    /// Run the server
    pub async fn run(self) -> ServiceResult<()> {
        let addr = self.config.server.listen_addr;
        let app = create_router(AppState::new(self.engine.clone()), self.config.server.enable_cors);

        let listener = TcpListener::bind(addr).await?;
        tracing::info!(%addr, "reviewd listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| ServiceError::Server(e.to_string()))?;

        tracing::info!("reviewd shutting down");
        Ok(())
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}

//! Server setup and lifecycle management

use crate::api::build_router;
use crate::config::ServiceConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::state::ServiceState;
use tokio::net::TcpListener;

/// dualsign HTTP server
pub struct Server {
    config: ServiceConfig,
    state: ServiceState,
}

impl Server {
    /// Connect storage and wire collaborators.
    pub async fn new(config: ServiceConfig) -> ServiceResult<Self> {
        let state = ServiceState::bootstrap(&config).await?;
        Ok(Self { config, state })
    }

    /// Serve until ctrl-c or SIGTERM.
    pub async fn run(self) -> ServiceResult<()> {
        let addr = self.config.server.listen_addr;
        let app = build_router(self.state, &self.config.server);
        let listener = TcpListener::bind(addr).await?;

        tracing::info!(
            %addr,
            storage = self.config.storage.label(),
            "dualsign daemon listening"
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| ServiceError::Server(e.to_string()))?;

        tracing::info!("dualsign daemon shutting down");
        Ok(())
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
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

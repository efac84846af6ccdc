//! API Server

use super::{
    handlers::AppState,
    middleware::{create_cors_layer, request_id_middleware},
    routes::create_router,
};
use crate::config::ApiConfig;
use crate::errors::{ConfigurationError, KenoError};
use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{error, info};

pub struct ApiServer {
    config: ApiConfig,
    state: Arc<AppState>,
}

impl ApiServer {
    pub fn new(config: ApiConfig, state: Arc<AppState>) -> Self {
        Self { config, state }
    }

    /// Router with the full middleware stack
    pub fn create_app(&self) -> axum::Router {
        create_router(self.state.clone())
            // Request ID first so every later layer and handler sees it
            .layer(axum::middleware::from_fn(request_id_middleware))
            .layer(create_cors_layer(self.config.allowed_origins.clone()))
            .layer(TimeoutLayer::new(Duration::from_secs(self.config.request_timeout_secs)))
            .layer(TraceLayer::new_for_http())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, KenoError> {
        let ip = self.config.host.parse::<std::net::IpAddr>().map_err(|e| {
            ConfigurationError::InvalidValue {
                field: "api.host".to_string(),
                value: self.config.host.clone(),
                reason: e.to_string(),
            }
        })?;
        Ok(SocketAddr::from((ip, self.config.port)))
    }

    /// Serve until `shutdown` resolves.
    pub async fn run<F>(self, shutdown: F) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.socket_addr()?;
        let app = self.create_app();
        let listener = tokio::net::TcpListener::bind(addr).await?;

        info!(%addr, origins = ?self.config.allowed_origins, timeout_secs = self.config.request_timeout_secs, "API server listening");
        info!("   GET  /health  /round  /history  /stats  /metrics");
        info!("   POST /bets  /accounts/:user_id/deposit");
        info!("   GET  /accounts/:user_id  /settlement/unsettled  /ws");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("API server stopped gracefully");
        Ok(())
    }
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C signal"),
        _ = terminate => info!("Received terminate signal"),
    }
}

//! Application state and the relay HTTP/WebSocket server
//!
//! This module wires the configuration, lobby registry and metrics into an
//! axum router and runs it with graceful shutdown.

use crate::config::AppConfig;
use crate::lobby::LobbyRegistry;
use crate::metrics::MetricsCollector;
use crate::server::{health, ws};
use crate::session::SessionConfig;
use crate::utils::current_timestamp;
use anyhow::{Context, Result};
use axum::{routing::get, Router};
use chrono::{DateTime, Utc};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, RwLock};
use tracing::{info, warn};

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },
}

/// Shared state handed to every request and session
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    config: Arc<AppConfig>,

    /// The one lobby registry for this process
    registry: LobbyRegistry,

    /// Metrics collector shared with the registry
    metrics_collector: Arc<MetricsCollector>,

    started_at: DateTime<Utc>,

    /// Service status
    is_running: Arc<RwLock<bool>>,
}

impl AppState {
    /// Build the registry and metrics for `config`
    pub fn new(config: AppConfig) -> Result<Self, ServiceError> {
        crate::config::validate_config(&config).map_err(|e| ServiceError::Configuration {
            message: e.to_string(),
        })?;

        let metrics_collector =
            Arc::new(
                MetricsCollector::new().map_err(|e| ServiceError::Initialization {
                    message: format!("Failed to create metrics collector: {}", e),
                })?,
            );
        let registry =
            LobbyRegistry::with_metrics(config.relay.max_lobbies, metrics_collector.clone());

        info!(
            "Initialized relay state - service: {}, max lobbies: {:?}",
            config.service.name, config.relay.max_lobbies
        );

        Ok(Self {
            config: Arc::new(config),
            registry,
            metrics_collector,
            started_at: current_timestamp(),
            is_running: Arc::new(RwLock::new(false)),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn registry(&self) -> &LobbyRegistry {
        &self.registry
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.metrics_collector.clone()
    }

    /// Timeouts each new session runs with
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::from(&self.config.relay)
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Check if service is running
    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    pub async fn set_running(&self, running: bool) {
        *self.is_running.write().await = running;
    }
}

/// Build the router serving WebSocket sessions and monitoring endpoints
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(ws::ws_handler))
        .route("/ws", get(ws::ws_handler))
        .route("/health", get(health::health_handler))
        .route("/ready", get(health::ready_handler))
        .route("/alive", get(health::alive_handler))
        .route("/metrics", get(health::metrics_handler))
        .route("/stats", get(health::stats_handler))
        .with_state(state)
}

/// Relay server with a shutdown trigger
pub struct RelayServer {
    state: AppState,
    shutdown_tx: broadcast::Sender<()>,
}

impl RelayServer {
    pub fn new(state: AppState) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self { state, shutdown_tx }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Bind the configured address
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr: SocketAddr = self
            .state
            .config()
            .bind_address()
            .parse()
            .context("Invalid relay server address")?;
        TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))
    }

    /// Serve on `listener` until [`RelayServer::stop`] is called
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let addr = listener.local_addr()?;
        let app = router(self.state.clone());
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        self.state.set_running(true).await;
        info!("Relay listening on ws://{}", addr);

        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("Relay server shutdown signal received");
            })
            .await;

        self.state.set_running(false).await;
        info!("Relay server stopped");
        result.context("Relay server failed")
    }

    /// Ask a running [`RelayServer::serve`] to stop accepting connections
    pub fn stop(&self) {
        info!("Stopping relay server...");
        if let Err(e) = self.shutdown_tx.send(()) {
            warn!("Failed to send shutdown signal to relay server: {}", e);
        }
    }
}

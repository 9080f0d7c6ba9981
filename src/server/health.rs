//! Health check endpoints and Prometheus metrics
//!
//! Monitoring endpoints served next to the WebSocket route. None of them
//! reveal passphrases; lobbies only appear as counts.

use crate::lobby::RegistryStats;
use crate::server::app::AppState;
use crate::utils::current_timestamp;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error};

/// Health check status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheck {
    /// Overall service status
    pub status: HealthStatus,
    /// Service name
    pub service: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub uptime_seconds: i64,
    /// Registry statistics, absent if the registry could not be read
    pub stats: Option<RegistryStats>,
}

impl HealthCheck {
    /// Gather service status and registry statistics
    pub async fn check(state: &AppState) -> Self {
        let running = state.is_running().await;
        let stats = match state.registry().stats() {
            Ok(stats) => {
                state.metrics().update_from_registry_stats(&stats);
                Some(stats)
            }
            Err(e) => {
                error!("Lobby registry stats check failed: {}", e);
                None
            }
        };

        let status = match (running, stats.is_some()) {
            (true, true) => HealthStatus::Healthy,
            (true, false) => HealthStatus::Degraded,
            (false, _) => HealthStatus::Unhealthy,
        };

        let now = current_timestamp();
        HealthCheck {
            status,
            service: state.config().service.name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: now,
            uptime_seconds: (now - state.started_at()).num_seconds(),
            stats,
        }
    }
}

/// Lightweight health check endpoint handler
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    debug!("Health check requested");

    let health = HealthCheck::check(&state).await;
    let code = match health.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (
        code,
        Json(json!({
            "status": health.status,
            "service": health.service,
            "version": health.version
        })),
    )
}

/// Readiness check endpoint handler
pub async fn ready_handler(State(state): State<AppState>) -> impl IntoResponse {
    debug!("Readiness check requested");

    match HealthCheck::check(&state).await.status {
        HealthStatus::Healthy => (StatusCode::OK, "Ready"),
        HealthStatus::Degraded => (StatusCode::OK, "Degraded but ready"),
        HealthStatus::Unhealthy => (StatusCode::SERVICE_UNAVAILABLE, "Not ready"),
    }
}

/// Liveness check endpoint handler
pub async fn alive_handler(State(state): State<AppState>) -> impl IntoResponse {
    debug!("Liveness check requested");

    if state.is_running().await {
        (StatusCode::OK, "Alive")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "Not alive")
    }
}

/// Prometheus metrics endpoint handler
pub async fn metrics_handler(State(state): State<AppState>) -> Response {
    debug!("Metrics endpoint requested");

    if let Ok(stats) = state.registry().stats() {
        state.metrics().update_from_registry_stats(&stats);
    }

    let metric_families = state.metrics().registry().gather();
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, encoder.format_type().to_string())],
            buffer,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to encode metrics",
            )
                .into_response()
        }
    }
}

/// Registry statistics for debugging and dashboards
pub async fn stats_handler(State(state): State<AppState>) -> impl IntoResponse {
    debug!("Stats endpoint requested");

    let health = HealthCheck::check(&state).await;
    match health.stats {
        Some(stats) => (
            StatusCode::OK,
            Json(json!({
                "service": {
                    "name": health.service,
                    "version": health.version,
                    "status": health.status,
                    "uptime_seconds": health.uptime_seconds
                },
                "lobbies": {
                    "active": stats.active_lobbies,
                    "created": stats.lobbies_created,
                    "removed": stats.lobbies_removed
                },
                "connections": {
                    "joined": stats.joined_connections,
                    "joins_accepted": stats.joins_accepted,
                    "joins_rejected": stats.joins_rejected
                },
                "timestamp": health.timestamp
            })),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "service": {
                    "name": health.service,
                    "version": health.version,
                    "status": "error"
                },
                "error": "Failed to read lobby registry",
                "timestamp": health.timestamp
            })),
        ),
    }
}

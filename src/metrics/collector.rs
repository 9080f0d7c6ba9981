//! Metrics collection using Prometheus
//!
//! This module provides metrics collection for the relay service using
//! Prometheus metrics. Each collector owns its own registry so tests can
//! run isolated instances side by side.

use crate::lobby::registry::RegistryStats;
use anyhow::Result;
use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::Arc;

/// Main metrics collector for the relay service
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Connection-level metrics
    connection_metrics: ConnectionMetrics,

    /// Lobby-related metrics
    lobby_metrics: LobbyMetrics,

    /// Relay traffic metrics
    relay_metrics: RelayMetrics,
}

/// Connection-level metrics
#[derive(Clone)]
pub struct ConnectionMetrics {
    /// Currently open WebSocket connections
    pub active_connections: IntGauge,

    /// Total connections accepted
    pub connections_total: IntCounter,

    /// Sessions that ended, by the state they ended in
    pub sessions_ended_total: IntCounterVec,
}

/// Lobby-related metrics
#[derive(Clone)]
pub struct LobbyMetrics {
    /// Number of lobbies currently in the registry
    pub active_lobbies: IntGauge,

    /// Total lobbies created
    pub lobbies_created_total: IntCounter,

    /// Join attempts by outcome
    pub joins_total: IntCounterVec,

    /// Lobbies that reached two members
    pub lobbies_ready_total: IntCounter,
}

/// Relay traffic metrics
#[derive(Clone)]
pub struct RelayMetrics {
    /// Messages forwarded to a peer
    pub messages_relayed_total: IntCounter,

    /// Bytes forwarded to a peer
    pub bytes_relayed_total: IntCounter,

    /// Sends to a peer that failed
    pub send_failures_total: IntCounterVec,

    /// `opponentDisconnected` notifications queued
    pub disconnect_notifications_total: IntCounter,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let connection_metrics = ConnectionMetrics::new(&registry)?;
        let lobby_metrics = LobbyMetrics::new(&registry)?;
        let relay_metrics = RelayMetrics::new(&registry)?;

        Ok(Self {
            registry,
            connection_metrics,
            lobby_metrics,
            relay_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn connection(&self) -> &ConnectionMetrics {
        &self.connection_metrics
    }

    pub fn lobby(&self) -> &LobbyMetrics {
        &self.lobby_metrics
    }

    pub fn relay(&self) -> &RelayMetrics {
        &self.relay_metrics
    }

    /// Bring gauges in line with a registry snapshot
    pub fn update_from_registry_stats(&self, stats: &RegistryStats) {
        self.lobby_metrics
            .active_lobbies
            .set(stats.active_lobbies as i64);
    }

    pub fn record_connection_opened(&self) {
        self.connection_metrics.connections_total.inc();
        self.connection_metrics.active_connections.inc();
    }

    pub fn record_connection_closed(&self) {
        self.connection_metrics.active_connections.dec();
    }

    /// Record a finished session, labelled by the state it was in
    pub fn record_session_ended(&self, state: &str) {
        self.connection_metrics
            .sessions_ended_total
            .with_label_values(&[state])
            .inc();
    }

    pub fn record_lobby_created(&self) {
        self.lobby_metrics.lobbies_created_total.inc();
    }

    pub fn set_active_lobbies(&self, count: usize) {
        self.lobby_metrics.active_lobbies.set(count as i64);
    }

    /// Record a join attempt by outcome label
    pub fn record_join(&self, outcome: &str) {
        self.lobby_metrics
            .joins_total
            .with_label_values(&[outcome])
            .inc();
    }

    pub fn record_lobby_ready(&self) {
        self.lobby_metrics.lobbies_ready_total.inc();
    }

    pub fn record_relayed(&self, bytes: usize) {
        self.relay_metrics.messages_relayed_total.inc();
        self.relay_metrics.bytes_relayed_total.inc_by(bytes as u64);
    }

    /// Record a failed send; `context` is `relay`, `ready` or `cleanup`
    pub fn record_send_failure(&self, context: &str) {
        self.relay_metrics
            .send_failures_total
            .with_label_values(&[context])
            .inc();
    }

    pub fn record_disconnect_notification(&self) {
        self.relay_metrics.disconnect_notifications_total.inc();
    }
}

impl ConnectionMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let active_connections = IntGauge::new(
            "tank_relay_active_connections",
            "Currently open WebSocket connections",
        )?;
        registry.register(Box::new(active_connections.clone()))?;

        let connections_total = IntCounter::new(
            "tank_relay_connections_total",
            "Total WebSocket connections accepted",
        )?;
        registry.register(Box::new(connections_total.clone()))?;

        let sessions_ended_total = IntCounterVec::new(
            Opts::new(
                "tank_relay_sessions_ended_total",
                "Sessions that ended, by final state before termination",
            ),
            &["state"],
        )?;
        registry.register(Box::new(sessions_ended_total.clone()))?;

        Ok(Self {
            active_connections,
            connections_total,
            sessions_ended_total,
        })
    }
}

impl LobbyMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let active_lobbies =
            IntGauge::new("tank_relay_active_lobbies", "Number of active lobbies")?;
        registry.register(Box::new(active_lobbies.clone()))?;

        let lobbies_created_total =
            IntCounter::new("tank_relay_lobbies_created_total", "Total lobbies created")?;
        registry.register(Box::new(lobbies_created_total.clone()))?;

        let joins_total = IntCounterVec::new(
            Opts::new("tank_relay_joins_total", "Join attempts by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(joins_total.clone()))?;

        let lobbies_ready_total = IntCounter::new(
            "tank_relay_lobbies_ready_total",
            "Lobbies that reached two members",
        )?;
        registry.register(Box::new(lobbies_ready_total.clone()))?;

        Ok(Self {
            active_lobbies,
            lobbies_created_total,
            joins_total,
            lobbies_ready_total,
        })
    }
}

impl RelayMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let messages_relayed_total = IntCounter::new(
            "tank_relay_messages_relayed_total",
            "Messages forwarded to a lobby peer",
        )?;
        registry.register(Box::new(messages_relayed_total.clone()))?;

        let bytes_relayed_total = IntCounter::new(
            "tank_relay_bytes_relayed_total",
            "Payload bytes forwarded to a lobby peer",
        )?;
        registry.register(Box::new(bytes_relayed_total.clone()))?;

        let send_failures_total = IntCounterVec::new(
            Opts::new(
                "tank_relay_send_failures_total",
                "Sends to a peer that could not be queued",
            ),
            &["context"],
        )?;
        registry.register(Box::new(send_failures_total.clone()))?;

        let disconnect_notifications_total = IntCounter::new(
            "tank_relay_disconnect_notifications_total",
            "opponentDisconnected notifications sent",
        )?;
        registry.register(Box::new(disconnect_notifications_total.clone()))?;

        Ok(Self {
            messages_relayed_total,
            bytes_relayed_total,
            send_failures_total,
            disconnect_notifications_total,
        })
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        // Metric names are static and unique, so registering them in a fresh
        // registry cannot collide.
        Self::new().expect("Failed to create default metrics collector")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::{Encoder, TextEncoder};

    #[test]
    fn test_metrics_collector_creation() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");

        let _connection = collector.connection();
        let _lobby = collector.lobby();
        let _relay = collector.relay();
    }

    #[test]
    fn test_independent_registries() {
        let first = MetricsCollector::new().unwrap();
        let second = MetricsCollector::new().unwrap();

        first.record_lobby_created();
        assert_eq!(first.lobby().lobbies_created_total.get(), 1);
        assert_eq!(second.lobby().lobbies_created_total.get(), 0);
    }

    #[test]
    fn test_connection_gauge() {
        let collector = MetricsCollector::new().unwrap();
        collector.record_connection_opened();
        collector.record_connection_opened();
        collector.record_connection_closed();

        assert_eq!(collector.connection().active_connections.get(), 1);
        assert_eq!(collector.connection().connections_total.get(), 2);
    }

    #[test]
    fn test_relay_recording() {
        let collector = MetricsCollector::new().unwrap();
        collector.record_relayed(10);
        collector.record_relayed(5);
        collector.record_send_failure("relay");

        assert_eq!(collector.relay().messages_relayed_total.get(), 2);
        assert_eq!(collector.relay().bytes_relayed_total.get(), 15);
        assert_eq!(
            collector
                .relay()
                .send_failures_total
                .with_label_values(&["relay"])
                .get(),
            1
        );
    }

    #[test]
    fn test_update_from_registry_stats() {
        let collector = MetricsCollector::new().unwrap();
        let stats = RegistryStats {
            active_lobbies: 3,
            ..RegistryStats::default()
        };
        collector.update_from_registry_stats(&stats);
        assert_eq!(collector.lobby().active_lobbies.get(), 3);
    }

    #[test]
    fn test_text_encoding() {
        let collector = MetricsCollector::new().unwrap();
        collector.record_join("joined");

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&collector.registry().gather(), &mut buffer)
            .unwrap();
        let output = String::from_utf8(buffer).unwrap();
        assert!(output.contains("tank_relay_joins_total"));
    }
}

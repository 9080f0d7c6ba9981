//! Metrics and monitoring for the relay service
//!
//! Prometheus counters and gauges for connections, lobbies and relayed
//! traffic. The HTTP surface that exposes them lives in [`crate::server`].

pub mod collector;

pub use collector::{ConnectionMetrics, LobbyMetrics, MetricsCollector, RelayMetrics};

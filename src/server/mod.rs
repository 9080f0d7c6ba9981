//! HTTP and WebSocket surface of the relay service
//!
//! This module hosts the application state, the WebSocket transport
//! adapter, and the health and metrics endpoints.

pub mod app;
pub mod health;
pub mod ws;

pub use app::{router, AppState, RelayServer, ServiceError};
pub use health::{HealthCheck, HealthStatus};

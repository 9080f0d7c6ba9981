//! Main application configuration
//!
//! This module defines the configuration structures for the relay service,
//! including environment variable and TOML file loading and validation.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceSettings,
    pub relay: RelaySettings,
}

/// Service-level settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name for logging and health output
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Interface to bind
    pub host: String,
    /// Port serving WebSocket and HTTP endpoints
    pub port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
}

/// Pairing and relay settings
///
/// The timeouts and the lobby limit are off unless configured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySettings {
    /// Close a connection that has not sent its join request in time
    pub join_timeout_seconds: Option<u64>,
    /// Close a joined connection that has been silent this long
    pub idle_timeout_seconds: Option<u64>,
    /// Maximum number of lobbies that may exist at once
    pub max_lobbies: Option<usize>,
    /// Frames queued per connection before senders wait
    pub outbound_queue_capacity: usize,
    /// Largest WebSocket message accepted from a client
    pub max_message_bytes: usize,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "tank-relay".to_string(),
            log_level: "info".to_string(),
            host: "0.0.0.0".to_string(),
            port: 8765,
            shutdown_timeout_seconds: 10,
        }
    }
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            join_timeout_seconds: None,
            idle_timeout_seconds: None,
            max_lobbies: None,
            outbound_queue_capacity: 64,
            max_message_bytes: 1024 * 1024,
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| anyhow!("Invalid {} value: {}", name, value))
}

impl AppConfig {
    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a TOML file; environment variables still override it
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config = Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.apply_env()?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Parse a TOML document; missing fields take their defaults
    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    fn apply_env(&mut self) -> Result<()> {
        // Service settings
        if let Ok(name) = env::var("SERVICE_NAME") {
            self.service.name = name;
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            self.service.log_level = log_level;
        }
        if let Ok(host) = env::var("RELAY_HOST") {
            self.service.host = host;
        }
        if let Ok(port) = env::var("RELAY_PORT") {
            self.service.port = parse_var("RELAY_PORT", &port)?;
        }
        if let Ok(timeout) = env::var("SHUTDOWN_TIMEOUT_SECONDS") {
            self.service.shutdown_timeout_seconds =
                parse_var("SHUTDOWN_TIMEOUT_SECONDS", &timeout)?;
        }

        // Relay settings
        if let Ok(timeout) = env::var("JOIN_TIMEOUT_SECONDS") {
            self.relay.join_timeout_seconds = Some(parse_var("JOIN_TIMEOUT_SECONDS", &timeout)?);
        }
        if let Ok(timeout) = env::var("IDLE_TIMEOUT_SECONDS") {
            self.relay.idle_timeout_seconds = Some(parse_var("IDLE_TIMEOUT_SECONDS", &timeout)?);
        }
        if let Ok(max) = env::var("MAX_LOBBIES") {
            self.relay.max_lobbies = Some(parse_var("MAX_LOBBIES", &max)?);
        }
        if let Ok(capacity) = env::var("OUTBOUND_QUEUE_CAPACITY") {
            self.relay.outbound_queue_capacity = parse_var("OUTBOUND_QUEUE_CAPACITY", &capacity)?;
        }
        if let Ok(size) = env::var("MAX_MESSAGE_BYTES") {
            self.relay.max_message_bytes = parse_var("MAX_MESSAGE_BYTES", &size)?;
        }

        Ok(())
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.service.shutdown_timeout_seconds)
    }

    /// Socket address string to bind
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.service.host, self.service.port)
    }
}

impl RelaySettings {
    pub fn join_timeout(&self) -> Option<Duration> {
        self.join_timeout_seconds.map(Duration::from_secs)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_seconds.map(Duration::from_secs)
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    // Validate log level
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.service.log_level)),
    }

    if config.service.host.is_empty() {
        return Err(anyhow!("Host cannot be empty"));
    }
    if config.service.port == 0 {
        return Err(anyhow!("Port cannot be 0"));
    }
    if config.service.shutdown_timeout_seconds == 0 {
        return Err(anyhow!("Shutdown timeout must be greater than 0"));
    }

    if config.relay.join_timeout_seconds == Some(0) {
        return Err(anyhow!("Join timeout must be greater than 0 when set"));
    }
    if config.relay.idle_timeout_seconds == Some(0) {
        return Err(anyhow!("Idle timeout must be greater than 0 when set"));
    }
    if config.relay.max_lobbies == Some(0) {
        return Err(anyhow!("Max lobbies must be greater than 0 when set"));
    }
    if config.relay.outbound_queue_capacity == 0 {
        return Err(anyhow!("Outbound queue capacity must be greater than 0"));
    }
    if config.relay.max_message_bytes == 0 {
        return Err(anyhow!("Max message size must be greater than 0"));
    }

    Ok(())
}

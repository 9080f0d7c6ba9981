//! Tank Relay - passphrase rendezvous and message relay for two-player matches
//!
//! This crate pairs exactly two WebSocket clients that share a `verb-noun`
//! passphrase and then forwards every message between them verbatim until
//! one side disconnects.

pub mod config;
pub mod error;
pub mod lobby;
pub mod metrics;
pub mod passphrase;
pub mod server;
pub mod session;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use error::{RelayError, Result, TransportError};
pub use types::*;

// Re-export key components
pub use lobby::{JoinOutcome, LobbyRegistry};
pub use passphrase::Passphrase;
pub use session::{PeerHandle, SessionConfig, SessionEnd, SessionHandler};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

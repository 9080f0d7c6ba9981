//! Lobby management for the relay service
//!
//! A lobby pairs at most two connections under one passphrase. The registry
//! owns every lobby and enforces creation on first join and deletion once
//! the last member leaves.

pub mod instance;
pub mod registry;

// Re-export commonly used types
pub use instance::Lobby;
pub use registry::{JoinOutcome, LobbyRegistry, RegistryStats};

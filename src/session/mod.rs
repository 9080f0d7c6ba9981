//! Per-connection session handling
//!
//! One [`SessionHandler`] runs per accepted connection: join handshake,
//! relay loop and cleanup. [`PeerHandle`] is the write side other sessions
//! use to reach it.

pub mod handler;
pub mod handshake;
pub mod peer;

// Re-export commonly used types
pub use handler::{SessionConfig, SessionEnd, SessionHandler, SessionState};
pub use handshake::parse_join_request;
pub use peer::PeerHandle;

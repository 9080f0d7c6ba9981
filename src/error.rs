//! Error types for the relay service
//!
//! Protocol-level failures use the typed [`RelayError`]; service plumbing
//! (configuration, startup, CLI) uses anyhow for consistent error handling.

/// Result type alias for service plumbing
pub type Result<T> = anyhow::Result<T>;

/// Errors produced while pairing and relaying a connection
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    /// First message was not a well-formed join request
    #[error("Malformed message: {reason}")]
    MalformedMessage { reason: String },

    /// Passphrase missing or not of the `verb-noun` shape
    #[error("Invalid passphrase: {reason}")]
    InvalidPassphrase { reason: String },

    /// Target lobby already has two members
    #[error("Lobby is full: {lobby}")]
    LobbyFull { lobby: String },

    /// Creating another lobby would exceed the configured limit
    #[error("Lobby limit reached: {limit}")]
    LobbyLimitReached { limit: usize },

    /// Connection ended; not an application error
    #[error("Transport closed")]
    TransportClosed,

    /// A best-effort message could not be delivered
    #[error("Send failure: {reason}")]
    SendFailure { reason: String },

    #[error("Internal relay error: {message}")]
    InternalError { message: String },
}

/// Failure reported by the transport while reading a connection
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Transport error: {message}")]
pub struct TransportError {
    pub message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Wire strings sent to clients in `error` messages.
pub const FIRST_MESSAGE_MUST_BE_JOIN: &str = "First message must be join";
pub const MALFORMED_JOIN_REQUEST: &str = "Malformed join request";
pub const PASSPHRASE_REQUIRED: &str = "Passphrase required";
pub const INVALID_PASSPHRASE_FORMAT: &str = "Invalid passphrase format. Use: verb-noun";
pub const LOBBY_IS_FULL: &str = "Lobby is full";
pub const SERVER_AT_CAPACITY: &str = "Server is at capacity";

impl RelayError {
    /// The message reported to the offending client, if this error is
    /// reportable at all.
    pub fn client_message(&self) -> Option<String> {
        match self {
            RelayError::MalformedMessage { reason } | RelayError::InvalidPassphrase { reason } => {
                Some(reason.clone())
            }
            RelayError::LobbyFull { .. } => Some(LOBBY_IS_FULL.to_string()),
            RelayError::LobbyLimitReached { .. } => Some(SERVER_AT_CAPACITY.to_string()),
            RelayError::TransportClosed
            | RelayError::SendFailure { .. }
            | RelayError::InternalError { .. } => None,
        }
    }

    /// Short label used for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::MalformedMessage { .. } => "malformed_message",
            RelayError::InvalidPassphrase { .. } => "invalid_passphrase",
            RelayError::LobbyFull { .. } => "lobby_full",
            RelayError::LobbyLimitReached { .. } => "lobby_limit_reached",
            RelayError::TransportClosed => "transport_closed",
            RelayError::SendFailure { .. } => "send_failure",
            RelayError::InternalError { .. } => "internal_error",
        }
    }
}

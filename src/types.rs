//! Common types used throughout the relay service

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identity of one accepted connection
pub type ConnectionId = Uuid;

/// Number of connections a lobby can hold
pub const LOBBY_CAPACITY: usize = 2;

/// Text sent with the `ready` notification
pub const READY_MESSAGE: &str = "Opponent found!";

/// One transport-level message. Payloads after the join handshake are
/// relayed as-is, keeping their frame kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

impl Frame {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Frame::Text(text) => text.as_bytes(),
            Frame::Binary(bytes) => bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<&ServerMessage> for Frame {
    fn from(message: &ServerMessage) -> Self {
        Frame::Text(message.to_json())
    }
}

/// Messages a client may send before it has joined a lobby
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    Join {
        #[serde(default)]
        passphrase: Option<String>,
    },
}

/// Messages the server originates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Terminal handshake failure
    Error { message: String },

    /// Handshake success
    Joined {
        passphrase: String,
        #[serde(rename = "playersInLobby")]
        players_in_lobby: usize,
    },

    /// Both members are present; relay may begin
    Ready { message: String },

    /// The other member's session terminated
    OpponentDisconnected,
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }

    pub fn ready() -> Self {
        ServerMessage::Ready {
            message: READY_MESSAGE.to_string(),
        }
    }

    pub fn to_json(&self) -> String {
        // Infallible for these variants
        serde_json::to_string(self).unwrap_or_default()
    }
}

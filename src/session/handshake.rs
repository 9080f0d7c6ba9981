//! Join request parsing
//!
//! The first frame on a connection must be `{"type": "join", "passphrase": ...}`.
//! Parsing and passphrase validation are pure; nothing here touches the
//! registry.

use crate::error::{
    RelayError, FIRST_MESSAGE_MUST_BE_JOIN, MALFORMED_JOIN_REQUEST, PASSPHRASE_REQUIRED,
};
use crate::passphrase::Passphrase;
use crate::types::{ClientMessage, Frame};
use serde_json::Value;

/// Parse the first frame of a session into a validated passphrase.
pub fn parse_join_request(frame: &Frame) -> Result<Passphrase, RelayError> {
    let value: Value =
        serde_json::from_slice(frame.as_bytes()).map_err(|_| RelayError::MalformedMessage {
            reason: MALFORMED_JOIN_REQUEST.to_string(),
        })?;

    if !value.is_object() {
        return Err(RelayError::MalformedMessage {
            reason: MALFORMED_JOIN_REQUEST.to_string(),
        });
    }

    if value.get("type").and_then(Value::as_str) != Some("join") {
        return Err(RelayError::MalformedMessage {
            reason: FIRST_MESSAGE_MUST_BE_JOIN.to_string(),
        });
    }

    // A passphrase of the wrong JSON type is as good as missing
    let ClientMessage::Join { passphrase } =
        serde_json::from_value(value).map_err(|_| RelayError::InvalidPassphrase {
            reason: PASSPHRASE_REQUIRED.to_string(),
        })?;

    Passphrase::parse(passphrase.as_deref().unwrap_or_default())
}

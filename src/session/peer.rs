//! Outbound side of a connection
//!
//! Every connection gets one bounded queue drained by a single writer task,
//! so sends from the owning session and from relaying peers are serialized.
//! A [`PeerHandle`] is the cloneable sending end of that queue and is what
//! the lobby registry stores as a member.

use crate::error::RelayError;
use crate::types::{ConnectionId, Frame, ServerMessage};
use crate::utils::generate_connection_id;
use std::fmt;
use std::hash::{Hash, Hasher};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Cloneable handle used to write to one connection
#[derive(Clone)]
pub struct PeerHandle {
    id: ConnectionId,
    sender: mpsc::Sender<Frame>,
}

impl PeerHandle {
    /// Create a handle with a fresh identity and the receiving end the
    /// transport writer should drain.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Frame>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self::new(generate_connection_id(), sender), receiver)
    }

    pub fn new(id: ConnectionId, sender: mpsc::Sender<Frame>) -> Self {
        Self { id, sender }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Whether the writer side has gone away
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Queue a frame, waiting for room if the connection is slow.
    ///
    /// Fails with [`RelayError::TransportClosed`] once the writer is gone.
    pub async fn send(&self, frame: Frame) -> Result<(), RelayError> {
        self.sender
            .send(frame)
            .await
            .map_err(|_| RelayError::TransportClosed)
    }

    /// Queue a frame without waiting. A full queue is a
    /// [`RelayError::SendFailure`]; a closed one is
    /// [`RelayError::TransportClosed`].
    pub fn try_send(&self, frame: Frame) -> Result<(), RelayError> {
        self.sender.try_send(frame).map_err(|e| match e {
            TrySendError::Closed(_) => RelayError::TransportClosed,
            TrySendError::Full(_) => RelayError::SendFailure {
                reason: format!("outbound queue of connection {} is full", self.id),
            },
        })
    }

    pub async fn send_message(&self, message: &ServerMessage) -> Result<(), RelayError> {
        self.send(Frame::from(message)).await
    }
}

impl PartialEq for PeerHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for PeerHandle {}

impl Hash for PeerHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for PeerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerHandle").field("id", &self.id).finish()
    }
}

//! A single lobby: the pairing slot for one passphrase
//!
//! Lobbies are plain data guarded by the registry lock; they never await
//! and never send anything themselves.

use crate::error::RelayError;
use crate::passphrase::Passphrase;
use crate::session::PeerHandle;
use crate::types::{ConnectionId, LOBBY_CAPACITY};
use crate::utils::current_timestamp;
use chrono::{DateTime, Utc};

/// Members currently joined under one passphrase
#[derive(Debug, Clone)]
pub struct Lobby {
    passphrase: Passphrase,
    /// Kept in join order; at most [`LOBBY_CAPACITY`] entries.
    members: Vec<PeerHandle>,
    created_at: DateTime<Utc>,
}

impl Lobby {
    /// Create an empty lobby. The registry adds the first member straight away.
    pub fn new(passphrase: Passphrase) -> Self {
        Self {
            passphrase,
            members: Vec::with_capacity(LOBBY_CAPACITY),
            created_at: current_timestamp(),
        }
    }

    pub fn passphrase(&self) -> &Passphrase {
        &self.passphrase
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.members.len() >= LOBBY_CAPACITY
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.members.iter().any(|member| member.id() == id)
    }

    /// Add a member, returning the new member count.
    ///
    /// Re-adding a connection that is already a member is a no-op.
    pub fn add_member(&mut self, peer: PeerHandle) -> Result<usize, RelayError> {
        if self.contains(peer.id()) {
            return Ok(self.members.len());
        }

        if self.is_full() {
            return Err(RelayError::LobbyFull {
                lobby: self.passphrase.fingerprint(),
            });
        }

        self.members.push(peer);
        Ok(self.members.len())
    }

    /// Remove a member; returns whether it was present.
    pub fn remove_member(&mut self, id: ConnectionId) -> bool {
        let before = self.members.len();
        self.members.retain(|member| member.id() != id);
        self.members.len() != before
    }

    pub fn members(&self) -> &[PeerHandle] {
        &self.members
    }

    /// Snapshot of every member other than `id`
    pub fn members_except(&self, id: ConnectionId) -> Vec<PeerHandle> {
        self.members
            .iter()
            .filter(|member| member.id() != id)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lobby() -> Lobby {
        Lobby::new(Passphrase::parse("roll-tank").unwrap())
    }

    #[test]
    fn test_new_lobby_is_empty() {
        let before = current_timestamp();
        let lobby = lobby();

        assert_eq!(lobby.passphrase().as_str(), "roll-tank");
        assert!(lobby.created_at() >= before);
        assert!(lobby.is_empty());
        assert!(!lobby.is_full());
    }

    #[test]
    fn test_capacity_is_enforced() {
        let mut lobby = lobby();
        let (a, _rx_a) = PeerHandle::channel(1);
        let (b, _rx_b) = PeerHandle::channel(1);
        let (c, _rx_c) = PeerHandle::channel(1);

        assert_eq!(lobby.add_member(a).unwrap(), 1);
        assert_eq!(lobby.add_member(b).unwrap(), 2);
        assert!(lobby.is_full());

        let err = lobby.add_member(c.clone()).unwrap_err();
        assert!(matches!(err, RelayError::LobbyFull { .. }));
        assert!(!lobby.contains(c.id()));
        assert_eq!(lobby.len(), 2);
    }

    #[test]
    fn test_duplicate_add_is_noop() {
        let mut lobby = lobby();
        let (a, _rx) = PeerHandle::channel(1);

        lobby.add_member(a.clone()).unwrap();
        assert_eq!(lobby.add_member(a).unwrap(), 1);
    }

    #[test]
    fn test_remove_and_snapshot() {
        let mut lobby = lobby();
        let (a, _rx_a) = PeerHandle::channel(1);
        let (b, _rx_b) = PeerHandle::channel(1);
        lobby.add_member(a.clone()).unwrap();
        lobby.add_member(b.clone()).unwrap();

        assert_eq!(lobby.members_except(a.id()), vec![b.clone()]);

        assert!(lobby.remove_member(a.id()));
        assert!(!lobby.remove_member(a.id()));
        assert_eq!(lobby.members(), &[b]);
    }
}

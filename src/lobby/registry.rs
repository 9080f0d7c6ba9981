//! Lobby registry: the process-wide passphrase → lobby map
//!
//! All membership changes go through [`LobbyRegistry::join`],
//! [`LobbyRegistry::leave`] and [`LobbyRegistry::broadcast_targets`]. Each
//! runs entirely under one lock acquisition and never awaits, so a
//! check-then-add can't interleave with another caller and no lock is
//! held while a session is suspended on I/O.

use crate::error::RelayError;
use crate::lobby::instance::Lobby;
use crate::metrics::MetricsCollector;
use crate::passphrase::Passphrase;
use crate::session::PeerHandle;
use crate::types::ConnectionId;
use crate::utils::current_timestamp;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

/// Statistics about registry operations
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct RegistryStats {
    /// Total number of lobbies created
    pub lobbies_created: u64,
    /// Total number of lobbies removed after emptying
    pub lobbies_removed: u64,
    /// Total successful joins
    pub joins_accepted: u64,
    /// Total joins rejected for capacity reasons
    pub joins_rejected: u64,
    /// Current number of lobbies
    pub active_lobbies: usize,
    /// Current number of connections that are lobby members
    pub joined_connections: usize,
}

/// Result of a successful join
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    /// Member count after the join (1 or 2)
    pub players_in_lobby: usize,
    /// Members other than the joining connection, at the moment of joining
    pub co_members: Vec<PeerHandle>,
    /// Whether this join created the lobby
    pub created_lobby: bool,
}

impl JoinOutcome {
    pub fn is_ready(&self) -> bool {
        self.players_in_lobby == crate::types::LOBBY_CAPACITY
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    lobbies: HashMap<Passphrase, Lobby>,
    stats: RegistryStats,
}

/// Shared lobby registry. Cloning yields another handle to the same map.
#[derive(Clone)]
pub struct LobbyRegistry {
    state: Arc<RwLock<RegistryState>>,
    /// Upper bound on concurrently existing lobbies
    max_lobbies: Option<usize>,
    metrics_collector: Arc<MetricsCollector>,
}

impl Default for LobbyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LobbyRegistry {
    /// Create an unbounded registry
    pub fn new() -> Self {
        Self::with_metrics(None, Arc::new(MetricsCollector::default()))
    }

    /// Create a registry that refuses to create more than `max_lobbies` lobbies
    pub fn with_limit(max_lobbies: Option<usize>) -> Self {
        Self::with_metrics(max_lobbies, Arc::new(MetricsCollector::default()))
    }

    /// Create a registry reporting into the given collector
    pub fn with_metrics(
        max_lobbies: Option<usize>,
        metrics_collector: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            state: Arc::new(RwLock::new(RegistryState::default())),
            max_lobbies,
            metrics_collector,
        }
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.metrics_collector.clone()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, RegistryState>, RelayError> {
        self.state.read().map_err(|_| RelayError::InternalError {
            message: "Failed to acquire lobby registry lock".to_string(),
        })
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, RegistryState>, RelayError> {
        self.state.write().map_err(|_| RelayError::InternalError {
            message: "Failed to acquire lobby registry lock".to_string(),
        })
    }

    /// Add `peer` to the lobby for `passphrase`, creating the lobby if absent.
    pub fn join(
        &self,
        passphrase: &Passphrase,
        peer: PeerHandle,
    ) -> Result<JoinOutcome, RelayError> {
        let peer_id = peer.id();
        let mut guard = self.write()?;
        let state = &mut *guard;

        let active_lobbies = state.lobbies.len();
        let created_lobby = !state.lobbies.contains_key(passphrase);

        if created_lobby {
            if let Some(limit) = self.max_lobbies {
                if active_lobbies >= limit {
                    state.stats.joins_rejected += 1;
                    warn!(
                        "Refusing to create lobby {} - limit of {} lobbies reached",
                        passphrase.fingerprint(),
                        limit
                    );
                    self.metrics_collector.record_join("lobby_limit_reached");
                    return Err(RelayError::LobbyLimitReached { limit });
                }
            }
        }

        let lobby = state
            .lobbies
            .entry(passphrase.clone())
            .or_insert_with(|| Lobby::new(passphrase.clone()));

        let players_in_lobby = match lobby.add_member(peer) {
            Ok(count) => count,
            Err(err) => {
                state.stats.joins_rejected += 1;
                self.metrics_collector.record_join(err.kind());
                return Err(err);
            }
        };
        let co_members = lobby.members_except(peer_id);

        if created_lobby {
            state.stats.lobbies_created += 1;
            self.metrics_collector.record_lobby_created();
        }
        state.stats.joins_accepted += 1;
        self.metrics_collector.record_join("joined");
        self.metrics_collector.set_active_lobbies(state.lobbies.len());

        info!(
            "Connection {} joined lobby {} - lobby size: {}",
            peer_id,
            passphrase.fingerprint(),
            players_in_lobby
        );

        Ok(JoinOutcome {
            players_in_lobby,
            co_members,
            created_lobby,
        })
    }

    /// Remove `id` from the lobby for `passphrase`, deleting the lobby if
    /// it empties. Returns the members left behind, or nothing if `id`
    /// was not a member.
    pub fn leave(
        &self,
        passphrase: &Passphrase,
        id: ConnectionId,
    ) -> Result<Vec<PeerHandle>, RelayError> {
        let mut guard = self.write()?;
        let state = &mut *guard;

        let Some(lobby) = state.lobbies.get_mut(passphrase) else {
            debug!(
                "Leave for connection {} ignored - lobby {} does not exist",
                id,
                passphrase.fingerprint()
            );
            return Ok(Vec::new());
        };

        if !lobby.remove_member(id) {
            debug!(
                "Leave for connection {} ignored - not a member of lobby {}",
                id,
                passphrase.fingerprint()
            );
            return Ok(Vec::new());
        }

        let remaining = lobby.members().to_vec();
        info!(
            "Removed connection {} from lobby {} - remaining: {}",
            id,
            passphrase.fingerprint(),
            remaining.len()
        );

        if lobby.is_empty() {
            let lifetime = current_timestamp() - lobby.created_at();
            info!(
                "Removed empty lobby {} after {}s",
                lobby.passphrase().fingerprint(),
                lifetime.num_seconds()
            );
            state.lobbies.remove(passphrase);
            state.stats.lobbies_removed += 1;
        }
        self.metrics_collector.set_active_lobbies(state.lobbies.len());

        Ok(remaining)
    }

    /// The other current members of the lobby, taken as one consistent snapshot.
    pub fn broadcast_targets(
        &self,
        passphrase: &Passphrase,
        excluding: ConnectionId,
    ) -> Result<Vec<PeerHandle>, RelayError> {
        let state = self.read()?;
        Ok(state
            .lobbies
            .get(passphrase)
            .map(|lobby| lobby.members_except(excluding))
            .unwrap_or_default())
    }

    pub fn contains(&self, passphrase: &Passphrase) -> Result<bool, RelayError> {
        Ok(self.read()?.lobbies.contains_key(passphrase))
    }

    /// Current member count, 0 if the lobby does not exist
    pub fn member_count(&self, passphrase: &Passphrase) -> Result<usize, RelayError> {
        Ok(self
            .read()?
            .lobbies
            .get(passphrase)
            .map(Lobby::len)
            .unwrap_or(0))
    }

    pub fn lobby_count(&self) -> Result<usize, RelayError> {
        Ok(self.read()?.lobbies.len())
    }

    pub fn stats(&self) -> Result<RegistryStats, RelayError> {
        let state = self.read()?;
        let mut stats = state.stats.clone();
        stats.active_lobbies = state.lobbies.len();
        stats.joined_connections = state.lobbies.values().map(Lobby::len).sum();
        Ok(stats)
    }
}

//! Per-connection session state machine
//!
//! A session moves `AwaitingJoin → Joined → Terminated` exactly once. The
//! handler is generic over its inbound stream so the transport adapter and
//! tests can drive it the same way.
//!
//! Cleanup is tied to [`Membership`]: it is created the moment the registry
//! accepts the join, released explicitly on every normal exit, and released
//! from `Drop` if the task panics or is cancelled. Either path runs `leave`
//! at most once.

use crate::config::RelaySettings;
use crate::error::{RelayError, TransportError};
use crate::lobby::LobbyRegistry;
use crate::passphrase::Passphrase;
use crate::session::handshake::parse_join_request;
use crate::session::PeerHandle;
use crate::types::{ConnectionId, Frame, ServerMessage};
use futures::{Stream, StreamExt};
use std::fmt;
use std::time::Duration;
use tokio::time::error::Elapsed;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

/// Lifecycle states of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingJoin,
    Joined,
    Terminated,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::AwaitingJoin => "awaiting_join",
            SessionState::Joined => "joined",
            SessionState::Terminated => "terminated",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a session terminated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// The client closed the connection
    Closed,
    /// The transport reported an error
    TransportFailed(TransportError),
    /// The join handshake was refused; the client was told why
    Rejected(RelayError),
    /// No join request arrived within the join timeout
    JoinTimedOut,
    /// A joined connection was silent for longer than the idle timeout
    IdleTimedOut,
    /// The registry failed internally
    Internal(RelayError),
}

/// Timeouts applied by a session; both disabled by default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionConfig {
    pub join_timeout: Option<Duration>,
    pub idle_timeout: Option<Duration>,
}

impl From<&RelaySettings> for SessionConfig {
    fn from(settings: &RelaySettings) -> Self {
        Self {
            join_timeout: settings.join_timeout(),
            idle_timeout: settings.idle_timeout(),
        }
    }
}

/// Read the next inbound item, giving up after `limit` if one is set.
async fn next_within<S>(
    inbound: &mut S,
    limit: Option<Duration>,
) -> Result<Option<Result<Frame, TransportError>>, Elapsed>
where
    S: Stream<Item = Result<Frame, TransportError>> + Unpin,
{
    match limit {
        Some(limit) => timeout(limit, inbound.next()).await,
        None => Ok(inbound.next().await),
    }
}

/// Registry membership held by a joined session
struct Membership {
    registry: LobbyRegistry,
    passphrase: Passphrase,
    connection_id: ConnectionId,
    released: bool,
}

impl Membership {
    /// Leave the lobby and notify whoever is left.
    fn release(mut self) {
        self.leave_and_notify();
    }

    /// Runs at most once. The notification never waits on the peer's
    /// queue: a stalled or departed peer must not hold up this session.
    fn leave_and_notify(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        let remaining = match self.registry.leave(&self.passphrase, self.connection_id) {
            Ok(remaining) => remaining,
            Err(e) => {
                warn!(
                    "Failed to remove connection {} from lobby {}: {}",
                    self.connection_id,
                    self.passphrase.fingerprint(),
                    e
                );
                return;
            }
        };

        let metrics = self.registry.metrics();
        let notice = Frame::from(&ServerMessage::OpponentDisconnected);
        for peer in remaining {
            match peer.try_send(notice.clone()) {
                Ok(()) => metrics.record_disconnect_notification(),
                Err(e) => {
                    debug!("Disconnect notification to {} dropped: {}", peer.id(), e);
                    metrics.record_send_failure("cleanup");
                }
            }
        }
    }
}

impl Drop for Membership {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        warn!(
            "Session {} dropped without orderly cleanup, releasing lobby {}",
            self.connection_id,
            self.passphrase.fingerprint()
        );
        self.leave_and_notify();
    }
}

/// Drives one connection through handshake, relay and cleanup
pub struct SessionHandler {
    registry: LobbyRegistry,
    peer: PeerHandle,
    config: SessionConfig,
    state: SessionState,
}

impl SessionHandler {
    pub fn new(registry: LobbyRegistry, peer: PeerHandle, config: SessionConfig) -> Self {
        Self {
            registry,
            peer,
            config,
            state: SessionState::AwaitingJoin,
        }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.peer.id()
    }

    /// Run the session to completion over `inbound`.
    pub async fn run<S>(mut self, mut inbound: S) -> SessionEnd
    where
        S: Stream<Item = Result<Frame, TransportError>> + Unpin,
    {
        let end = match self.handshake(&mut inbound).await {
            Ok(membership) => {
                self.state = SessionState::Joined;
                let end = self.relay(&mut inbound, &membership.passphrase).await;
                membership.release();
                end
            }
            Err(end) => end,
        };

        self.registry
            .metrics()
            .record_session_ended(self.state.as_str());
        info!(
            "Session {} {} -> {}: {:?}",
            self.peer.id(),
            self.state,
            SessionState::Terminated,
            end
        );
        end
    }

    async fn reject(&self, error: RelayError) -> SessionEnd {
        if let Some(message) = error.client_message() {
            if let Err(e) = self.peer.send_message(&ServerMessage::error(message)).await {
                debug!("Could not report {} to {}: {}", error.kind(), self.peer.id(), e);
            }
        }
        info!("Rejected connection {}: {}", self.peer.id(), error);
        SessionEnd::Rejected(error)
    }

    async fn handshake<S>(&self, inbound: &mut S) -> Result<Membership, SessionEnd>
    where
        S: Stream<Item = Result<Frame, TransportError>> + Unpin,
    {
        let frame = match next_within(inbound, self.config.join_timeout).await {
            Ok(Some(Ok(frame))) => frame,
            Ok(Some(Err(e))) => return Err(SessionEnd::TransportFailed(e)),
            Ok(None) => return Err(SessionEnd::Closed),
            Err(_) => {
                info!("Connection {} sent no join request in time", self.peer.id());
                return Err(SessionEnd::JoinTimedOut);
            }
        };

        let passphrase = match parse_join_request(&frame) {
            Ok(passphrase) => passphrase,
            Err(e) => {
                self.registry.metrics().record_join(e.kind());
                return Err(self.reject(e).await);
            }
        };

        let outcome = match self.registry.join(&passphrase, self.peer.clone()) {
            Ok(outcome) => outcome,
            Err(e @ RelayError::InternalError { .. }) => return Err(SessionEnd::Internal(e)),
            Err(e) => return Err(self.reject(e).await),
        };

        let membership = Membership {
            registry: self.registry.clone(),
            passphrase: passphrase.clone(),
            connection_id: self.peer.id(),
            released: false,
        };

        let joined = ServerMessage::Joined {
            passphrase: passphrase.as_str().to_string(),
            players_in_lobby: outcome.players_in_lobby,
        };
        if let Err(e) = self.peer.send_message(&joined).await {
            debug!("Join confirmation to {} dropped: {}", self.peer.id(), e);
        }

        if outcome.is_ready() {
            let ready = ServerMessage::ready();
            let metrics = self.registry.metrics();
            for member in std::iter::once(&self.peer).chain(outcome.co_members.iter()) {
                if let Err(e) = member.send_message(&ready).await {
                    warn!("Failed to send ready to {}: {}", member.id(), e);
                    metrics.record_send_failure("ready");
                }
            }
            metrics.record_lobby_ready();
            info!("Lobby {} is ready with 2 players", passphrase.fingerprint());
        }

        Ok(membership)
    }

    async fn relay<S>(&self, inbound: &mut S, passphrase: &Passphrase) -> SessionEnd
    where
        S: Stream<Item = Result<Frame, TransportError>> + Unpin,
    {
        loop {
            let frame = match next_within(inbound, self.config.idle_timeout).await {
                Ok(Some(Ok(frame))) => frame,
                Ok(Some(Err(e))) => return SessionEnd::TransportFailed(e),
                Ok(None) => return SessionEnd::Closed,
                Err(_) => {
                    info!("Connection {} idle timeout reached", self.peer.id());
                    return SessionEnd::IdleTimedOut;
                }
            };

            let targets = match self.registry.broadcast_targets(passphrase, self.peer.id()) {
                Ok(targets) => targets,
                Err(e) => return SessionEnd::Internal(e),
            };

            let metrics = self.registry.metrics();
            for target in targets {
                let size = frame.len();
                match target.send(frame.clone()).await {
                    Ok(()) => {
                        trace!("Relayed {} bytes from {} to {}", size, self.peer.id(), target.id());
                        metrics.record_relayed(size);
                    }
                    Err(e) => {
                        warn!("Error forwarding message to {}: {}", target.id(), e);
                        metrics.record_send_failure("relay");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::UnboundedReceiverStream;

    type Inbound = mpsc::UnboundedSender<Result<Frame, TransportError>>;

    type Started = (
        Inbound,
        mpsc::Receiver<Frame>,
        tokio::task::JoinHandle<SessionEnd>,
    );

    fn start(registry: &LobbyRegistry, config: SessionConfig) -> Started {
        start_with_capacity(registry, config, 16)
    }

    fn start_with_capacity(
        registry: &LobbyRegistry,
        config: SessionConfig,
        capacity: usize,
    ) -> Started {
        let (peer, outbound) = PeerHandle::channel(capacity);
        let (tx, rx) = mpsc::unbounded_channel();
        let handler = SessionHandler::new(registry.clone(), peer, config);
        let task = tokio::spawn(handler.run(UnboundedReceiverStream::new(rx)));
        (tx, outbound, task)
    }

    fn join(passphrase: &str) -> Result<Frame, TransportError> {
        Ok(Frame::Text(format!(
            r#"{{"type":"join","passphrase":"{passphrase}"}}"#
        )))
    }

    async fn recv_json(rx: &mut mpsc::Receiver<Frame>) -> serde_json::Value {
        match rx.recv().await {
            Some(Frame::Text(text)) => serde_json::from_str(&text).unwrap(),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_closed_before_join() {
        let registry = LobbyRegistry::new();
        let (tx, mut outbound, task) = start(&registry, SessionConfig::default());
        drop(tx);

        assert_eq!(task.await.unwrap(), SessionEnd::Closed);
        assert!(outbound.recv().await.is_none());
        assert_eq!(registry.lobby_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_rejection_reports_error() {
        let registry = LobbyRegistry::new();
        let (tx, mut outbound, task) = start(&registry, SessionConfig::default());
        tx.send(join("noseparator")).unwrap();

        let reply = recv_json(&mut outbound).await;
        assert_eq!(reply["type"], "error");
        assert_eq!(reply["message"], "Invalid passphrase format. Use: verb-noun");
        assert!(matches!(
            task.await.unwrap(),
            SessionEnd::Rejected(RelayError::InvalidPassphrase { .. })
        ));
        assert_eq!(registry.lobby_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_transport_error_after_join_cleans_up() {
        let registry = LobbyRegistry::new();
        let (tx, mut outbound, task) = start(&registry, SessionConfig::default());
        tx.send(join("roll-tank")).unwrap();
        assert_eq!(recv_json(&mut outbound).await["playersInLobby"], 1);

        tx.send(Err(TransportError::new("connection reset"))).unwrap();
        assert_eq!(
            task.await.unwrap(),
            SessionEnd::TransportFailed(TransportError::new("connection reset"))
        );
        assert_eq!(registry.lobby_count().unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_timeout() {
        let registry = LobbyRegistry::new();
        let config = SessionConfig {
            join_timeout: Some(Duration::from_secs(5)),
            idle_timeout: None,
        };
        let (_tx, _outbound, task) = start(&registry, config);

        assert_eq!(task.await.unwrap(), SessionEnd::JoinTimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_timeout_notifies_peer() {
        let registry = LobbyRegistry::new();
        let config = SessionConfig {
            join_timeout: None,
            idle_timeout: Some(Duration::from_secs(30)),
        };
        let (tx_a, mut out_a, task_a) = start(&registry, config);
        tx_a.send(join("roll-tank")).unwrap();
        recv_json(&mut out_a).await;

        let (tx_b, mut out_b, task_b) = start(&registry, SessionConfig::default());
        tx_b.send(join("roll-tank")).unwrap();
        recv_json(&mut out_b).await; // joined
        recv_json(&mut out_b).await; // ready

        assert_eq!(task_a.await.unwrap(), SessionEnd::IdleTimedOut);
        assert_eq!(recv_json(&mut out_b).await["type"], "opponentDisconnected");

        drop(tx_b);
        assert_eq!(task_b.await.unwrap(), SessionEnd::Closed);
        assert_eq!(registry.lobby_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_session_releases_membership() {
        let registry = LobbyRegistry::new();
        let (tx_a, mut out_a, task_a) = start(&registry, SessionConfig::default());
        tx_a.send(join("roll-tank")).unwrap();
        recv_json(&mut out_a).await;

        let (tx_b, mut out_b, _task_b) = start(&registry, SessionConfig::default());
        tx_b.send(join("roll-tank")).unwrap();
        recv_json(&mut out_b).await; // joined
        recv_json(&mut out_b).await; // ready

        task_a.abort();
        assert!(task_a.await.unwrap_err().is_cancelled());

        assert_eq!(recv_json(&mut out_b).await["type"], "opponentDisconnected");
        let passphrase = Passphrase::parse("roll-tank").unwrap();
        assert_eq!(registry.member_count(&passphrase).unwrap(), 1);
    }

    fn send_failures(registry: &LobbyRegistry, context: &str) -> u64 {
        registry
            .metrics()
            .relay()
            .send_failures_total
            .with_label_values(&[context])
            .get()
    }

    #[tokio::test]
    async fn test_cleanup_does_not_wait_on_stalled_peer() {
        let registry = LobbyRegistry::new();
        let (tx_a, mut out_a, task_a) = start(&registry, SessionConfig::default());
        tx_a.send(join("roll-tank")).unwrap();
        recv_json(&mut out_a).await;

        let (tx_b, mut out_b, _task_b) =
            start_with_capacity(&registry, SessionConfig::default(), 1);
        tx_b.send(join("roll-tank")).unwrap();
        recv_json(&mut out_b).await; // joined
        recv_json(&mut out_b).await; // ready
        recv_json(&mut out_a).await; // ready

        // B stops draining; one relayed frame fills its queue
        tx_a.send(Ok(Frame::Text("shot".to_string()))).unwrap();
        while registry.metrics().relay().messages_relayed_total.get() == 0 {
            tokio::task::yield_now().await;
        }
        drop(tx_a);

        let end = tokio::time::timeout(Duration::from_secs(2), task_a)
            .await
            .expect("session blocked on a full peer queue")
            .unwrap();
        assert_eq!(end, SessionEnd::Closed);
        assert_eq!(send_failures(&registry, "cleanup"), 1);

        let passphrase = Passphrase::parse("roll-tank").unwrap();
        assert_eq!(registry.member_count(&passphrase).unwrap(), 1);
        assert_eq!(out_b.recv().await, Some(Frame::Text("shot".to_string())));
        drop(tx_b);
    }

    #[tokio::test]
    async fn test_relay_survives_send_failures() {
        let registry = LobbyRegistry::new();
        let (tx_a, mut out_a, task_a) = start(&registry, SessionConfig::default());
        tx_a.send(join("roll-tank")).unwrap();
        recv_json(&mut out_a).await;

        let (tx_b, mut out_b, task_b) = start(&registry, SessionConfig::default());
        tx_b.send(join("roll-tank")).unwrap();
        recv_json(&mut out_b).await; // joined
        recv_json(&mut out_b).await; // ready
        recv_json(&mut out_a).await; // ready

        // B is still a lobby member but its writer has gone away
        drop(out_b);
        for i in 0..3 {
            tx_a.send(Ok(Frame::Text(format!("shot-{i}")))).unwrap();
        }
        while send_failures(&registry, "relay") < 3 {
            tokio::task::yield_now().await;
        }
        assert!(!task_a.is_finished());

        drop(tx_a);
        assert_eq!(task_a.await.unwrap(), SessionEnd::Closed);
        let passphrase = Passphrase::parse("roll-tank").unwrap();
        assert_eq!(registry.member_count(&passphrase).unwrap(), 1);
        // The notice to B could not be queued either
        assert_eq!(send_failures(&registry, "cleanup"), 1);

        drop(tx_b);
        assert_eq!(task_b.await.unwrap(), SessionEnd::Closed);
        assert_eq!(registry.lobby_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_ready_failure_does_not_block_pairing() {
        let registry = LobbyRegistry::new();
        let (tx_a, mut out_a, task_a) = start(&registry, SessionConfig::default());
        tx_a.send(join("roll-tank")).unwrap();
        recv_json(&mut out_a).await;
        drop(out_a);

        let (tx_b, mut out_b, task_b) = start(&registry, SessionConfig::default());
        tx_b.send(join("roll-tank")).unwrap();
        assert_eq!(recv_json(&mut out_b).await["playersInLobby"], 2);
        assert_eq!(recv_json(&mut out_b).await["type"], "ready");
        while send_failures(&registry, "ready") == 0 {
            tokio::task::yield_now().await;
        }

        drop(tx_a);
        assert_eq!(task_a.await.unwrap(), SessionEnd::Closed);
        assert_eq!(recv_json(&mut out_b).await["type"], "opponentDisconnected");
        drop(tx_b);
        assert_eq!(task_b.await.unwrap(), SessionEnd::Closed);
    }

    #[test]
    fn test_session_config_from_settings() {
        let settings = RelaySettings {
            idle_timeout_seconds: Some(60),
            ..RelaySettings::default()
        };
        let config = SessionConfig::from(&settings);
        assert_eq!(config.idle_timeout, Some(Duration::from_secs(60)));
        assert_eq!(config.join_timeout, None);
    }
}

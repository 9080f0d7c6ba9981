//! Test fixtures for driving relay sessions without a network

#![allow(dead_code)]

use std::time::Duration;
use tank_relay::lobby::LobbyRegistry;
use tank_relay::session::{PeerHandle, SessionConfig, SessionEnd, SessionHandler};
use tank_relay::types::{ConnectionId, Frame};
use tank_relay::TransportError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// How long a test waits before deciding nothing else will arrive
pub const QUIET_PERIOD: Duration = Duration::from_millis(100);

/// An in-memory client attached to a running session
pub struct TestClient {
    pub id: ConnectionId,
    inbound: Option<mpsc::UnboundedSender<Result<Frame, TransportError>>>,
    outbound: mpsc::Receiver<Frame>,
    task: JoinHandle<SessionEnd>,
}

impl TestClient {
    /// Start a session against `registry` with timeouts disabled
    pub fn connect(registry: &LobbyRegistry) -> Self {
        Self::connect_with(registry, SessionConfig::default())
    }

    pub fn connect_with(registry: &LobbyRegistry, config: SessionConfig) -> Self {
        let (peer, outbound) = PeerHandle::channel(32);
        let (tx, rx) = mpsc::unbounded_channel();
        let id = peer.id();
        let handler = SessionHandler::new(registry.clone(), peer, config);
        let task = tokio::spawn(handler.run(UnboundedReceiverStream::new(rx)));

        Self {
            id,
            inbound: Some(tx),
            outbound,
            task,
        }
    }

    pub fn send(&self, frame: Frame) {
        if let Some(inbound) = &self.inbound {
            inbound.send(Ok(frame)).expect("session stopped reading");
        }
    }

    pub fn send_text(&self, text: &str) {
        self.send(Frame::Text(text.to_string()));
    }

    pub fn send_join(&self, passphrase: &str) {
        self.send_text(&join_request(passphrase));
    }

    /// Inject a transport failure
    pub fn fail(&self, message: &str) {
        if let Some(inbound) = &self.inbound {
            let _ = inbound.send(Err(TransportError::new(message)));
        }
    }

    /// Next frame the relay wrote to this client
    pub async fn recv(&mut self) -> Frame {
        tokio::time::timeout(Duration::from_secs(2), self.outbound.recv())
            .await
            .expect("timed out waiting for a frame")
            .expect("outbound queue closed")
    }

    pub async fn recv_json(&mut self) -> serde_json::Value {
        match self.recv().await {
            Frame::Text(text) => serde_json::from_str(&text).expect("relay sent invalid JSON"),
            other => panic!("expected a text frame, got {other:?}"),
        }
    }

    /// Join and consume the `joined` confirmation, returning the lobby size
    pub async fn join(&mut self, passphrase: &str) -> u64 {
        self.send_join(passphrase);
        let reply = self.recv_json().await;
        assert_eq!(reply["type"], "joined", "unexpected reply: {reply}");
        reply["playersInLobby"].as_u64().expect("playersInLobby")
    }

    /// Assert that nothing arrives within [`QUIET_PERIOD`]
    pub async fn assert_silent(&mut self) {
        if let Ok(Some(frame)) = tokio::time::timeout(QUIET_PERIOD, self.outbound.recv()).await {
            panic!("expected no frame, got {frame:?}");
        }
    }

    /// Close the inbound side and wait for the session to finish
    pub async fn close(mut self) -> SessionEnd {
        self.inbound.take();
        self.task.await.expect("session task panicked")
    }

    /// Wait for a session that ends on its own
    pub async fn finished(self) -> (SessionEnd, mpsc::Receiver<Frame>) {
        let end = self.task.await.expect("session task panicked");
        (end, self.outbound)
    }
}

pub fn join_request(passphrase: &str) -> String {
    serde_json::json!({ "type": "join", "passphrase": passphrase }).to_string()
}

/// Two clients paired in one lobby with `joined` and `ready` consumed
pub async fn paired(registry: &LobbyRegistry, passphrase: &str) -> (TestClient, TestClient) {
    let mut first = TestClient::connect(registry);
    assert_eq!(first.join(passphrase).await, 1);

    let mut second = TestClient::connect(registry);
    assert_eq!(second.join(passphrase).await, 2);

    for client in [&mut first, &mut second] {
        let ready = client.recv_json().await;
        assert_eq!(ready["type"], "ready");
        assert_eq!(ready["message"], "Opponent found!");
    }

    (first, second)
}

//! WebSocket transport adapter
//!
//! Accepts upgrades, splits each socket into a frame stream for the
//! [`SessionHandler`] and a writer task draining the connection's
//! [`PeerHandle`] queue. Ping/pong and close handshakes stay inside the
//! WebSocket layer.

use crate::error::TransportError;
use crate::server::app::AppState;
use crate::session::{PeerHandle, SessionHandler};
use crate::types::{ConnectionId, Frame};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::stream::{SplitSink, SplitStream};
use futures::{future, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

/// Upgrade handler mounted on `/` and `/ws`
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let max_message_bytes = state.config().relay.max_message_bytes;
    ws.max_message_size(max_message_bytes)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

/// Run one session over an upgraded socket
pub async fn handle_socket(socket: WebSocket, state: AppState) {
    let metrics = state.metrics();
    metrics.record_connection_opened();

    let (sink, stream) = socket.split();
    let (peer, outbound) = PeerHandle::channel(state.config().relay.outbound_queue_capacity);
    let connection_id = peer.id();
    debug!("Accepted connection {}", connection_id);

    let writer = tokio::spawn(write_frames(sink, outbound, connection_id));

    let handler = SessionHandler::new(state.registry().clone(), peer, state.session_config());
    let end = handler.run(inbound_frames(stream)).await;
    debug!("Connection {} session ended: {:?}", connection_id, end);

    // The writer drains what is queued and closes once every handle is gone
    if let Err(e) = writer.await {
        warn!("Writer task for connection {} failed: {}", connection_id, e);
    }
    metrics.record_connection_closed();
}

/// Adapt the read half of a socket into relay frames. A close frame ends the stream.
pub fn inbound_frames(
    stream: SplitStream<WebSocket>,
) -> impl Stream<Item = Result<Frame, TransportError>> + Unpin + Send {
    stream
        .take_while(|message| future::ready(!matches!(message, Ok(Message::Close(_)))))
        .filter_map(|message| {
            future::ready(match message {
                Ok(Message::Text(text)) => Some(Ok(Frame::Text(text.as_str().to_owned()))),
                Ok(Message::Binary(bytes)) => Some(Ok(Frame::Binary(bytes.to_vec()))),
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Close(_)) => None,
                Err(e) => Some(Err(TransportError::new(e.to_string()))),
            })
        })
}

fn to_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text.into()),
        Frame::Binary(bytes) => Message::Binary(bytes.into()),
    }
}

async fn write_frames(
    sink: SplitSink<WebSocket, Message>,
    outbound: mpsc::Receiver<Frame>,
    connection_id: ConnectionId,
) {
    let result = ReceiverStream::new(outbound)
        .map(|frame| Ok::<_, axum::Error>(to_message(frame)))
        .forward(sink)
        .await;

    if let Err(e) = result {
        debug!("Connection {} stopped accepting writes: {}", connection_id, e);
    }
}

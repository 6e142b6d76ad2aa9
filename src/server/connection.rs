//! Per-connection actor
//!
//! One task per accepted socket. The reader half drives the protocol state
//! machine; the writer half drains a bounded outbound queue so the read loop
//! never blocks on a slow peer. The queue sender is packaged up as a
//! [`ConnectionHandle`], the cheap-clone reference the registry stores for
//! fan-out. Queue-receiver liveness doubles as the transport-open signal:
//! when the writer task ends, every handle reports the connection closed.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures_util::future::join_all;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::{Message, Utf8Bytes};

use crate::error::Result;
use crate::protocol::{ClientMessage, FramePayload, ProtocolError, ServerMessage};
use crate::registry::{RegistryError, StreamId, StreamRegistry};
use crate::server::config::ServerConfig;
use crate::server::handler::{ConnectionContext, RelayHandler};
use crate::session::{ConnectionRole, ConnectionState};
use crate::stats::ConnectionStats;

/// Bound on waiting for one peer's queue when delivering a control message;
/// a peer this far behind forfeits the notice rather than stalling teardown.
const CONTROL_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of queueing a message toward a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Queued for delivery
    Sent,
    /// Queue full; the message was dropped (latest frame wins)
    Dropped,
    /// Queue closed; the transport is gone
    Closed,
}

/// Cheap-clone reference to a connection's outbound side
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: u64,
    outbound: mpsc::Sender<Message>,
    stats: Arc<ConnectionStats>,
}

impl ConnectionHandle {
    pub(crate) fn new(id: u64, outbound: mpsc::Sender<Message>, stats: Arc<ConnectionStats>) -> Self {
        Self {
            id,
            outbound,
            stats,
        }
    }

    /// Connection ID
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether the connection's transport is still open
    pub fn is_open(&self) -> bool {
        !self.outbound.is_closed()
    }

    /// Diagnostic counters for this connection
    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    /// Queue a frame payload without waiting
    ///
    /// Frames are best-effort: a full queue drops this frame for this peer,
    /// the next frame supersedes it.
    pub(crate) fn try_send_frame(&self, payload: Utf8Bytes) -> SendOutcome {
        match self.outbound.try_send(Message::Text(payload)) {
            Ok(()) => {
                self.stats.record_frame_sent();
                SendOutcome::Sent
            }
            Err(TrySendError::Full(_)) => SendOutcome::Dropped,
            Err(TrySendError::Closed(_)) => SendOutcome::Closed,
        }
    }

    /// Queue a control message, waiting for queue capacity
    pub(crate) async fn send(&self, message: &ServerMessage) -> bool {
        self.send_text(message.encode()).await
    }

    /// Queue an already-encoded text payload, waiting for queue capacity
    pub(crate) async fn send_text(&self, payload: Utf8Bytes) -> bool {
        self.outbound.send(Message::Text(payload)).await.is_ok()
    }

    /// Queue a raw WebSocket message, waiting for queue capacity
    pub(crate) async fn send_raw(&self, message: Message) -> bool {
        self.outbound.send(message).await.is_ok()
    }
}

/// Role pre-assigned by the upgrade request path
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PathRole {
    Broadcaster(StreamId),
    Viewer(StreamId),
}

/// Parse a role-in-path upgrade request
///
/// Recognizes `/broadcaster/{id}` and `/viewer/{id}`, with an optional
/// leading `/ws` segment as the managed deployment routes it. Anything else
/// means role-in-message addressing.
pub(crate) fn parse_path_role(path: &str) -> Option<PathRole> {
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    let mut role = segments.next()?;
    if role == "ws" {
        role = segments.next()?;
    }
    let id = segments.next()?;
    if segments.next().is_some() || id.is_empty() {
        return None;
    }
    match role {
        "broadcaster" => Some(PathRole::Broadcaster(StreamId::from(id))),
        "viewer" => Some(PathRole::Viewer(StreamId::from(id))),
        _ => None,
    }
}

/// Per-connection protocol driver
struct Connection<H: RelayHandler> {
    state: ConnectionState,
    ctx: ConnectionContext,
    config: ServerConfig,
    handler: Arc<H>,
    registry: Arc<StreamRegistry>,
    stats: Arc<ConnectionStats>,
    handle: ConnectionHandle,
}

/// Run one connection to completion
///
/// Performs the WebSocket upgrade (capturing the request path for
/// role-in-path addressing), spawns the writer task, then processes inbound
/// messages one at a time until the peer goes away, the idle timeout fires,
/// or the server shuts the connection down. Teardown cascades according to
/// the role held at close time.
pub(crate) async fn serve<H: RelayHandler>(
    session_id: u64,
    socket: TcpStream,
    peer_addr: SocketAddr,
    config: ServerConfig,
    handler: Arc<H>,
    registry: Arc<StreamRegistry>,
) -> Result<()> {
    let mut request_path = None;
    let ws = accept_hdr_async(socket, |req: &Request, response: Response| {
        request_path = Some(req.uri().path().to_owned());
        Ok(response)
    })
    .await?;

    let path_role = request_path.as_deref().and_then(parse_path_role);

    let (mut sink, mut stream) = ws.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Message>(config.outbound_queue);

    // Writer task: drains the queue into the socket. Ends when every sender
    // is gone or the socket rejects a write; either way `is_open()` flips.
    let writer = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sink.send(message).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let stats = Arc::new(ConnectionStats::new());
    let handle = ConnectionHandle::new(session_id, outbound_tx, Arc::clone(&stats));
    let ctx = ConnectionContext {
        session_id,
        peer_addr,
    };

    let mut conn = Connection {
        state: ConnectionState::new(session_id, peer_addr),
        ctx,
        config,
        handler,
        registry,
        stats,
        handle,
    };

    if !conn.handler.on_connection(&conn.ctx).await {
        tracing::info!(session_id, peer = %peer_addr, "Connection rejected by handler");
        drop(conn);
        let _ = writer.await;
        return Ok(());
    }

    let keep_open = match path_role {
        Some(PathRole::Broadcaster(stream_id)) => conn.identify_as_broadcaster(Some(stream_id)).await,
        Some(PathRole::Viewer(stream_id)) => {
            conn.identify_as_viewer(stream_id).await;
            true
        }
        None => true,
    };

    if keep_open {
        conn.read_loop(&mut stream).await;
    }

    conn.teardown().await;
    drop(conn);
    let _ = writer.await;
    Ok(())
}

impl<H: RelayHandler> Connection<H> {
    async fn read_loop(
        &mut self,
        stream: &mut (impl futures_util::Stream<
            Item = std::result::Result<Message, tokio_tungstenite::tungstenite::Error>,
        > + Unpin),
    ) {
        let mut keepalive = tokio::time::interval(self.config.keepalive_interval);
        keepalive.tick().await; // immediate first tick carries no information
        let mut last_activity = Instant::now();

        loop {
            tokio::select! {
                incoming = stream.next() => match incoming {
                    Some(Ok(message)) => {
                        last_activity = Instant::now();
                        if !self.on_message(message).await {
                            break;
                        }
                    }
                    Some(Err(err)) => {
                        tracing::debug!(
                            session_id = self.state.id,
                            error = %err,
                            "Connection transport error"
                        );
                        break;
                    }
                    None => break,
                },
                _ = keepalive.tick() => {
                    if last_activity.elapsed() >= self.config.idle_timeout {
                        tracing::info!(
                            session_id = self.state.id,
                            idle_secs = last_activity.elapsed().as_secs(),
                            "Idle timeout, closing connection"
                        );
                        break;
                    }
                    if !self.handle.send_raw(Message::Ping(Bytes::new())).await {
                        break;
                    }
                }
            }
        }
    }

    /// Process one inbound WebSocket message. Returns `false` to close.
    async fn on_message(&mut self, message: Message) -> bool {
        match message {
            Message::Text(text) => {
                self.stats.record_message_received();
                self.on_text(text.as_str()).await;
                true
            }
            Message::Binary(_) => {
                // The protocol is JSON text frames only
                tracing::warn!(
                    session_id = self.state.id,
                    "Unexpected binary frame (ignored)"
                );
                true
            }
            Message::Ping(_) | Message::Pong(_) => true,
            Message::Close(_) => {
                tracing::debug!(session_id = self.state.id, "Close frame received");
                false
            }
            Message::Frame(_) => true,
        }
    }

    async fn on_text(&mut self, text: &str) {
        match ClientMessage::decode(text) {
            Ok(message) => self.dispatch(message).await,
            Err(err) => {
                // Malformed input never terminates a healthy connection
                tracing::debug!(
                    session_id = self.state.id,
                    error = %err,
                    "Protocol error"
                );
                self.send_error(err.to_string()).await;
            }
        }
    }

    async fn dispatch(&mut self, message: ClientMessage) {
        match message {
            ClientMessage::StartStream => {
                self.identify_as_broadcaster(None).await;
            }
            ClientMessage::JoinStream { stream_id } => {
                self.identify_as_viewer(stream_id).await;
            }
            ClientMessage::Frame { stream_id, frame } => {
                self.relay_frame(stream_id, frame).await;
            }
            ClientMessage::UpdatePrompt { prompt } => {
                self.update_prompt(prompt).await;
            }
            ClientMessage::ListStreams => {
                let streams = self.registry.list().await;
                self.send(ServerMessage::StreamsList { streams }).await;
            }
            ClientMessage::Ping => {
                self.send(ServerMessage::Pong).await;
            }
        }
    }

    /// Claim the broadcaster role, creating the stream.
    ///
    /// `explicit` carries a path-addressed identifier claim. Returns `false`
    /// when a rejected claim should close the connection.
    async fn identify_as_broadcaster(&mut self, explicit: Option<StreamId>) -> bool {
        if !self.state.is_unidentified() {
            self.send_error("Connection already identified").await;
            return true;
        }

        let created = match explicit {
            Some(stream_id) => {
                self.registry
                    .create_with_id(stream_id, self.handle.clone())
                    .await
            }
            None => Ok(self.registry.create(self.handle.clone()).await),
        };

        match created {
            Ok(stream_id) => {
                // guarded above; the connection is still unidentified
                let _ = self.state.identify_broadcaster(stream_id.clone());
                self.handler.on_stream_created(&self.ctx, &stream_id).await;
                self.send(ServerMessage::StreamCreated { stream_id }).await;
                true
            }
            Err(err @ RegistryError::StreamAlreadyActive(_)) => {
                tracing::warn!(
                    session_id = self.state.id,
                    error = %err,
                    "Rejected broadcaster claim"
                );
                self.send_error(err.to_string()).await;
                false
            }
            Err(err) => {
                self.send_error(err.to_string()).await;
                true
            }
        }
    }

    /// Claim the viewer role by attaching to an existing stream.
    ///
    /// A failed join leaves the connection unidentified and able to retry.
    async fn identify_as_viewer(&mut self, stream_id: StreamId) {
        if !self.state.is_unidentified() {
            self.send_error("Connection already identified").await;
            return;
        }

        match self.registry.join(&stream_id, self.handle.clone()).await {
            Ok(style_prompt) => {
                let _ = self.state.identify_viewer(stream_id.clone());
                self.send(ServerMessage::JoinedStream {
                    stream_id: stream_id.clone(),
                })
                .await;
                if let Some(prompt) = style_prompt {
                    self.send(ServerMessage::StyleUpdated { prompt }).await;
                }
                self.handler.on_viewer_joined(&self.ctx, &stream_id).await;
            }
            Err(RegistryError::StreamNotFound(_)) => {
                self.send_error("Stream not found").await;
            }
            Err(err) => {
                self.send_error(err.to_string()).await;
            }
        }
    }

    async fn relay_frame(&mut self, stream_id: StreamId, frame: FramePayload) {
        let owns = self
            .state
            .broadcast_stream()
            .is_some_and(|owned| *owned == stream_id);
        if !owns {
            // identity violation: logged, never surfaced to the sender
            tracing::warn!(
                session_id = self.state.id,
                role = self.state.role().label(),
                stream = %stream_id,
                "Frame from non-broadcaster connection dropped"
            );
            return;
        }

        if let Err(err) = frame.validate(self.config.max_frame_bytes) {
            self.send_error(err.to_string()).await;
            return;
        }

        self.stats.record_frame_received();
        if !self.handler.on_frame(&self.ctx, &stream_id, &frame).await {
            tracing::debug!(session_id = self.state.id, "Frame vetoed by handler");
            return;
        }

        self.registry
            .relay_frame(&stream_id, self.handle.id(), frame)
            .await;
    }

    async fn update_prompt(&mut self, prompt: String) {
        let Some(stream_id) = self.state.broadcast_stream().cloned() else {
            tracing::warn!(
                session_id = self.state.id,
                role = self.state.role().label(),
                "Prompt update from non-broadcaster connection dropped"
            );
            return;
        };

        if prompt.is_empty() {
            self.send_error(ProtocolError::EmptyPrompt.to_string()).await;
            return;
        }

        match self
            .registry
            .update_prompt(&stream_id, self.handle.id(), prompt.clone())
            .await
        {
            Ok(_notified) => {
                self.send(ServerMessage::PromptUpdated { prompt }).await;
            }
            Err(err) => {
                // stream vanished in a close race; nothing to update
                tracing::debug!(
                    session_id = self.state.id,
                    error = %err,
                    "Prompt update on gone stream"
                );
            }
        }
    }

    /// Cascade teardown according to the role held at close time
    async fn teardown(&mut self) {
        match self.state.close() {
            ConnectionRole::Broadcaster(stream_id) => {
                if let Some(viewers) = self
                    .registry
                    .remove_by_broadcaster(&stream_id, self.handle.id())
                    .await
                {
                    let notice = ServerMessage::StreamEnded {
                        stream_id: stream_id.clone(),
                    }
                    .encode();

                    let sends = viewers.into_iter().map(|viewer| {
                        let notice = notice.clone();
                        async move {
                            tokio::time::timeout(CONTROL_SEND_TIMEOUT, viewer.send_text(notice))
                                .await
                                .unwrap_or(false)
                        }
                    });
                    let notified = join_all(sends).await.into_iter().filter(|sent| *sent).count();
                    tracing::info!(
                        session_id = self.state.id,
                        stream = %stream_id,
                        notified,
                        "Broadcaster disconnected, stream ended"
                    );
                    self.handler.on_stream_ended(&stream_id, notified).await;
                }
            }
            ConnectionRole::Viewer(stream_id) => {
                self.registry.leave(&stream_id, self.handle.id()).await;
            }
            _ => {}
        }
        self.handler.on_disconnect(&self.ctx).await;
    }

    async fn send(&self, message: ServerMessage) {
        self.handle.send(&message).await;
    }

    async fn send_error(&self, message: impl Into<String>) {
        self.send(ServerMessage::Error {
            message: message.into(),
        })
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_path_role_broadcaster() {
        assert_eq!(
            parse_path_role("/broadcaster/abc123"),
            Some(PathRole::Broadcaster(StreamId::from("abc123")))
        );
    }

    #[test]
    fn test_parse_path_role_viewer_with_ws_prefix() {
        assert_eq!(
            parse_path_role("/ws/viewer/abc123"),
            Some(PathRole::Viewer(StreamId::from("abc123")))
        );
    }

    #[test]
    fn test_parse_path_role_rejects_other_paths() {
        assert_eq!(parse_path_role("/"), None);
        assert_eq!(parse_path_role("/broadcaster"), None);
        assert_eq!(parse_path_role("/broadcaster/a/b"), None);
        assert_eq!(parse_path_role("/spectator/abc"), None);
        assert_eq!(parse_path_role("/ws"), None);
    }

    #[test]
    fn test_handle_send_outcomes() {
        let (tx, mut rx) = mpsc::channel(1);
        let handle = ConnectionHandle::new(7, tx, Arc::new(ConnectionStats::new()));
        assert!(handle.is_open());

        assert_eq!(
            handle.try_send_frame(Utf8Bytes::from_static("a")),
            SendOutcome::Sent
        );
        assert_eq!(handle.stats().frames_sent(), 1);

        // queue full: dropped, not an error
        assert_eq!(
            handle.try_send_frame(Utf8Bytes::from_static("b")),
            SendOutcome::Dropped
        );
        assert_eq!(handle.stats().frames_sent(), 1);

        rx.close();
        while rx.try_recv().is_ok() {}
        assert_eq!(
            handle.try_send_frame(Utf8Bytes::from_static("c")),
            SendOutcome::Closed
        );
        assert!(!handle.is_open());
    }
}

//! Viewer client
//!
//! Owns a client session in the viewer role: joins the configured stream on
//! every (re)connection and surfaces relayed frames, style updates, and the
//! stream's termination notice as events.

use std::time::Duration;

use tokio::sync::mpsc;

use super::config::ClientConfig;
use super::session::{SessionEvent, SessionManager, SessionState};
use crate::error::Result;
use crate::protocol::{ClientMessage, FramePayload, ServerMessage};
use crate::registry::StreamId;

/// Events from the viewer client
#[derive(Debug)]
pub enum ViewerEvent {
    /// Connected to the relay; the join request is on its way
    Connected,

    /// Attached to the stream
    Joined(StreamId),

    /// One relayed frame
    Frame(FramePayload),

    /// The stream's style prompt changed
    StyleUpdated(String),

    /// The broadcaster is gone; the stream no longer exists
    StreamEnded(StreamId),

    /// Snapshot of active streams (response to [`ViewerClient::list_streams`])
    StreamsList(Vec<StreamId>),

    /// The relay reported a request-level error (e.g. `Stream not found`)
    ServerError(String),

    /// Connection closed
    Disconnected { clean: bool },

    /// Heartbeat liveness declared the connection dead
    ConnectionDead,

    /// A reconnect attempt is scheduled
    Reconnecting { attempt: u32, delay: Duration },
}

/// Frame-consuming client
pub struct ViewerClient {
    session: SessionManager,
    stream_id: StreamId,
}

impl ViewerClient {
    /// Connect to the relay and watch the given stream
    ///
    /// Returns the client and a receiver for [`ViewerEvent`]s. The session
    /// reconnects on failure per the config's backoff policy and re-joins
    /// the same stream each time; if the stream is gone by then, the relay's
    /// `Stream not found` arrives as [`ViewerEvent::ServerError`].
    pub fn connect(
        config: ClientConfig,
        stream_id: impl Into<StreamId>,
    ) -> (Self, mpsc::Receiver<ViewerEvent>) {
        let stream_id = stream_id.into();
        let (session, mut session_events) = SessionManager::spawn(config);
        let (event_tx, event_rx) = mpsc::channel(256);

        let pump_session = session.clone();
        let join_id = stream_id.clone();
        tokio::spawn(async move {
            while let Some(event) = session_events.recv().await {
                match event {
                    SessionEvent::Open => {
                        let _ = pump_session.send(ClientMessage::JoinStream {
                            stream_id: join_id.clone(),
                        });
                        let _ = event_tx.send(ViewerEvent::Connected).await;
                    }
                    SessionEvent::Message(message) => match message {
                        ServerMessage::JoinedStream { stream_id } => {
                            let _ = event_tx.send(ViewerEvent::Joined(stream_id)).await;
                        }
                        ServerMessage::Frame { frame, .. } => {
                            let _ = event_tx.send(ViewerEvent::Frame(frame)).await;
                        }
                        ServerMessage::StyleUpdated { prompt } => {
                            let _ = event_tx.send(ViewerEvent::StyleUpdated(prompt)).await;
                        }
                        ServerMessage::StreamEnded { stream_id } => {
                            let _ = event_tx.send(ViewerEvent::StreamEnded(stream_id)).await;
                        }
                        ServerMessage::StreamsList { streams } => {
                            let _ = event_tx.send(ViewerEvent::StreamsList(streams)).await;
                        }
                        ServerMessage::Error { message } => {
                            let _ = event_tx.send(ViewerEvent::ServerError(message)).await;
                        }
                        _ => {}
                    },
                    SessionEvent::Closed { clean } => {
                        let _ = event_tx.send(ViewerEvent::Disconnected { clean }).await;
                    }
                    SessionEvent::Dead => {
                        let _ = event_tx.send(ViewerEvent::ConnectionDead).await;
                    }
                    SessionEvent::Reconnecting { attempt, delay } => {
                        let _ = event_tx
                            .send(ViewerEvent::Reconnecting { attempt, delay })
                            .await;
                    }
                }
            }
        });

        (Self { session, stream_id }, event_rx)
    }

    /// The stream this viewer watches
    pub fn stream_id(&self) -> &StreamId {
        &self.stream_id
    }

    /// Request a snapshot of active streams
    ///
    /// The response arrives as [`ViewerEvent::StreamsList`].
    pub fn list_streams(&self) -> Result<()> {
        self.session.send(ClientMessage::ListStreams)
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// Mark the consuming surface visible or hidden
    pub fn set_visible(&self, visible: bool) {
        self.session.set_visible(visible);
    }

    /// Force a reconnect cycle now
    pub fn reconnect_now(&self) {
        self.session.reconnect_now();
    }

    /// Shut the session down for good
    pub fn close(&self) {
        self.session.shutdown();
    }
}

//! Broadcaster client
//!
//! Owns a client session in the broadcaster role: announces `start_stream`
//! on every (re)connection, pushes frames with adaptive pacing, and
//! retargets the style prompt. Each reconnection creates a fresh stream;
//! the old one died with the old connection.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, Mutex};

use super::config::ClientConfig;
use super::pacing::FramePacer;
use super::session::{SessionEvent, SessionManager, SessionState};
use crate::error::{Error, Result};
use crate::protocol::{ClientMessage, FramePayload, ServerMessage};
use crate::registry::StreamId;

/// Events from the broadcaster client
#[derive(Debug)]
pub enum BroadcastEvent {
    /// Connected to the relay; the stream announcement is on its way
    Connected,

    /// Stream created; frames may flow
    StreamCreated(StreamId),

    /// The relay acknowledged a prompt update
    PromptUpdated(String),

    /// A correlated result frame came back from the processing side
    ResultReceived(FramePayload),

    /// The relay reported a request-level error
    ServerError(String),

    /// Connection closed
    Disconnected { clean: bool },

    /// Heartbeat liveness declared the connection dead
    ConnectionDead,

    /// A reconnect attempt is scheduled
    Reconnecting { attempt: u32, delay: Duration },
}

#[derive(Debug)]
struct BroadcastShared {
    stream_id: Option<StreamId>,
    pacer: FramePacer,
    in_flight: Option<Instant>,
    last_sent_at: Option<Instant>,
}

/// Frame-producing client
pub struct BroadcasterClient {
    session: SessionManager,
    shared: Arc<Mutex<BroadcastShared>>,
}

impl BroadcasterClient {
    /// Connect to the relay and start broadcasting
    ///
    /// Returns the client and a receiver for [`BroadcastEvent`]s. The
    /// session reconnects on failure per the config's backoff policy; a new
    /// stream is announced after every reconnection.
    pub fn connect(config: ClientConfig) -> (Self, mpsc::Receiver<BroadcastEvent>) {
        let pacer = FramePacer::new(
            config.pacing_window,
            config.pacing_buffer,
            config.pacing_floor,
        );
        let (session, mut session_events) = SessionManager::spawn(config);
        let (event_tx, event_rx) = mpsc::channel(256);

        let shared = Arc::new(Mutex::new(BroadcastShared {
            stream_id: None,
            pacer,
            in_flight: None,
            last_sent_at: None,
        }));

        let pump_session = session.clone();
        let pump_shared = Arc::clone(&shared);
        tokio::spawn(async move {
            while let Some(event) = session_events.recv().await {
                match event {
                    SessionEvent::Open => {
                        let _ = pump_session.send(ClientMessage::StartStream);
                        let _ = event_tx.send(BroadcastEvent::Connected).await;
                    }
                    SessionEvent::Message(message) => match message {
                        ServerMessage::StreamCreated { stream_id } => {
                            pump_shared.lock().await.stream_id = Some(stream_id.clone());
                            let _ = event_tx.send(BroadcastEvent::StreamCreated(stream_id)).await;
                        }
                        ServerMessage::Frame { frame, .. } => {
                            let mut shared = pump_shared.lock().await;
                            if let Some(sent_at) = shared.in_flight.take() {
                                shared.pacer.record(sent_at.elapsed());
                            }
                            drop(shared);
                            let _ = event_tx.send(BroadcastEvent::ResultReceived(frame)).await;
                        }
                        ServerMessage::PromptUpdated { prompt } => {
                            let _ = event_tx.send(BroadcastEvent::PromptUpdated(prompt)).await;
                        }
                        ServerMessage::Error { message } => {
                            let _ = event_tx.send(BroadcastEvent::ServerError(message)).await;
                        }
                        _ => {}
                    },
                    SessionEvent::Closed { clean } => {
                        let mut shared = pump_shared.lock().await;
                        shared.stream_id = None;
                        shared.in_flight = None;
                        drop(shared);
                        let _ = event_tx.send(BroadcastEvent::Disconnected { clean }).await;
                    }
                    SessionEvent::Dead => {
                        let mut shared = pump_shared.lock().await;
                        shared.stream_id = None;
                        shared.in_flight = None;
                        drop(shared);
                        let _ = event_tx.send(BroadcastEvent::ConnectionDead).await;
                    }
                    SessionEvent::Reconnecting { attempt, delay } => {
                        let _ = event_tx
                            .send(BroadcastEvent::Reconnecting { attempt, delay })
                            .await;
                    }
                }
            }
        });

        (Self { session, shared }, event_rx)
    }

    /// Push one frame, honoring the adaptive inter-frame delay
    ///
    /// Sleeps out whatever remains of the pacer's recommended delay since
    /// the previous send, then queues the frame on the current stream.
    pub async fn send_frame(&self, frame: FramePayload) -> Result<()> {
        let wait = {
            let shared = self.shared.lock().await;
            shared.last_sent_at.and_then(|last| {
                shared.pacer.delay().checked_sub(last.elapsed())
            })
        };
        if let Some(wait) = wait {
            tokio::time::sleep(wait).await;
        }

        let stream_id = {
            let shared = self.shared.lock().await;
            shared.stream_id.clone().ok_or(Error::NotReady)?
        };

        self.session.send(ClientMessage::Frame { stream_id, frame })?;

        let mut shared = self.shared.lock().await;
        let now = Instant::now();
        shared.last_sent_at = Some(now);
        // measure to the next correlated result; one probe at a time
        shared.in_flight.get_or_insert(now);
        Ok(())
    }

    /// Retarget the stream's style prompt
    pub fn update_prompt(&self, prompt: impl Into<String>) -> Result<()> {
        self.session.send(ClientMessage::UpdatePrompt {
            prompt: prompt.into(),
        })
    }

    /// Feed the pacer an externally measured round trip
    ///
    /// For deployments where results arrive on a separate viewer connection
    /// rather than echoed on this one.
    pub async fn record_round_trip(&self, round_trip: Duration) {
        self.shared.lock().await.pacer.record(round_trip);
    }

    /// The pacer's current recommended inter-frame delay
    pub async fn recommended_delay(&self) -> Duration {
        self.shared.lock().await.pacer.delay()
    }

    /// Identifier of the currently announced stream, if any
    pub async fn stream_id(&self) -> Option<StreamId> {
        self.shared.lock().await.stream_id.clone()
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// Mark the producing surface visible or hidden
    pub fn set_visible(&self, visible: bool) {
        self.session.set_visible(visible);
    }

    /// Shut the session down for good
    pub fn close(&self) {
        self.session.shutdown();
    }
}

//! Client session manager
//!
//! One reusable connect/reconnect state machine, instantiated per role by
//! the broadcaster and viewer clients. The manager owns the socket on a
//! spawned task and is observed through an event channel; commands flow the
//! other way. Reconnection policy:
//!
//! - a clean close while frames were recently flowing is left alone (the
//!   periodic health check acts as the safety net);
//! - any other close retries with exponential backoff, capped;
//! - reconnection is suspended while the consumer is not visible and
//!   resumes immediately on visibility;
//! - unanswered application heartbeats proactively declare the connection
//!   dead and trigger the same retry path.

use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::time::interval;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use super::config::ClientConfig;
use super::heartbeat::HeartbeatMonitor;
use crate::error::{Error, Result};
use crate::protocol::{ClientMessage, ServerMessage};

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No connection and none in progress
    Disconnected,
    /// Connection attempt in flight
    Connecting,
    /// Connected and exchanging messages
    Open,
    /// Graceful shutdown in progress
    Closing,
    /// Last connection attempt failed
    ErrorState,
}

/// Events emitted by the session task
#[derive(Debug)]
pub enum SessionEvent {
    /// Connection established
    Open,
    /// Decoded message from the relay
    Message(ServerMessage),
    /// Connection closed; `clean` when the peer said goodbye properly
    Closed { clean: bool },
    /// Heartbeat liveness declared the connection dead
    Dead,
    /// A reconnect attempt is scheduled
    Reconnecting { attempt: u32, delay: Duration },
}

#[derive(Debug)]
enum Command {
    Send(ClientMessage),
    SetVisible(bool),
    Reconnect,
    Shutdown,
}

/// Handle to a running client session
///
/// Cheap to clone; all clones drive the same session task.
#[derive(Debug, Clone)]
pub struct SessionManager {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<SessionState>,
}

impl SessionManager {
    /// Spawn a session task for the given configuration
    ///
    /// Returns the manager handle and the event stream. The task connects
    /// immediately and keeps the session alive until [`shutdown`] is called
    /// or every handle and the event receiver are gone.
    ///
    /// [`shutdown`]: SessionManager::shutdown
    pub fn spawn(config: ClientConfig) -> (Self, mpsc::Receiver<SessionEvent>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(256);
        let (state_tx, state_rx) = watch::channel(SessionState::Disconnected);

        let runner = Runner {
            config,
            commands: command_rx,
            events: event_tx,
            state: state_tx,
            visible: true,
            attempt: 0,
            last_frame_at: None,
        };
        tokio::spawn(runner.run());

        (
            Self {
                commands: command_tx,
                state: state_rx,
            },
            event_rx,
        )
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Whether the session is currently open
    pub fn is_open(&self) -> bool {
        self.state() == SessionState::Open
    }

    /// Queue a message for the relay
    ///
    /// Fails when the session is not open or the task has shut down.
    pub fn send(&self, message: ClientMessage) -> Result<()> {
        if !self.is_open() {
            return Err(Error::NotConnected);
        }
        self.commands
            .send(Command::Send(message))
            .map_err(|_| Error::SessionClosed)
    }

    /// Mark the consuming surface visible or hidden
    ///
    /// Reconnection is suspended while hidden and re-attempted immediately
    /// on becoming visible. An open connection is left untouched.
    pub fn set_visible(&self, visible: bool) {
        let _ = self.commands.send(Command::SetVisible(visible));
    }

    /// Force a reconnect cycle now
    pub fn reconnect_now(&self) {
        let _ = self.commands.send(Command::Reconnect);
    }

    /// Shut the session down for good
    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
    }
}

/// Whether a closed session should reconnect on its own
///
/// A normal closure while frames were recently flowing is benign; anything
/// else retries.
pub(crate) fn should_auto_reconnect(
    clean_close: bool,
    last_frame_age: Option<Duration>,
    grace: Duration,
) -> bool {
    !(clean_close && last_frame_age.is_some_and(|age| age <= grace))
}

enum DriveOutcome {
    Closed { clean: bool },
    Dead,
    Shutdown,
}

struct Runner {
    config: ClientConfig,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::Sender<SessionEvent>,
    state: watch::Sender<SessionState>,
    visible: bool,
    attempt: u32,
    last_frame_at: Option<Instant>,
}

impl Runner {
    fn set_state(&self, state: SessionState) {
        let _ = self.state.send(state);
    }

    async fn run(mut self) {
        loop {
            if !self.visible && !self.wait_for_visibility().await {
                break;
            }

            self.set_state(SessionState::Connecting);
            match connect_async(self.config.url.as_str()).await {
                Ok((ws, _response)) => {
                    self.set_state(SessionState::Open);
                    let _ = self.events.send(SessionEvent::Open).await;

                    let outcome = self.drive(ws).await;
                    self.set_state(SessionState::Disconnected);

                    match outcome {
                        DriveOutcome::Shutdown => break,
                        DriveOutcome::Dead => {
                            let _ = self.events.send(SessionEvent::Dead).await;
                            if !self.backoff_wait().await {
                                break;
                            }
                        }
                        DriveOutcome::Closed { clean } => {
                            let _ = self.events.send(SessionEvent::Closed { clean }).await;
                            let age = self.last_frame_at.map(|at| at.elapsed());
                            if should_auto_reconnect(clean, age, self.config.recent_frame_grace) {
                                if !self.backoff_wait().await {
                                    break;
                                }
                            } else if !self.park().await {
                                break;
                            }
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(url = %self.config.url, error = %err, "Connect failed");
                    self.set_state(SessionState::ErrorState);
                    if !self.backoff_wait().await {
                        break;
                    }
                }
            }
        }
        self.set_state(SessionState::Disconnected);
    }

    /// Run one open connection to completion
    async fn drive(
        &mut self,
        ws: tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
    ) -> DriveOutcome {
        let (mut sink, mut stream) = ws.split();
        let mut monitor = HeartbeatMonitor::new(self.config.heartbeat_miss_threshold);
        let mut heartbeat = interval(self.config.heartbeat_interval);
        heartbeat.tick().await; // immediate first tick carries no information
        let mut first_message_seen = false;

        loop {
            tokio::select! {
                incoming = stream.next() => match incoming {
                    Some(Ok(Message::Text(text))) => {
                        monitor.on_message();
                        if !first_message_seen {
                            // the reconnect counter resets only once the new
                            // connection has proven itself
                            first_message_seen = true;
                            self.attempt = 0;
                        }
                        match ServerMessage::decode(text.as_str()) {
                            Ok(message) => {
                                if matches!(message, ServerMessage::Frame { .. }) {
                                    self.last_frame_at = Some(Instant::now());
                                }
                                let _ = self.events.send(SessionEvent::Message(message)).await;
                            }
                            Err(err) => {
                                tracing::debug!(error = %err, "Undecodable message from relay");
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        monitor.on_message();
                        if sink.send(Message::Pong(data)).await.is_err() {
                            return DriveOutcome::Closed { clean: false };
                        }
                    }
                    Some(Ok(Message::Pong(_))) => monitor.on_message(),
                    Some(Ok(Message::Close(_))) => {
                        return DriveOutcome::Closed { clean: true };
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        tracing::debug!(error = %err, "Session transport error");
                        return DriveOutcome::Closed { clean: false };
                    }
                    None => return DriveOutcome::Closed { clean: false },
                },
                command = self.commands.recv() => match command {
                    Some(Command::Send(message)) => {
                        if sink.send(Message::Text(message.encode())).await.is_err() {
                            return DriveOutcome::Closed { clean: false };
                        }
                    }
                    Some(Command::SetVisible(visible)) => {
                        // visibility only affects reconnection; an open
                        // session keeps flowing while hidden
                        self.visible = visible;
                    }
                    Some(Command::Reconnect) => {
                        let _ = sink.send(Message::Close(None)).await;
                        return DriveOutcome::Closed { clean: false };
                    }
                    Some(Command::Shutdown) | None => {
                        self.set_state(SessionState::Closing);
                        let _ = sink.send(Message::Close(None)).await;
                        return DriveOutcome::Shutdown;
                    }
                },
                _ = heartbeat.tick() => {
                    if sink.send(Message::Text(ClientMessage::Ping.encode())).await.is_err() {
                        return DriveOutcome::Closed { clean: false };
                    }
                    let missed = monitor.on_ping_sent();
                    if monitor.is_dead() {
                        tracing::warn!(missed, "Heartbeat timeout, declaring connection dead");
                        let _ = sink.send(Message::Close(None)).await;
                        return DriveOutcome::Dead;
                    }
                }
            }
        }
    }

    /// Wait out the backoff delay; false to stop the session for good
    async fn backoff_wait(&mut self) -> bool {
        let delay = self.config.backoff.delay(self.attempt);
        let _ = self
            .events
            .send(SessionEvent::Reconnecting {
                attempt: self.attempt,
                delay,
            })
            .await;
        tracing::debug!(attempt = self.attempt, delay_ms = delay.as_millis() as u64, "Reconnect scheduled");
        self.attempt = self.attempt.saturating_add(1);

        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                command = self.commands.recv() => match command {
                    Some(Command::SetVisible(visible)) => {
                        let was_visible = self.visible;
                        self.visible = visible;
                        if visible && !was_visible {
                            return true;
                        }
                    }
                    Some(Command::Reconnect) => return true,
                    Some(Command::Send(_)) => {
                        tracing::debug!("Dropping send while disconnected");
                    }
                    Some(Command::Shutdown) | None => return false,
                }
            }
        }
    }

    /// Idle after a benign close; the health check is the safety net
    async fn park(&mut self) -> bool {
        tracing::debug!("Clean close with recent frames; waiting for health check");
        let mut health = interval(self.config.health_check_interval);
        health.tick().await; // immediate first tick carries no information

        loop {
            tokio::select! {
                _ = health.tick() => {
                    // the session is neither open nor connecting here, so
                    // the check debounces into a reconnect unless the
                    // surface is hidden
                    if self.visible {
                        return true;
                    }
                }
                command = self.commands.recv() => match command {
                    Some(Command::Reconnect) => return true,
                    Some(Command::SetVisible(visible)) => self.visible = visible,
                    Some(Command::Send(_)) => {
                        tracing::debug!("Dropping send while disconnected");
                    }
                    Some(Command::Shutdown) | None => return false,
                }
            }
        }
    }

    /// Block reconnection until the surface becomes visible again
    async fn wait_for_visibility(&mut self) -> bool {
        tracing::debug!("Reconnection suspended while hidden");
        while let Some(command) = self.commands.recv().await {
            match command {
                Command::SetVisible(true) => {
                    self.visible = true;
                    return true;
                }
                Command::SetVisible(false) => {}
                Command::Reconnect => {
                    tracing::debug!("Reconnect request ignored while hidden");
                }
                Command::Send(_) => {
                    tracing::debug!("Dropping send while disconnected");
                }
                Command::Shutdown => return false,
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_auto_reconnect_matrix() {
        let grace = Duration::from_secs(5);

        // abnormal closes always reconnect
        assert!(should_auto_reconnect(false, None, grace));
        assert!(should_auto_reconnect(
            false,
            Some(Duration::from_secs(1)),
            grace
        ));

        // clean close with no frames ever seen reconnects
        assert!(should_auto_reconnect(true, None, grace));

        // clean close with stale frames reconnects
        assert!(should_auto_reconnect(
            true,
            Some(Duration::from_secs(60)),
            grace
        ));

        // clean close mid-flow is left alone
        assert!(!should_auto_reconnect(
            true,
            Some(Duration::from_secs(1)),
            grace
        ));
    }

    #[tokio::test]
    async fn test_manager_rejects_send_when_disconnected() {
        // unroutable address: the runner stays in the retry loop
        let config = ClientConfig::new("ws://127.0.0.1:9");
        let (manager, _events) = SessionManager::spawn(config);

        assert!(!manager.is_open());
        let err = manager.send(ClientMessage::Ping).unwrap_err();
        assert!(matches!(err, Error::NotConnected));

        manager.shutdown();
    }
}

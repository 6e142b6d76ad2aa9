//! Statistics and metrics for relay connections and streams

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Per-connection counters
///
/// Shared through `Arc` between the connection task and the registry, so the
/// counters are atomics. Direction is from the relay's point of view:
/// `frames_sent` counts frames queued toward the peer.
#[derive(Debug)]
pub struct ConnectionStats {
    /// Frames queued toward this connection
    frames_sent: AtomicU64,

    /// Frames received from this connection
    frames_received: AtomicU64,

    /// Messages of any kind received from this connection
    messages_received: AtomicU64,

    /// When the connection was accepted
    connected_at: Instant,
}

impl ConnectionStats {
    /// Create a new counter set
    pub fn new() -> Self {
        Self {
            frames_sent: AtomicU64::new(0),
            frames_received: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            connected_at: Instant::now(),
        }
    }

    pub(crate) fn record_frame_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_frame_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Frames queued toward the peer
    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::Relaxed)
    }

    /// Frames received from the peer
    pub fn frames_received(&self) -> u64 {
        self.frames_received.load(Ordering::Relaxed)
    }

    /// Messages of any kind received from the peer
    pub fn messages_received(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }

    /// Connection age
    pub fn duration(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl Default for ConnectionStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of one stream's state
#[derive(Debug, Clone)]
pub struct StreamStats {
    /// Stream identifier token
    pub stream_id: String,

    /// Number of currently attached viewers
    pub viewer_count: usize,

    /// Frames fanned out since creation
    pub frames_relayed: u64,

    /// Whether a style prompt is set
    pub has_style_prompt: bool,

    /// Age of the stream
    pub age: Duration,
}

/// Server-wide snapshot
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    /// Total connections ever accepted
    pub total_connections: u64,

    /// Currently open connections
    pub active_connections: u64,

    /// Currently registered streams
    pub active_streams: u64,
}

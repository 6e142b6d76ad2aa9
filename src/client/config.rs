//! Client configuration

use std::time::Duration;

use super::backoff::BackoffPolicy;
use super::pacing;

/// Client session configuration options
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket URL of the relay (e.g. `ws://127.0.0.1:8090`)
    pub url: String,

    /// Application-level heartbeat period
    pub heartbeat_interval: Duration,

    /// Missed heartbeats tolerated before declaring the connection dead
    pub heartbeat_miss_threshold: u32,

    /// Reconnection backoff policy
    pub backoff: BackoffPolicy,

    /// Period of the independent connection health check
    pub health_check_interval: Duration,

    /// A clean close within this window of the last received frame skips
    /// automatic reconnection
    pub recent_frame_grace: Duration,

    /// Pacing rolling-window length (broadcaster side)
    pub pacing_window: usize,

    /// Fixed buffer added to the pacing window mean
    pub pacing_buffer: Duration,

    /// Lower bound on the inter-frame delay
    pub pacing_floor: Duration,
}

impl ClientConfig {
    /// Create a config for the given relay URL with default timings
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            heartbeat_interval: Duration::from_secs(10),
            heartbeat_miss_threshold: 3,
            backoff: BackoffPolicy::default(),
            health_check_interval: Duration::from_secs(30),
            recent_frame_grace: Duration::from_secs(5),
            pacing_window: pacing::DEFAULT_WINDOW,
            pacing_buffer: pacing::DEFAULT_BUFFER,
            pacing_floor: pacing::DEFAULT_FLOOR,
        }
    }

    /// Set the heartbeat period
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Set the missed-heartbeat threshold
    pub fn heartbeat_miss_threshold(mut self, threshold: u32) -> Self {
        self.heartbeat_miss_threshold = threshold;
        self
    }

    /// Set the backoff policy
    pub fn backoff(mut self, policy: BackoffPolicy) -> Self {
        self.backoff = policy;
        self
    }

    /// Set the health-check period
    pub fn health_check_interval(mut self, interval: Duration) -> Self {
        self.health_check_interval = interval;
        self
    }

    /// Set the recent-frame grace window
    pub fn recent_frame_grace(mut self, grace: Duration) -> Self {
        self.recent_frame_grace = grace;
        self
    }

    /// Set the pacing parameters
    pub fn pacing(mut self, window: usize, buffer: Duration, floor: Duration) -> Self {
        self.pacing_window = window;
        self.pacing_buffer = buffer;
        self.pacing_floor = floor;
        self
    }
}

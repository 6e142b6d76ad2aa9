//! Server configuration

use std::net::SocketAddr;
use std::time::Duration;

/// Default cap on a single frame payload, mirroring the managed deployment's
/// transport message limit.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 2 * 1024 * 1024;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,

    /// Maximum accepted frame payload size in bytes
    pub max_frame_bytes: usize,

    /// Per-connection outbound queue depth; a full queue drops frames for
    /// that viewer (latest frame wins)
    pub outbound_queue: usize,

    /// Transport keep-alive ping period
    pub keepalive_interval: Duration,

    /// Idle timeout (disconnect if nothing is received)
    pub idle_timeout: Duration,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8090".parse().unwrap(),
            max_connections: 0, // Unlimited
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            outbound_queue: 64,
            keepalive_interval: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(90),
            tcp_nodelay: true, // Important for low latency
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the frame payload size cap
    pub fn max_frame_bytes(mut self, max: usize) -> Self {
        self.max_frame_bytes = max;
        self
    }

    /// Set the per-connection outbound queue depth
    pub fn outbound_queue(mut self, depth: usize) -> Self {
        self.outbound_queue = depth.max(1);
        self
    }

    /// Set the keep-alive ping period
    pub fn keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }

    /// Set the idle timeout
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }
}

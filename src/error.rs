//! Library error types
//!
//! The taxonomy follows the failure domains of the relay: protocol errors are
//! reported to the offending peer and the connection survives; registry errors
//! are reported to the caller with no side effect; transport errors are fatal
//! to the connection that raised them and never to the process.

use thiserror::Error;

use crate::protocol::ProtocolError;
use crate::registry::RegistryError;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug, Error)]
pub enum Error {
    /// Underlying socket I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket transport failure (handshake or framing)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Malformed or invalid protocol message
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Stream registry operation failure
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The client session is not connected
    #[error("session is not connected")]
    NotConnected,

    /// The client session has no identified stream yet
    #[error("session has not identified a stream")]
    NotReady,

    /// The client session task has shut down
    #[error("session closed")]
    SessionClosed,
}

//! Registry error types

use thiserror::Error;

use super::id::StreamId;

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    /// Stream not found
    #[error("Stream not found: {0}")]
    StreamNotFound(StreamId),

    /// Stream identifier already claimed by an open broadcaster
    #[error("Stream already active: {0}")]
    StreamAlreadyActive(StreamId),

    /// Caller is not the stream's registered broadcaster
    #[error("Not the broadcaster of stream: {0}")]
    NotBroadcaster(StreamId),
}

//! Protocol error types
//!
//! Produced at the decode/validation boundary. A protocol error is never
//! fatal: it is reported to the sender as an `error` message and the
//! connection stays open. Malformed input from one caller must not terminate
//! a healthy connection.

use thiserror::Error;

/// Error type for message decoding and validation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtocolError {
    /// Not valid JSON, missing `type`, or missing a required field
    #[error("invalid message: {0}")]
    Malformed(String),

    /// `type` field names no known message kind
    #[error("unknown message type `{0}`")]
    UnknownType(String),

    /// Frame payload was empty
    #[error("empty frame payload")]
    EmptyFrame,

    /// Frame payload exceeds the configured size cap
    #[error("frame payload of {size} bytes exceeds the {limit} byte limit")]
    FrameTooLarge { size: usize, limit: usize },

    /// Prompt update carried an empty prompt
    #[error("empty prompt")]
    EmptyPrompt,

    /// A role transition was attempted on an already-identified connection
    #[error("connection already identified")]
    AlreadyIdentified,
}

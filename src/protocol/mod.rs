//! Wire protocol for the frame relay
//!
//! Structured JSON text messages with a `type` discriminator, modeled as two
//! direction-specific tagged unions and decoded exhaustively at the
//! connection boundary. Frame payloads are opaque data-URL strings; the relay
//! forwards them verbatim and never inspects their content.

pub mod error;
pub mod message;

pub use error::ProtocolError;
pub use message::{ClientMessage, FramePayload, ServerMessage};

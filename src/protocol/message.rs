//! Wire message types
//!
//! All traffic is JSON text frames with a `type` discriminator. The two
//! directions carry different information, so client-to-server and
//! server-to-client messages are distinct enums; sending a server-only
//! message from a client is a compile-time error.
//!
//! Decoding is exhaustive at this boundary: an unknown tag, a missing `type`
//! field, or a structurally invalid body becomes a [`ProtocolError`] before
//! any handler logic sees the message. Stream identifiers travel as
//! `"streamId"`; the remaining field names are snake_case.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_tungstenite::tungstenite::Utf8Bytes;

use super::error::ProtocolError;
use crate::registry::StreamId;

/// One relayed image frame plus its transparent metadata
///
/// The `frame` string is a self-contained data URL
/// (`data:image/jpeg;base64,...`). The relay never inspects it; the optional
/// flags exist for the external processing collaborator and ride along
/// untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FramePayload {
    /// Encoded image payload (data URL with embedded mime marker)
    pub frame: String,

    /// Producer- or relay-stamped Unix timestamp in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,

    /// Whether the frame has passed through the processing backend
    #[serde(default, skip_serializing_if = "is_false")]
    pub processed: bool,

    /// Which processor produced the frame
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processor_type: Option<String>,

    /// Style prompt in effect when the frame was produced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style_prompt: Option<String>,
}

fn is_false(flag: &bool) -> bool {
    !*flag
}

impl FramePayload {
    /// Create a payload from an encoded image string
    pub fn new(frame: impl Into<String>) -> Self {
        Self {
            frame: frame.into(),
            timestamp: None,
            processed: false,
            processor_type: None,
            style_prompt: None,
        }
    }

    /// Set the producer timestamp
    pub fn with_timestamp(mut self, timestamp: f64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Whether the payload carries a data-URL mime marker
    pub fn has_mime_marker(&self) -> bool {
        self.frame.starts_with("data:") && self.frame.contains(";base64,")
    }

    /// Validate the payload against the relay's acceptance rules
    pub fn validate(&self, max_bytes: usize) -> Result<(), ProtocolError> {
        if self.frame.is_empty() {
            return Err(ProtocolError::EmptyFrame);
        }
        if self.frame.len() > max_bytes {
            return Err(ProtocolError::FrameTooLarge {
                size: self.frame.len(),
                limit: max_bytes,
            });
        }
        Ok(())
    }

    /// Stamp the relay timestamp if the producer did not
    pub(crate) fn stamped(mut self) -> Self {
        if self.timestamp.is_none() {
            self.timestamp = Some(unix_timestamp());
        }
        self
    }
}

/// Current Unix time in seconds
pub(crate) fn unix_timestamp() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Messages a client may send to the relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Claim the broadcaster role and create a stream
    StartStream,

    /// Claim the viewer role and attach to an existing stream
    JoinStream {
        #[serde(rename = "streamId")]
        stream_id: StreamId,
    },

    /// Push one frame for fan-out (broadcaster only)
    Frame {
        #[serde(rename = "streamId")]
        stream_id: StreamId,
        #[serde(flatten)]
        frame: FramePayload,
    },

    /// Retarget the stream's style prompt (broadcaster only)
    UpdatePrompt { prompt: String },

    /// Request a snapshot of active stream identifiers
    ListStreams,

    /// Application-level heartbeat probe
    Ping,
}

const CLIENT_MESSAGE_TYPES: &[&str] = &[
    "start_stream",
    "join_stream",
    "frame",
    "update_prompt",
    "list_streams",
    "ping",
];

/// Messages the relay may send to a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Stream created; the sender is now its broadcaster
    StreamCreated {
        #[serde(rename = "streamId")]
        stream_id: StreamId,
    },

    /// Attached to the stream; the sender is now a viewer
    JoinedStream {
        #[serde(rename = "streamId")]
        stream_id: StreamId,
    },

    /// One relayed frame
    Frame {
        #[serde(rename = "streamId")]
        stream_id: StreamId,
        #[serde(flatten)]
        frame: FramePayload,
    },

    /// Snapshot of active stream identifiers
    StreamsList { streams: Vec<StreamId> },

    /// One-time termination notice: the broadcaster is gone
    StreamEnded {
        #[serde(rename = "streamId")]
        stream_id: StreamId,
    },

    /// Prompt update acknowledged (to the broadcaster)
    PromptUpdated { prompt: String },

    /// Stream's style prompt changed (to viewers)
    StyleUpdated { prompt: String },

    /// Heartbeat response
    Pong,

    /// Request-level failure; the connection remains usable
    Error { message: String },
}

const SERVER_MESSAGE_TYPES: &[&str] = &[
    "stream_created",
    "joined_stream",
    "frame",
    "streams_list",
    "stream_ended",
    "prompt_updated",
    "style_updated",
    "pong",
    "error",
];

fn decode_tagged<T: serde::de::DeserializeOwned>(
    text: &str,
    known: &[&str],
) -> Result<T, ProtocolError> {
    let value: Value =
        serde_json::from_str(text).map_err(|err| ProtocolError::Malformed(err.to_string()))?;
    let tag = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| ProtocolError::Malformed("missing `type` field".into()))?
        .to_owned();
    if !known.contains(&tag.as_str()) {
        return Err(ProtocolError::UnknownType(tag));
    }
    serde_json::from_value(value).map_err(|err| ProtocolError::Malformed(err.to_string()))
}

fn encode_tagged<T: Serialize>(message: &T) -> Utf8Bytes {
    // These enums serialize infallibly; serde_json only errors on non-string
    // map keys or failing Serialize impls.
    match serde_json::to_string(message) {
        Ok(json) => Utf8Bytes::from(json),
        Err(err) => {
            tracing::error!(error = %err, "message serialization failed");
            Utf8Bytes::from_static(r#"{"type":"error","message":"serialization failure"}"#)
        }
    }
}

impl ClientMessage {
    /// Decode a client message from a JSON text frame
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        decode_tagged(text, CLIENT_MESSAGE_TYPES)
    }

    /// Encode to a JSON text frame payload
    ///
    /// The returned bytes are reference-counted; cloning them is cheap.
    pub fn encode(&self) -> Utf8Bytes {
        encode_tagged(self)
    }
}

impl ServerMessage {
    /// Decode a server message from a JSON text frame
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        decode_tagged(text, SERVER_MESSAGE_TYPES)
    }

    /// Encode to a JSON text frame payload
    ///
    /// Fan-out serializes a frame once and clones the returned bytes per
    /// viewer; the clones share one allocation.
    pub fn encode(&self) -> Utf8Bytes {
        encode_tagged(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_start_stream() {
        let msg = ClientMessage::decode(r#"{"type":"start_stream"}"#).unwrap();
        assert_eq!(msg, ClientMessage::StartStream);
    }

    #[test]
    fn test_decode_join_stream_camel_case_id() {
        let msg = ClientMessage::decode(r#"{"type":"join_stream","streamId":"S"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::JoinStream {
                stream_id: StreamId::from("S")
            }
        );
    }

    #[test]
    fn test_decode_frame_with_flags() {
        let text = r#"{"type":"frame","streamId":"S","frame":"data:image/jpeg;base64,AAAA","timestamp":12.5,"processor_type":"lightning"}"#;
        let msg = ClientMessage::decode(text).unwrap();
        match msg {
            ClientMessage::Frame { stream_id, frame } => {
                assert_eq!(stream_id.as_str(), "S");
                assert_eq!(frame.frame, "data:image/jpeg;base64,AAAA");
                assert_eq!(frame.timestamp, Some(12.5));
                assert!(!frame.processed);
                assert_eq!(frame.processor_type.as_deref(), Some("lightning"));
                assert!(frame.has_mime_marker());
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_decode_frame_missing_required_field() {
        let err = ClientMessage::decode(r#"{"type":"frame","streamId":"S"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn test_decode_unknown_type() {
        let err = ClientMessage::decode(r#"{"type":"warp_drive"}"#).unwrap_err();
        match err {
            ProtocolError::UnknownType(tag) => assert_eq!(tag, "warp_drive"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_decode_missing_type_field() {
        let err = ClientMessage::decode(r#"{"streamId":"S"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn test_decode_not_json() {
        let err = ClientMessage::decode("not json at all").unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn test_encode_stream_created_wire_shape() {
        let msg = ServerMessage::StreamCreated {
            stream_id: StreamId::from("abc"),
        };
        let json: Value = serde_json::from_str(msg.encode().as_str()).unwrap();
        assert_eq!(json["type"], "stream_created");
        assert_eq!(json["streamId"], "abc");
    }

    #[test]
    fn test_encode_frame_flattens_payload() {
        let msg = ServerMessage::Frame {
            stream_id: StreamId::from("S"),
            frame: FramePayload::new("data:image/jpeg;base64,BBBB").with_timestamp(7.0),
        };
        let json: Value = serde_json::from_str(msg.encode().as_str()).unwrap();
        assert_eq!(json["type"], "frame");
        assert_eq!(json["streamId"], "S");
        assert_eq!(json["frame"], "data:image/jpeg;base64,BBBB");
        assert_eq!(json["timestamp"], 7.0);
        // absent flags stay off the wire
        assert!(json.get("processor_type").is_none());
    }

    #[test]
    fn test_server_message_roundtrip() {
        let messages = vec![
            ServerMessage::JoinedStream {
                stream_id: StreamId::from("S"),
            },
            ServerMessage::StreamsList {
                streams: vec![StreamId::from("a"), StreamId::from("b")],
            },
            ServerMessage::StreamEnded {
                stream_id: StreamId::from("S"),
            },
            ServerMessage::StyleUpdated {
                prompt: "oil painting".into(),
            },
            ServerMessage::Pong,
            ServerMessage::Error {
                message: "Stream not found".into(),
            },
        ];
        for msg in messages {
            let back = ServerMessage::decode(msg.encode().as_str()).unwrap();
            assert_eq!(back, msg);
        }
    }

    #[test]
    fn test_validate_empty_frame() {
        let err = FramePayload::new("").validate(1024).unwrap_err();
        assert!(matches!(err, ProtocolError::EmptyFrame));
    }

    #[test]
    fn test_validate_oversized_frame() {
        let payload = FramePayload::new("x".repeat(32));
        let err = payload.validate(16).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::FrameTooLarge { size: 32, limit: 16 }
        ));
        assert!(payload.validate(32).is_ok());
    }

    #[test]
    fn test_stamped_fills_missing_timestamp() {
        let stamped = FramePayload::new("data:image/jpeg;base64,AA").stamped();
        assert!(stamped.timestamp.is_some());

        let kept = FramePayload::new("data:image/jpeg;base64,AA")
            .with_timestamp(1.0)
            .stamped();
        assert_eq!(kept.timestamp, Some(1.0));
    }
}

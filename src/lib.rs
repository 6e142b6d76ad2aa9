//! # relay-rs
//!
//! WebSocket frame relay client/server library.
//!
//! One broadcaster pushes a continuous sequence of encoded image frames per
//! stream; the relay fans each frame out to that stream's viewers with
//! latest-frame-wins semantics. Nothing is persisted and no frame is
//! guaranteed: the design goal is minimal end-to-end delay with automatic
//! recovery from transient network failure.
//!
//! ## Server
//!
//! ```no_run
//! use relay_rs::{DefaultRelayHandler, RelayServer, ServerConfig};
//!
//! # async fn example() -> relay_rs::Result<()> {
//! let server = RelayServer::new(ServerConfig::default(), DefaultRelayHandler);
//! server.run().await
//! # }
//! ```
//!
//! ## Clients
//!
//! ```no_run
//! use relay_rs::client::{BroadcasterClient, ClientConfig, ViewerClient};
//! use relay_rs::protocol::FramePayload;
//!
//! # async fn example() -> relay_rs::Result<()> {
//! let (broadcaster, _events) =
//!     BroadcasterClient::connect(ClientConfig::new("ws://127.0.0.1:8090"));
//! broadcaster
//!     .send_frame(FramePayload::new("data:image/jpeg;base64,...."))
//!     .await?;
//!
//! let (_viewer, _viewer_events) =
//!     ViewerClient::connect(ClientConfig::new("ws://127.0.0.1:8090"), "some-stream-id");
//! # Ok(())
//! # }
//! ```
//!
//! ## Protocol
//!
//! All traffic is JSON text messages with a `type` discriminator; see
//! [`protocol`] for the full tagged-union contract. Frame payloads are
//! opaque data-URL strings relayed verbatim.

pub mod client;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;
pub mod stats;

pub use client::{BroadcasterClient, ClientConfig, SessionManager, ViewerClient};
pub use error::{Error, Result};
pub use protocol::{ClientMessage, FramePayload, ProtocolError, ServerMessage};
pub use registry::{RegistryError, StreamId, StreamRegistry};
pub use server::{ConnectionContext, DefaultRelayHandler, RelayHandler, RelayServer, ServerConfig};

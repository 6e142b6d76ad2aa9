//! Relay server
//!
//! Accept loop, per-connection protocol driver, and the event hook trait.
//! The server is single-purpose: negotiate a role for each connection, fan
//! frames from broadcasters to viewers, and cascade teardown on close. No
//! error on one connection ever takes the process down.

pub mod config;
pub mod connection;
pub mod handler;
pub mod listener;

pub use config::ServerConfig;
pub use connection::ConnectionHandle;
pub use handler::{ConnectionContext, DefaultRelayHandler, RelayHandler};
pub use listener::RelayServer;

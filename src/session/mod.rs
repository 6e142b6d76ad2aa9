//! Per-connection session state
//!
//! The role state machine for relay connections. Transport concerns live in
//! `server::connection`; this module is pure state and unit-testable.

pub mod state;

pub use state::{ConnectionRole, ConnectionState};

//! Diagnostics counters
//!
//! Plain counter structs, no export layer. Per-connection counters are
//! atomics shared through `Arc`; stream and server figures are snapshots
//! assembled on request.

pub mod metrics;

pub use metrics::{ConnectionStats, ServerStats, StreamStats};

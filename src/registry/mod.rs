//! Stream registry for broadcaster-to-viewers routing
//!
//! The registry manages active streams and routes frames from each stream's
//! broadcaster to its viewers. It is the sole owner of stream lifetime: a
//! stream exists if and only if its broadcaster connection is open.
//!
//! # Architecture
//!
//! ```text
//!                      Arc<StreamRegistry>
//!                 ┌──────────────────────────┐
//!                 │ streams: HashMap<Id,     │
//!                 │   StreamEntry {          │
//!                 │     broadcaster,         │
//!                 │     viewers: {id → tx},  │
//!                 │     style_prompt,        │
//!                 │   }                      │
//!                 │ >                        │
//!                 └────────────┬─────────────┘
//!                              │
//!        ┌─────────────────────┼─────────────────────┐
//!        │                     │                     │
//!        ▼                     ▼                     ▼
//!   [Broadcaster]         [Viewer]              [Viewer]
//!   relay_frame()         outbound queue        outbound queue
//!        │                     │                     │
//!        └──► serialize once ──► clone payload ──► WebSocket
//! ```
//!
//! # Zero-Copy Design
//!
//! Each frame is serialized exactly once into a refcounted text payload
//! (`Utf8Bytes`); the per-viewer clones share one allocation, so fan-out cost
//! is reference counting plus a queue push per viewer.

pub mod entry;
pub mod error;
pub mod id;
pub mod store;

pub use entry::StreamEntry;
pub use error::RegistryError;
pub use id::StreamId;
pub use store::StreamRegistry;

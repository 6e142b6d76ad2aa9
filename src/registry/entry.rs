//! Stream entry types
//!
//! Per-stream state stored in the registry: the broadcaster's handle, the
//! attached viewer handles, and the stream's current style prompt. Viewer
//! handles are referenced, not owned; a viewer's lifetime is independent of
//! the stream.

use std::collections::HashMap;
use std::time::Instant;

use crate::server::connection::ConnectionHandle;

/// Entry for a single stream in the registry
#[derive(Debug)]
pub struct StreamEntry {
    /// The exclusively associated broadcaster connection
    broadcaster: ConnectionHandle,

    /// Attached viewers, keyed by connection ID
    viewers: HashMap<u64, ConnectionHandle>,

    /// Current style prompt, forwarded verbatim
    style_prompt: Option<String>,

    /// When the stream was created
    created_at: Instant,

    /// Frames fanned out since creation
    frames_relayed: u64,
}

impl StreamEntry {
    /// Create an entry owned by the given broadcaster
    pub(super) fn new(broadcaster: ConnectionHandle) -> Self {
        Self {
            broadcaster,
            viewers: HashMap::new(),
            style_prompt: None,
            created_at: Instant::now(),
            frames_relayed: 0,
        }
    }

    /// Connection ID of the broadcaster
    pub fn broadcaster_id(&self) -> u64 {
        self.broadcaster.id()
    }

    /// Whether the broadcaster's transport is still open
    pub fn broadcaster_open(&self) -> bool {
        self.broadcaster.is_open()
    }

    /// Number of attached viewers
    pub fn viewer_count(&self) -> usize {
        self.viewers.len()
    }

    /// Current style prompt
    pub fn style_prompt(&self) -> Option<&str> {
        self.style_prompt.as_deref()
    }

    /// Frames fanned out since creation
    pub fn frames_relayed(&self) -> u64 {
        self.frames_relayed
    }

    /// Age of the stream
    pub fn age(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }

    pub(super) fn set_style_prompt(&mut self, prompt: String) {
        self.style_prompt = Some(prompt);
    }

    pub(super) fn insert_viewer(&mut self, viewer: ConnectionHandle) {
        self.viewers.insert(viewer.id(), viewer);
    }

    /// Remove one viewer; true if it was attached
    pub(super) fn remove_viewer(&mut self, viewer_id: u64) -> bool {
        self.viewers.remove(&viewer_id).is_some()
    }

    /// Drop viewers whose transport is no longer open
    ///
    /// Lazy cleanup, run on every broadcast. Idempotent; the viewer count is
    /// monotonically non-increasing across calls with no intervening joins.
    pub(super) fn prune_viewers(&mut self) -> usize {
        let before = self.viewers.len();
        self.viewers.retain(|_, viewer| viewer.is_open());
        before - self.viewers.len()
    }

    /// Retain viewers per the fan-out outcome
    pub(super) fn retain_viewers<F>(&mut self, keep: F)
    where
        F: FnMut(&u64, &mut ConnectionHandle) -> bool,
    {
        self.viewers.retain(keep);
    }

    /// Snapshot of the current viewer handles
    pub(super) fn viewers_snapshot(&self) -> Vec<ConnectionHandle> {
        self.viewers.values().cloned().collect()
    }

    pub(super) fn record_relayed(&mut self) {
        self.frames_relayed += 1;
    }
}

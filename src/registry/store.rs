//! Stream registry implementation
//!
//! The central table mapping stream identifiers to stream records. The
//! registry is the sole owner of stream lifetime: a stream exists exactly as
//! long as its broadcaster connection, and removal cascades a one-time
//! termination notice to the viewers attached at that instant.

use std::collections::HashMap;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::RwLock;

use super::entry::StreamEntry;
use super::error::RegistryError;
use super::id::StreamId;
use crate::protocol::{FramePayload, ServerMessage};
use crate::server::connection::{ConnectionHandle, SendOutcome};
use crate::stats::StreamStats;

/// Bound on waiting for one viewer's queue when delivering a control
/// message; a viewer this far behind forfeits the notice.
const CONTROL_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Central registry for all active streams
///
/// Explicitly constructed and injected (`Arc<StreamRegistry>` passed into
/// handlers), never a process-global. Each operation runs to completion under
/// the table lock, which preserves per-message atomicity without any further
/// coordination.
#[derive(Debug, Default)]
pub struct StreamRegistry {
    /// Map of stream ID to stream entry
    streams: RwLock<HashMap<StreamId, StreamEntry>>,
}

impl StreamRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            streams: RwLock::new(HashMap::new()),
        }
    }

    /// Register a stream under a fresh identifier
    pub async fn create(&self, broadcaster: ConnectionHandle) -> StreamId {
        let stream_id = StreamId::generate();
        let mut streams = self.streams.write().await;
        streams.insert(stream_id.clone(), StreamEntry::new(broadcaster));

        tracing::info!(stream = %stream_id, "Stream created");
        stream_id
    }

    /// Register a stream under a caller-chosen identifier
    ///
    /// Used by path-addressed broadcasters. Fails if the identifier is
    /// already claimed by an open broadcaster; an entry whose broadcaster
    /// transport has died may be reclaimed.
    pub async fn create_with_id(
        &self,
        stream_id: StreamId,
        broadcaster: ConnectionHandle,
    ) -> Result<StreamId, RegistryError> {
        let mut streams = self.streams.write().await;

        if let Some(existing) = streams.get(&stream_id) {
            if existing.broadcaster_open() {
                return Err(RegistryError::StreamAlreadyActive(stream_id));
            }
        }
        streams.insert(stream_id.clone(), StreamEntry::new(broadcaster));

        tracing::info!(stream = %stream_id, "Stream created (caller-chosen id)");
        Ok(stream_id)
    }

    /// Attach a viewer to an existing stream
    ///
    /// Returns the stream's current style prompt so the caller can forward it
    /// to the new viewer. A failed join has no side effect on the registry.
    pub async fn join(
        &self,
        stream_id: &StreamId,
        viewer: ConnectionHandle,
    ) -> Result<Option<String>, RegistryError> {
        let mut streams = self.streams.write().await;

        let entry = streams
            .get_mut(stream_id)
            .ok_or_else(|| RegistryError::StreamNotFound(stream_id.clone()))?;

        entry.insert_viewer(viewer);

        tracing::info!(
            stream = %stream_id,
            viewers = entry.viewer_count(),
            "Viewer added"
        );

        Ok(entry.style_prompt().map(String::from))
    }

    /// Detach a viewer from a stream
    ///
    /// A no-op for unknown streams or unattached viewers; viewers leaving
    /// never affects stream existence.
    pub async fn leave(&self, stream_id: &StreamId, viewer_id: u64) {
        let mut streams = self.streams.write().await;

        if let Some(entry) = streams.get_mut(stream_id) {
            if entry.remove_viewer(viewer_id) {
                tracing::debug!(
                    stream = %stream_id,
                    viewers = entry.viewer_count(),
                    "Viewer removed"
                );
            }
        }
    }

    /// Delete a stream entry
    ///
    /// Idempotent: removing an absent identifier is a no-op. Returns the
    /// viewers attached at removal time so the caller can deliver each its
    /// one-time termination notice.
    pub async fn remove(&self, stream_id: &StreamId) -> Option<Vec<ConnectionHandle>> {
        let mut streams = self.streams.write().await;

        let entry = streams.remove(stream_id)?;
        tracing::info!(
            stream = %stream_id,
            viewers = entry.viewer_count(),
            frames = entry.frames_relayed(),
            "Stream removed"
        );
        Some(entry.viewers_snapshot())
    }

    /// Delete a stream entry on behalf of its broadcaster
    ///
    /// Like [`remove`](Self::remove), but verifies the caller is the
    /// registered broadcaster first. A reclaimed identifier must not be torn
    /// down by its previous broadcaster's late cleanup.
    pub async fn remove_by_broadcaster(
        &self,
        stream_id: &StreamId,
        sender_id: u64,
    ) -> Option<Vec<ConnectionHandle>> {
        let mut streams = self.streams.write().await;

        let entry = streams.get(stream_id)?;
        if entry.broadcaster_id() != sender_id {
            tracing::warn!(
                stream = %stream_id,
                sender = sender_id,
                broadcaster = entry.broadcaster_id(),
                "Stream removal mismatch"
            );
            return None;
        }

        let entry = streams.remove(stream_id)?;
        tracing::info!(
            stream = %stream_id,
            viewers = entry.viewer_count(),
            frames = entry.frames_relayed(),
            "Stream removed"
        );
        Some(entry.viewers_snapshot())
    }

    /// Snapshot of current stream identifiers
    pub async fn list(&self) -> Vec<StreamId> {
        self.streams.read().await.keys().cloned().collect()
    }

    /// Fan one frame out to a stream's viewers
    ///
    /// Rejects frames whose sender is not the stream's registered broadcaster
    /// (logged, no response to the sender). Dead viewers are pruned lazily
    /// here on every broadcast. If no viewers remain the frame is dropped
    /// before any payload is built. Otherwise the frame is serialized exactly
    /// once and the identical bytes are queued to every remaining viewer;
    /// a viewer with a momentarily full queue misses this frame (the next one
    /// supersedes it), a viewer with a closed queue is removed.
    ///
    /// Returns the number of viewers the frame was queued toward.
    pub async fn relay_frame(
        &self,
        stream_id: &StreamId,
        sender_id: u64,
        frame: FramePayload,
    ) -> usize {
        let mut streams = self.streams.write().await;

        let Some(entry) = streams.get_mut(stream_id) else {
            tracing::warn!(stream = %stream_id, "Frame for unknown stream dropped");
            return 0;
        };

        if entry.broadcaster_id() != sender_id {
            tracing::warn!(
                stream = %stream_id,
                sender = sender_id,
                broadcaster = entry.broadcaster_id(),
                "Frame from non-broadcaster connection dropped"
            );
            return 0;
        }

        entry.prune_viewers();
        if entry.viewer_count() == 0 {
            tracing::trace!(stream = %stream_id, "No viewers, frame dropped");
            return 0;
        }

        let payload = ServerMessage::Frame {
            stream_id: stream_id.clone(),
            frame: frame.stamped(),
        }
        .encode();

        let mut delivered = 0;
        entry.retain_viewers(|_, viewer| match viewer.try_send_frame(payload.clone()) {
            SendOutcome::Sent => {
                delivered += 1;
                true
            }
            SendOutcome::Dropped => true,
            SendOutcome::Closed => false,
        });
        entry.record_relayed();

        tracing::trace!(stream = %stream_id, delivered, "Frame relayed");
        delivered
    }

    /// Update a stream's style prompt and notify its viewers
    ///
    /// Only the stream's broadcaster may update the prompt. Returns the
    /// number of viewers notified.
    pub async fn update_prompt(
        &self,
        stream_id: &StreamId,
        sender_id: u64,
        prompt: String,
    ) -> Result<usize, RegistryError> {
        let viewers = {
            let mut streams = self.streams.write().await;

            let entry = streams
                .get_mut(stream_id)
                .ok_or_else(|| RegistryError::StreamNotFound(stream_id.clone()))?;

            if entry.broadcaster_id() != sender_id {
                return Err(RegistryError::NotBroadcaster(stream_id.clone()));
            }

            entry.set_style_prompt(prompt.clone());
            entry.prune_viewers();
            entry.viewers_snapshot()
        };

        // Notify outside the table lock; prompt changes are control messages
        // and wait (bounded) for queue capacity instead of dropping.
        let payload = ServerMessage::StyleUpdated { prompt }.encode();
        let sends = viewers.into_iter().map(|viewer| {
            let payload = payload.clone();
            async move {
                tokio::time::timeout(CONTROL_SEND_TIMEOUT, viewer.send_text(payload))
                    .await
                    .unwrap_or(false)
            }
        });
        let notified = join_all(sends).await.into_iter().filter(|sent| *sent).count();

        tracing::info!(stream = %stream_id, notified, "Style prompt updated");
        Ok(notified)
    }

    /// Total number of registered streams
    pub async fn stream_count(&self) -> usize {
        self.streams.read().await.len()
    }

    /// Snapshot of one stream's counters
    pub async fn stream_stats(&self, stream_id: &StreamId) -> Option<StreamStats> {
        let streams = self.streams.read().await;
        streams.get(stream_id).map(|entry| StreamStats {
            stream_id: stream_id.to_string(),
            viewer_count: entry.viewer_count(),
            frames_relayed: entry.frames_relayed(),
            has_style_prompt: entry.style_prompt().is_some(),
            age: entry.age(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::mpsc;
    use tokio_tungstenite::tungstenite::Message;

    use super::*;
    use crate::stats::ConnectionStats;

    fn handle(id: u64) -> (ConnectionHandle, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(8);
        (
            ConnectionHandle::new(id, tx, Arc::new(ConnectionStats::new())),
            rx,
        )
    }

    async fn next_server_message(rx: &mut mpsc::Receiver<Message>) -> ServerMessage {
        match rx.recv().await {
            Some(Message::Text(text)) => ServerMessage::decode(text.as_str()).unwrap(),
            other => panic!("expected text frame, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_create_then_list_then_remove() {
        let registry = StreamRegistry::new();
        let (broadcaster, _rx) = handle(1);

        let id = registry.create(broadcaster).await;
        assert!(registry.list().await.contains(&id));
        assert_eq!(registry.stream_count().await, 1);

        let viewers = registry.remove(&id).await;
        assert_eq!(viewers.map(|v| v.len()), Some(0));
        assert!(registry.list().await.is_empty());

        // idempotent: removing an absent id is a no-op
        assert!(registry.remove(&id).await.is_none());
    }

    #[tokio::test]
    async fn test_join_unknown_stream_has_no_side_effect() {
        let registry = StreamRegistry::new();
        let (viewer, _rx) = handle(2);

        let err = registry
            .join(&StreamId::from("ghost"), viewer)
            .await
            .unwrap_err();
        assert_eq!(err, RegistryError::StreamNotFound(StreamId::from("ghost")));
        assert_eq!(registry.stream_count().await, 0);
    }

    #[tokio::test]
    async fn test_relay_fans_out_identical_payload() {
        let registry = StreamRegistry::new();
        let (broadcaster, _brx) = handle(1);
        let (viewer_a, mut arx) = handle(2);
        let (viewer_b, mut brx) = handle(3);

        let id = registry.create(broadcaster).await;
        registry.join(&id, viewer_a).await.unwrap();
        registry.join(&id, viewer_b).await.unwrap();

        let delivered = registry
            .relay_frame(&id, 1, FramePayload::new("data:image/jpeg;base64,AAAA"))
            .await;
        assert_eq!(delivered, 2);

        for rx in [&mut arx, &mut brx] {
            match next_server_message(rx).await {
                ServerMessage::Frame { stream_id, frame } => {
                    assert_eq!(stream_id, id);
                    assert_eq!(frame.frame, "data:image/jpeg;base64,AAAA");
                    // relay-stamped since the producer sent none
                    assert!(frame.timestamp.is_some());
                }
                other => panic!("unexpected message: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_relay_from_non_broadcaster_delivers_nothing() {
        let registry = StreamRegistry::new();
        let (broadcaster, _brx) = handle(1);
        let (viewer, mut vrx) = handle(2);

        let id = registry.create(broadcaster).await;
        registry.join(&id, viewer).await.unwrap();

        // connection 2 (a viewer) and connection 99 (a stranger) both try
        let delivered = registry
            .relay_frame(&id, 2, FramePayload::new("data:image/jpeg;base64,EVIL"))
            .await;
        assert_eq!(delivered, 0);
        let delivered = registry
            .relay_frame(&id, 99, FramePayload::new("data:image/jpeg;base64,EVIL"))
            .await;
        assert_eq!(delivered, 0);

        assert!(vrx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_relay_for_unknown_stream_is_dropped() {
        let registry = StreamRegistry::new();
        let delivered = registry
            .relay_frame(&StreamId::from("ghost"), 1, FramePayload::new("x"))
            .await;
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn test_prune_is_lazy_and_monotonic() {
        let registry = StreamRegistry::new();
        let (broadcaster, _brx) = handle(1);
        let (viewer_a, arx) = handle(2);
        let (viewer_b, mut brx) = handle(3);

        let id = registry.create(broadcaster).await;
        registry.join(&id, viewer_a).await.unwrap();
        registry.join(&id, viewer_b).await.unwrap();

        // viewer A's transport dies silently
        drop(arx);

        let delivered = registry
            .relay_frame(&id, 1, FramePayload::new("data:image/jpeg;base64,AAAA"))
            .await;
        assert_eq!(delivered, 1);
        assert_eq!(registry.stream_stats(&id).await.unwrap().viewer_count, 1);

        // repeated broadcasts converge without error or duplicate removal
        for _ in 0..3 {
            registry
                .relay_frame(&id, 1, FramePayload::new("data:image/jpeg;base64,BBBB"))
                .await;
        }
        assert_eq!(registry.stream_stats(&id).await.unwrap().viewer_count, 1);

        // drain so viewer B's queue never fills
        while brx.try_recv().is_ok() {}
    }

    #[tokio::test]
    async fn test_relay_with_no_viewers_drops_frame() {
        let registry = StreamRegistry::new();
        let (broadcaster, _brx) = handle(1);

        let id = registry.create(broadcaster).await;
        let delivered = registry
            .relay_frame(&id, 1, FramePayload::new("data:image/jpeg;base64,AAAA"))
            .await;
        assert_eq!(delivered, 0);
        assert_eq!(registry.stream_stats(&id).await.unwrap().frames_relayed, 1);
    }

    #[tokio::test]
    async fn test_full_viewer_queue_drops_frame_but_keeps_viewer() {
        let registry = StreamRegistry::new();
        let (broadcaster, _brx) = handle(1);

        // capacity-1 queue that we never drain
        let (tx, _vrx_keepalive) = mpsc::channel(1);
        let viewer = ConnectionHandle::new(2, tx, Arc::new(ConnectionStats::new()));

        let id = registry.create(broadcaster).await;
        registry.join(&id, viewer).await.unwrap();

        let first = registry
            .relay_frame(&id, 1, FramePayload::new("data:image/jpeg;base64,AAAA"))
            .await;
        assert_eq!(first, 1);

        // queue now full: frame dropped for this viewer, viewer retained
        let second = registry
            .relay_frame(&id, 1, FramePayload::new("data:image/jpeg;base64,BBBB"))
            .await;
        assert_eq!(second, 0);
        assert_eq!(registry.stream_stats(&id).await.unwrap().viewer_count, 1);
    }

    #[tokio::test]
    async fn test_remove_returns_viewers_for_notification() {
        let registry = StreamRegistry::new();
        let (broadcaster, _brx) = handle(1);
        let (viewer_a, _arx) = handle(2);
        let (viewer_b, _brx2) = handle(3);

        let id = registry.create(broadcaster).await;
        registry.join(&id, viewer_a).await.unwrap();
        registry.join(&id, viewer_b).await.unwrap();

        let viewers = registry.remove(&id).await.unwrap();
        assert_eq!(viewers.len(), 2);

        // no resurrection: the id is gone for good
        let (late, _lrx) = handle(4);
        assert!(registry.join(&id, late).await.is_err());
    }

    #[tokio::test]
    async fn test_create_with_id_claim_rules() {
        let registry = StreamRegistry::new();
        let (broadcaster, brx) = handle(1);

        let id = registry
            .create_with_id(StreamId::from("studio"), broadcaster)
            .await
            .unwrap();
        assert_eq!(id, StreamId::from("studio"));

        // open broadcaster holds the claim
        let (rival, _rrx) = handle(2);
        let err = registry
            .create_with_id(StreamId::from("studio"), rival)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::StreamAlreadyActive(StreamId::from("studio"))
        );

        // a dead broadcaster's claim may be taken over
        drop(brx);
        let (successor, _srx) = handle(3);
        registry
            .create_with_id(StreamId::from("studio"), successor)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_late_cleanup_cannot_remove_reclaimed_stream() {
        let registry = StreamRegistry::new();
        let (broadcaster, brx) = handle(1);

        registry
            .create_with_id(StreamId::from("studio"), broadcaster)
            .await
            .unwrap();

        // transport dies, successor reclaims before the old teardown runs
        drop(brx);
        let (successor, _srx) = handle(2);
        registry
            .create_with_id(StreamId::from("studio"), successor)
            .await
            .unwrap();

        // connection 1's late teardown must not touch the successor's stream
        assert!(registry
            .remove_by_broadcaster(&StreamId::from("studio"), 1)
            .await
            .is_none());
        assert_eq!(registry.stream_count().await, 1);

        assert!(registry
            .remove_by_broadcaster(&StreamId::from("studio"), 2)
            .await
            .is_some());
        assert_eq!(registry.stream_count().await, 0);
    }

    #[tokio::test]
    async fn test_update_prompt_notifies_and_sticks() {
        let registry = StreamRegistry::new();
        let (broadcaster, _brx) = handle(1);
        let (viewer, mut vrx) = handle(2);

        let id = registry.create(broadcaster).await;
        registry.join(&id, viewer).await.unwrap();

        let notified = registry
            .update_prompt(&id, 1, "watercolor".into())
            .await
            .unwrap();
        assert_eq!(notified, 1);

        match next_server_message(&mut vrx).await {
            ServerMessage::StyleUpdated { prompt } => assert_eq!(prompt, "watercolor"),
            other => panic!("unexpected message: {:?}", other),
        }

        // a late joiner sees the prompt at join time
        let (late, _lrx) = handle(3);
        let prompt = registry.join(&id, late).await.unwrap();
        assert_eq!(prompt.as_deref(), Some("watercolor"));
    }

    #[tokio::test]
    async fn test_update_prompt_guards_identity() {
        let registry = StreamRegistry::new();
        let (broadcaster, _brx) = handle(1);

        let id = registry.create(broadcaster).await;
        let err = registry
            .update_prompt(&id, 42, "sneaky".into())
            .await
            .unwrap_err();
        assert_eq!(err, RegistryError::NotBroadcaster(id.clone()));
        assert!(!registry.stream_stats(&id).await.unwrap().has_style_prompt);
    }
}

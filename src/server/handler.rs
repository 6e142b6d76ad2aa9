//! Relay event handler
//!
//! Hook trait passed into the server. The relay itself never authenticates;
//! `on_connection` is the seam where the surrounding system's identity
//! collaborator can accept or reject a caller. The remaining hooks are
//! notifications for bookkeeping and diagnostics.

use std::future::Future;
use std::net::SocketAddr;

use crate::protocol::FramePayload;
use crate::registry::StreamId;

/// Context passed to handler callbacks
///
/// Read-only session information; the relay keys everything on `session_id`.
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    /// Unique session ID
    pub session_id: u64,

    /// Remote peer address
    pub peer_addr: SocketAddr,
}

/// Event hooks invoked by the relay server
///
/// All hooks have no-op defaults; implement only what you need. Returned
/// futures must be `Send` because connections run on spawned tasks.
pub trait RelayHandler: Send + Sync + 'static {
    /// Called when a new socket connects. Return `false` to reject it.
    fn on_connection(&self, ctx: &ConnectionContext) -> impl Future<Output = bool> + Send {
        let _ = ctx;
        async { true }
    }

    /// Called after a connection claims the broadcaster role.
    fn on_stream_created(
        &self,
        ctx: &ConnectionContext,
        stream_id: &StreamId,
    ) -> impl Future<Output = ()> + Send {
        let _ = (ctx, stream_id);
        async {}
    }

    /// Called after a connection attaches to a stream as a viewer.
    fn on_viewer_joined(
        &self,
        ctx: &ConnectionContext,
        stream_id: &StreamId,
    ) -> impl Future<Output = ()> + Send {
        let _ = (ctx, stream_id);
        async {}
    }

    /// Called for each accepted frame before fan-out. Return `false` to
    /// drop the frame.
    fn on_frame(
        &self,
        ctx: &ConnectionContext,
        stream_id: &StreamId,
        frame: &FramePayload,
    ) -> impl Future<Output = bool> + Send {
        let _ = (ctx, stream_id, frame);
        async { true }
    }

    /// Called after a stream is torn down and its viewers notified.
    fn on_stream_ended(
        &self,
        stream_id: &StreamId,
        viewers_notified: usize,
    ) -> impl Future<Output = ()> + Send {
        let _ = (stream_id, viewers_notified);
        async {}
    }

    /// Called when a connection closes, after any teardown cascade.
    fn on_disconnect(&self, ctx: &ConnectionContext) -> impl Future<Output = ()> + Send {
        let _ = ctx;
        async {}
    }
}

/// Handler that accepts everything and observes nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultRelayHandler;

impl RelayHandler for DefaultRelayHandler {}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_handler_accepts() {
        let handler = DefaultRelayHandler;
        let ctx = ConnectionContext {
            session_id: 1,
            peer_addr: "127.0.0.1:9000".parse().unwrap(),
        };
        assert!(handler.on_connection(&ctx).await);
        assert!(
            handler
                .on_frame(&ctx, &StreamId::from("S"), &FramePayload::new("x"))
                .await
        );
    }
}

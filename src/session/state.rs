//! Connection role state machine
//!
//! Tracks a relay connection from accept to close. A connection starts
//! unidentified, claims exactly one role from its first identifying message
//! (or from the upgrade request path), and keeps that role until it closes.
//! Role assignment goes through guarded transition methods; a second
//! identification attempt is a typed error, never a silent overwrite.

use std::net::SocketAddr;
use std::time::Instant;

use crate::protocol::ProtocolError;
use crate::registry::StreamId;

/// Role held by a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionRole {
    /// No identifying message seen yet
    Unidentified,
    /// Originates frames for the stream
    Broadcaster(StreamId),
    /// Receives relayed frames for the stream
    Viewer(StreamId),
    /// Connection has been torn down
    Closed,
}

impl ConnectionRole {
    /// Short label for log fields
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionRole::Unidentified => "unidentified",
            ConnectionRole::Broadcaster(_) => "broadcaster",
            ConnectionRole::Viewer(_) => "viewer",
            ConnectionRole::Closed => "closed",
        }
    }
}

/// Complete per-connection state
#[derive(Debug)]
pub struct ConnectionState {
    /// Unique connection ID
    pub id: u64,

    /// Remote peer address
    pub peer_addr: SocketAddr,

    /// Current role
    role: ConnectionRole,

    /// Connection start time
    pub connected_at: Instant,
}

impl ConnectionState {
    /// Create state for a freshly accepted connection
    pub fn new(id: u64, peer_addr: SocketAddr) -> Self {
        Self {
            id,
            peer_addr,
            role: ConnectionRole::Unidentified,
            connected_at: Instant::now(),
        }
    }

    /// Current role
    pub fn role(&self) -> &ConnectionRole {
        &self.role
    }

    /// Whether the connection has not yet claimed a role
    pub fn is_unidentified(&self) -> bool {
        self.role == ConnectionRole::Unidentified
    }

    /// The stream this broadcaster owns, if that is the role
    pub fn broadcast_stream(&self) -> Option<&StreamId> {
        match &self.role {
            ConnectionRole::Broadcaster(id) => Some(id),
            _ => None,
        }
    }

    /// The stream this viewer watches, if that is the role
    pub fn viewed_stream(&self) -> Option<&StreamId> {
        match &self.role {
            ConnectionRole::Viewer(id) => Some(id),
            _ => None,
        }
    }

    /// Claim the broadcaster role
    ///
    /// Only valid from the unidentified state.
    pub fn identify_broadcaster(&mut self, stream_id: StreamId) -> Result<(), ProtocolError> {
        if !self.is_unidentified() {
            return Err(ProtocolError::AlreadyIdentified);
        }
        self.role = ConnectionRole::Broadcaster(stream_id);
        Ok(())
    }

    /// Claim the viewer role
    ///
    /// Only valid from the unidentified state. A failed join leaves the
    /// connection unidentified, so this is called only after the registry
    /// accepted the attach.
    pub fn identify_viewer(&mut self, stream_id: StreamId) -> Result<(), ProtocolError> {
        if !self.is_unidentified() {
            return Err(ProtocolError::AlreadyIdentified);
        }
        self.role = ConnectionRole::Viewer(stream_id);
        Ok(())
    }

    /// Mark the connection closed
    ///
    /// Returns the role held at close time so teardown can cascade.
    pub fn close(&mut self) -> ConnectionRole {
        std::mem::replace(&mut self.role, ConnectionRole::Closed)
    }

    /// Connection age
    pub fn duration(&self) -> std::time::Duration {
        self.connected_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn addr() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 9800)
    }

    #[test]
    fn test_broadcaster_lifecycle() {
        let mut state = ConnectionState::new(1, addr());
        assert!(state.is_unidentified());

        state
            .identify_broadcaster(StreamId::from("S"))
            .expect("first identification succeeds");
        assert_eq!(state.broadcast_stream(), Some(&StreamId::from("S")));
        assert!(state.viewed_stream().is_none());

        let role = state.close();
        assert_eq!(role, ConnectionRole::Broadcaster(StreamId::from("S")));
        assert_eq!(*state.role(), ConnectionRole::Closed);
    }

    #[test]
    fn test_role_transitions_exactly_once() {
        let mut state = ConnectionState::new(1, addr());
        state.identify_viewer(StreamId::from("S")).unwrap();

        let err = state.identify_viewer(StreamId::from("T")).unwrap_err();
        assert_eq!(err, ProtocolError::AlreadyIdentified);

        let err = state.identify_broadcaster(StreamId::from("T")).unwrap_err();
        assert_eq!(err, ProtocolError::AlreadyIdentified);

        // role untouched by rejected transitions
        assert_eq!(state.viewed_stream(), Some(&StreamId::from("S")));
    }

    #[test]
    fn test_failed_join_leaves_retry_possible() {
        // The handler only commits the viewer role after the registry accepts
        // the attach, so a NotFound join never transitions; model that here.
        let mut state = ConnectionState::new(2, addr());
        assert!(state.is_unidentified());

        // a later attempt may still claim a role
        state.identify_viewer(StreamId::from("S")).unwrap();
        assert_eq!(state.role().label(), "viewer");
    }
}

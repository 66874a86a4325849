//! Coordination-service session seam
//!
//! The provider consumes a hierarchical store with one-shot watches and
//! session semantics. Implementations: [`crate::cloud::memory`] for tests
//! and embedding, `crate::cloud::zk` (feature `zk`) for ZooKeeper.

use std::sync::Arc;
use std::time::Duration;

use crate::common::Result;

/// Change reported by a watch on a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeEvent {
    Created,
    Deleted,
    DataChanged,
    ChildrenChanged,
}

/// Session lifecycle signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Connected,
    Disconnected,
    Expired,
    AuthFailed,
}

/// Notification pushed by the coordination service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchedEvent {
    Node { path: String, event: NodeEvent },
    Session(SessionEvent),
}

impl WatchedEvent {
    pub fn node(path: impl Into<String>, event: NodeEvent) -> Self {
        WatchedEvent::Node {
            path: path.into(),
            event,
        }
    }

    /// Does this event mean the session must be torn down and reopened?
    pub fn requires_reconnect(&self) -> bool {
        matches!(
            self,
            WatchedEvent::Session(SessionEvent::Disconnected | SessionEvent::Expired)
        )
    }
}

/// Receives watch and session notifications
pub trait NotificationSink: Send + Sync {
    fn process(&self, event: WatchedEvent);
}

/// An open session. `None` results mean the node does not exist.
///
/// Connection-level failures must be reported as
/// [`crate::Error::Session`]; any other error is treated as a failure of
/// that single read.
pub trait CoordinationSession: Send + Sync {
    fn get_data(&self, path: &str, watch: bool) -> Result<Option<Vec<u8>>>;

    fn get_children(&self, path: &str, watch: bool) -> Result<Option<Vec<String>>>;

    fn close(&self);
}

/// Opens sessions that deliver their notifications to `sink`
pub trait SessionConnector: Send + Sync {
    fn connect(
        &self,
        connection: &str,
        session_timeout: Duration,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<Box<dyn CoordinationSession>>;
}

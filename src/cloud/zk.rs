//! ZooKeeper-backed coordination sessions
//!
//! Watch events are forwarded from the client's event thread to a
//! dedicated dispatcher thread, so a notification-triggered refresh may
//! block on the provider lock or close the session without stalling the
//! client's own event loop.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use zookeeper::{KeeperState, WatchedEventType, ZkError, ZooKeeper};

use crate::cloud::session::{
    CoordinationSession, NodeEvent, NotificationSink, SessionConnector, SessionEvent,
    WatchedEvent,
};
use crate::common::{Error, Result};

/// Opens ZooKeeper sessions
#[derive(Debug, Clone, Copy, Default)]
pub struct ZkConnector;

impl ZkConnector {
    pub fn new() -> Self {
        Self
    }
}

impl SessionConnector for ZkConnector {
    fn connect(
        &self,
        connection: &str,
        session_timeout: Duration,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<Box<dyn CoordinationSession>> {
        let (tx, rx) = mpsc::channel::<WatchedEvent>();

        thread::Builder::new()
            .name("shardlocate-zk-events".into())
            .spawn(move || {
                // Ends once the client drops its watcher (session closed)
                for event in rx {
                    sink.process(event);
                }
            })
            .map_err(|e| Error::Session(format!("failed to start event dispatcher: {}", e)))?;

        let watcher = move |event: zookeeper::WatchedEvent| {
            if let Some(event) = convert_event(event) {
                let _ = tx.send(event);
            }
        };

        let zk = ZooKeeper::connect(connection, session_timeout, watcher)
            .map_err(|e| Error::Session(format!("connect to {} failed: {:?}", connection, e)))?;

        tracing::debug!("ZooKeeper session established with {}", connection);
        Ok(Box::new(ZkSession { zk }))
    }
}

struct ZkSession {
    zk: ZooKeeper,
}

impl CoordinationSession for ZkSession {
    fn get_data(&self, path: &str, watch: bool) -> Result<Option<Vec<u8>>> {
        read_result(path, self.zk.get_data(path, watch).map(|(data, _stat)| data))
    }

    fn get_children(&self, path: &str, watch: bool) -> Result<Option<Vec<String>>> {
        read_result(path, self.zk.get_children(path, watch))
    }

    fn close(&self) {
        if let Err(e) = self.zk.close() {
            tracing::warn!("Closing ZooKeeper session failed: {:?}", e);
        }
    }
}

/// A missing node is `None`; lost connectivity fails the whole refresh,
/// anything else only this read
fn read_result<T>(path: &str, result: std::result::Result<T, ZkError>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(ZkError::NoNode) => Ok(None),
        Err(e @ (ZkError::ConnectionLoss | ZkError::SessionExpired | ZkError::OperationTimeout)) => {
            Err(Error::Session(format!("{:?} while reading {}", e, path)))
        }
        Err(other) => Err(Error::Fetch {
            path: path.to_string(),
            reason: format!("{:?}", other),
        }),
    }
}

fn convert_event(event: zookeeper::WatchedEvent) -> Option<WatchedEvent> {
    let node_event = match event.event_type {
        WatchedEventType::None => {
            let signal = match event.keeper_state {
                KeeperState::Disconnected => SessionEvent::Disconnected,
                KeeperState::Expired => SessionEvent::Expired,
                KeeperState::AuthFailed => SessionEvent::AuthFailed,
                _ => SessionEvent::Connected,
            };
            return Some(WatchedEvent::Session(signal));
        }
        WatchedEventType::NodeCreated => NodeEvent::Created,
        WatchedEventType::NodeDeleted => NodeEvent::Deleted,
        WatchedEventType::NodeDataChanged => NodeEvent::DataChanged,
        WatchedEventType::NodeChildrenChanged => NodeEvent::ChildrenChanged,
        _ => return None,
    };

    event
        .path
        .filter(|path| !path.is_empty())
        .map(|path| WatchedEvent::node(path, node_event))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(
        event_type: WatchedEventType,
        keeper_state: KeeperState,
        path: Option<&str>,
    ) -> zookeeper::WatchedEvent {
        zookeeper::WatchedEvent {
            event_type,
            keeper_state,
            path: path.map(str::to_string),
        }
    }

    #[test]
    fn test_read_result_mapping() {
        let path = "/clusterstate.json";

        assert_eq!(read_result(path, Ok(vec![1u8])).unwrap(), Some(vec![1u8]));
        assert_eq!(read_result::<Vec<u8>>(path, Err(ZkError::NoNode)).unwrap(), None);

        for lost in [ZkError::ConnectionLoss, ZkError::SessionExpired, ZkError::OperationTimeout] {
            assert!(matches!(read_result::<Vec<u8>>(path, Err(lost)), Err(Error::Session(_))));
        }
        for other in [ZkError::NoAuth, ZkError::MarshallingError, ZkError::BadArguments] {
            assert!(matches!(
                read_result::<Vec<u8>>(path, Err(other)),
                Err(Error::Fetch { path: p, .. }) if p == path
            ));
        }
    }

    #[test]
    fn test_session_events() {
        let disconnected = convert_event(event(WatchedEventType::None, KeeperState::Disconnected, None)).unwrap();
        assert_eq!(disconnected, WatchedEvent::Session(SessionEvent::Disconnected));
        assert!(disconnected.requires_reconnect());

        let expired = convert_event(event(WatchedEventType::None, KeeperState::Expired, None)).unwrap();
        assert!(expired.requires_reconnect());

        let connected = convert_event(event(WatchedEventType::None, KeeperState::SyncConnected, None)).unwrap();
        assert_eq!(connected, WatchedEvent::Session(SessionEvent::Connected));
        assert!(!connected.requires_reconnect());

        let auth = convert_event(event(WatchedEventType::None, KeeperState::AuthFailed, None)).unwrap();
        assert!(!auth.requires_reconnect());
    }

    #[test]
    fn test_node_events() {
        let changed = convert_event(event(
            WatchedEventType::NodeDataChanged,
            KeeperState::SyncConnected,
            Some("/collections/docs/state.json"),
        ));
        assert_eq!(
            changed,
            Some(WatchedEvent::node("/collections/docs/state.json", NodeEvent::DataChanged))
        );

        let children = convert_event(event(
            WatchedEventType::NodeChildrenChanged,
            KeeperState::SyncConnected,
            Some("/collections"),
        ));
        assert_eq!(
            children,
            Some(WatchedEvent::node("/collections", NodeEvent::ChildrenChanged))
        );

        // Node events need a path
        assert_eq!(
            convert_event(event(WatchedEventType::NodeDeleted, KeeperState::SyncConnected, None)),
            None
        );
        assert_eq!(
            convert_event(event(WatchedEventType::NodeCreated, KeeperState::SyncConnected, Some(""))),
            None
        );
    }
}

//! In-memory coordination service
//!
//! A hierarchical node store with one-shot watches and session
//! notifications, used by tests and for embedding the provider without a
//! ZooKeeper ensemble. Notifications are delivered synchronously on the
//! thread that performs the mutation, never while internal locks are held.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::cloud::session::{
    CoordinationSession, NodeEvent, NotificationSink, SessionConnector, SessionEvent,
    WatchedEvent,
};
use crate::common::{Error, Result};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct SessionEntry {
    sink: Arc<dyn NotificationSink>,
    data_watches: HashSet<String>,
    child_watches: HashSet<String>,
    expired: bool,
}

#[derive(Default)]
struct MemoryInner {
    nodes: Mutex<BTreeMap<String, Vec<u8>>>,
    sessions: Mutex<HashMap<u64, SessionEntry>>,
    failing: Mutex<HashSet<String>>,
    data_reads: Mutex<HashMap<String, u64>>,
    next_session: AtomicU64,
    connects: AtomicU64,
    refuse_connections: AtomicBool,
}

/// Shared handle to an in-memory node tree; cloning shares the tree
#[derive(Clone, Default)]
pub struct MemoryCoordinator {
    inner: Arc<MemoryInner>,
}

impl MemoryCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or overwrite a node, firing data and child watches
    pub fn set_data(&self, path: &str, data: impl Into<Vec<u8>>) {
        let mut events = Vec::new();
        {
            let mut nodes = lock(&self.inner.nodes);
            let created: Vec<String> = ancestors_and_self(path)
                .into_iter()
                .filter(|p| !node_exists(&nodes, p))
                .collect();
            nodes.insert(path.to_string(), data.into());

            let event = if created.iter().any(|p| p.as_str() == path) {
                NodeEvent::Created
            } else {
                NodeEvent::DataChanged
            };
            events.push((WatchKind::Data, path.to_string(), event));
            for new_node in created {
                events.push((WatchKind::Children, parent(&new_node), NodeEvent::ChildrenChanged));
            }
        }
        self.fire(events);
    }

    /// Remove a node and everything below it
    pub fn delete(&self, path: &str) {
        let mut events = Vec::new();
        {
            let mut nodes = lock(&self.inner.nodes);
            if !node_exists(&nodes, path) {
                return;
            }
            let prefix = child_prefix(path);
            nodes.retain(|k, _| k.as_str() != path && !k.starts_with(&prefix));

            events.push((WatchKind::Data, path.to_string(), NodeEvent::Deleted));
            // Removing the last descendant may remove implicit ancestors too
            let mut current = path.to_string();
            loop {
                let up = parent(&current);
                events.push((WatchKind::Children, up.clone(), NodeEvent::ChildrenChanged));
                if up == "/" || node_exists(&nodes, &up) {
                    break;
                }
                current = up;
            }
        }
        self.fire(events);
    }

    /// Make reads of `path` fail until [`MemoryCoordinator::restore_reads`]
    pub fn fail_reads(&self, path: &str) {
        lock(&self.inner.failing).insert(path.to_string());
    }

    pub fn restore_reads(&self, path: &str) {
        lock(&self.inner.failing).remove(path);
    }

    /// Reject new sessions with a session error
    pub fn refuse_connections(&self, refuse: bool) {
        self.inner.refuse_connections.store(refuse, Ordering::SeqCst);
    }

    /// Drop the connection of every live session and notify its sink
    pub fn disconnect_sessions(&self) {
        self.end_sessions(SessionEvent::Disconnected);
    }

    /// Expire every live session and notify its sink
    pub fn expire_sessions(&self) {
        self.end_sessions(SessionEvent::Expired);
    }

    /// Sessions opened so far
    pub fn connects(&self) -> u64 {
        self.inner.connects.load(Ordering::SeqCst)
    }

    /// Sessions neither closed nor expired
    pub fn live_sessions(&self) -> usize {
        lock(&self.inner.sessions)
            .values()
            .filter(|s| !s.expired)
            .count()
    }

    /// Successful `get_data` calls on `path`
    pub fn data_reads(&self, path: &str) -> u64 {
        lock(&self.inner.data_reads).get(path).copied().unwrap_or(0)
    }

    fn end_sessions(&self, signal: SessionEvent) {
        let sinks: Vec<Arc<dyn NotificationSink>> = {
            let mut sessions = lock(&self.inner.sessions);
            sessions
                .values_mut()
                .filter(|s| !s.expired)
                .map(|s| {
                    s.expired = true;
                    s.data_watches.clear();
                    s.child_watches.clear();
                    s.sink.clone()
                })
                .collect()
        };
        for sink in sinks {
            sink.process(WatchedEvent::Session(signal));
        }
    }

    fn fire(&self, events: Vec<(WatchKind, String, NodeEvent)>) {
        let mut deliveries = Vec::new();
        {
            let mut sessions = lock(&self.inner.sessions);
            for (kind, path, event) in events {
                for session in sessions.values_mut().filter(|s| !s.expired) {
                    let watches = match kind {
                        WatchKind::Data => &mut session.data_watches,
                        WatchKind::Children => &mut session.child_watches,
                    };
                    // Watches are one-shot
                    if watches.remove(&path) {
                        deliveries.push((session.sink.clone(), WatchedEvent::node(path.clone(), event)));
                    }
                }
            }
        }
        for (sink, event) in deliveries {
            sink.process(event);
        }
    }
}

impl SessionConnector for MemoryCoordinator {
    fn connect(
        &self,
        connection: &str,
        _session_timeout: Duration,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<Box<dyn CoordinationSession>> {
        if self.inner.refuse_connections.load(Ordering::SeqCst) {
            return Err(Error::Session(format!("connection to {} refused", connection)));
        }

        let id = self.inner.next_session.fetch_add(1, Ordering::SeqCst);
        lock(&self.inner.sessions).insert(
            id,
            SessionEntry {
                sink,
                data_watches: HashSet::new(),
                child_watches: HashSet::new(),
                expired: false,
            },
        );
        self.inner.connects.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(MemorySession {
            id,
            inner: self.inner.clone(),
        }))
    }
}

#[derive(Debug, Clone, Copy)]
enum WatchKind {
    Data,
    Children,
}

struct MemorySession {
    id: u64,
    inner: Arc<MemoryInner>,
}

impl MemorySession {
    /// Check liveness and register a watch in one step
    fn prepare(&self, path: &str, watch: Option<WatchKind>) -> Result<()> {
        let mut sessions = lock(&self.inner.sessions);
        let session = sessions
            .get_mut(&self.id)
            .filter(|s| !s.expired)
            .ok_or_else(|| Error::Session(format!("session {} is not connected", self.id)))?;

        if lock(&self.inner.failing).contains(path) {
            return Err(Error::Fetch {
                path: path.to_string(),
                reason: "read failure injected".into(),
            });
        }

        match watch {
            Some(WatchKind::Data) => {
                session.data_watches.insert(path.to_string());
            }
            Some(WatchKind::Children) => {
                session.child_watches.insert(path.to_string());
            }
            None => {}
        }
        Ok(())
    }
}

impl CoordinationSession for MemorySession {
    fn get_data(&self, path: &str, watch: bool) -> Result<Option<Vec<u8>>> {
        self.prepare(path, watch.then_some(WatchKind::Data))?;
        *lock(&self.inner.data_reads).entry(path.to_string()).or_insert(0) += 1;
        Ok(lock(&self.inner.nodes).get(path).cloned())
    }

    fn get_children(&self, path: &str, watch: bool) -> Result<Option<Vec<String>>> {
        self.prepare(path, watch.then_some(WatchKind::Children))?;
        let nodes = lock(&self.inner.nodes);
        if !node_exists(&nodes, path) {
            return Ok(None);
        }

        let prefix = child_prefix(path);
        let children: BTreeSet<&str> = nodes
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .filter_map(|(k, _)| k[prefix.len()..].split('/').next())
            .filter(|name| !name.is_empty())
            .collect();
        Ok(Some(children.into_iter().map(str::to_string).collect()))
    }

    fn close(&self) {
        lock(&self.inner.sessions).remove(&self.id);
    }
}

fn child_prefix(path: &str) -> String {
    if path == "/" {
        "/".to_string()
    } else {
        format!("{}/", path.trim_end_matches('/'))
    }
}

fn parent(path: &str) -> String {
    match path.trim_end_matches('/').rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => path[..idx].to_string(),
    }
}

/// `/a/b/c` → `["/a", "/a/b", "/a/b/c"]`
fn ancestors_and_self(path: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        current.push('/');
        current.push_str(segment);
        out.push(current.clone());
    }
    out
}

/// Nodes exist explicitly or implicitly through a descendant
fn node_exists(nodes: &BTreeMap<String, Vec<u8>>, path: &str) -> bool {
    if path == "/" || nodes.contains_key(path) {
        return true;
    }
    let prefix = child_prefix(path);
    nodes
        .range(prefix.clone()..)
        .next()
        .is_some_and(|(k, _)| k.starts_with(&prefix))
}

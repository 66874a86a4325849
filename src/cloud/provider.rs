//! Cluster-state provider
//!
//! Owns the coordination session, rebuilds the merged [`CloudState`] from
//! the global and per-collection documents, and republishes it whenever a
//! watch fires. Every write path (init, notification refresh, forced
//! refresh, dispose) runs under one mutex; readers load the published
//! snapshot lock-free and never observe a half-built one.

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Instant;

use crate::cloud::parser::{JsonStateParser, StateParser};
use crate::cloud::session::{CoordinationSession, NotificationSink, SessionConnector, WatchedEvent};
use crate::cloud::state::CloudState;
use crate::common::metrics::ProviderMetrics;
use crate::common::{Error, ProviderConfig, Result};

/// Read access to published cluster state.
///
/// Anything implementing this gets replica selection through
/// [`crate::cloud::ReplicaManager`].
pub trait StateSource: Send + Sync {
    /// Current snapshot; never blocks and never refreshes
    fn cloud_state(&self) -> Arc<CloudState>;

    /// Resynchronize from scratch, then return the new current snapshot.
    /// Slow; meant for diagnostics and recovery, not the request path.
    fn fresh_cloud_state(&self) -> Arc<CloudState>;

    fn metrics(&self) -> Option<&ProviderMetrics> {
        None
    }
}

/// Lifecycle of a cluster-state provider
pub trait StateProvider: StateSource {
    /// Stable identity of this provider
    fn key(&self) -> &str;

    /// Perform the first refresh. Idempotent and thread-safe.
    fn init(&self) -> Result<()>;

    /// Release the session. Idempotent and thread-safe.
    fn dispose(&self);
}

/// Point-in-time provider diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatus {
    pub key: String,
    pub initialized: bool,
    pub disposed: bool,
    pub connected: bool,
    /// Number of snapshots published so far
    pub generation: u64,
    pub last_refresh: Option<DateTime<Utc>>,
    pub collections: usize,
    pub aliases: usize,
}

/// Mutable provider state guarded by the provider lock
#[derive(Default)]
struct SessionSlot {
    session: Option<Box<dyn CoordinationSession>>,
    generation: u64,
    last_refresh: Option<DateTime<Utc>>,
}

struct ProviderInner {
    key: String,
    config: ProviderConfig,
    connector: Arc<dyn SessionConnector>,
    parser: Arc<dyn StateParser>,
    /// Written only while `slot` is locked
    current: ArcSwap<CloudState>,
    slot: Mutex<SessionSlot>,
    initialized: AtomicBool,
    disposed: AtomicBool,
    metrics: ProviderMetrics,
    /// Handed to sessions as their notification sink
    weak_self: Weak<ProviderInner>,
}

/// Cluster-state provider backed by a coordination service
pub struct CloudStateProvider {
    inner: Arc<ProviderInner>,
}

impl CloudStateProvider {
    /// Create a provider using the default JSON state parser
    pub fn new(config: ProviderConfig, connector: impl SessionConnector + 'static) -> Result<Self> {
        Self::with_parser(config, Arc::new(connector), Arc::new(JsonStateParser::new()))
    }

    pub fn with_parser(
        config: ProviderConfig,
        connector: Arc<dyn SessionConnector>,
        parser: Arc<dyn StateParser>,
    ) -> Result<Self> {
        config.validate()?;

        let inner = Arc::new_cyclic(|weak_self| ProviderInner {
            key: config.connection.clone(),
            config,
            connector,
            parser,
            current: ArcSwap::from_pointee(CloudState::empty()),
            slot: Mutex::new(SessionSlot::default()),
            initialized: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            metrics: ProviderMetrics::new(),
            weak_self: weak_self.clone(),
        });

        Ok(Self { inner })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.inner.config
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.initialized.load(Ordering::Acquire)
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    pub fn status(&self) -> ProviderStatus {
        let slot = self.inner.lock_slot();
        let state = self.inner.current.load();
        ProviderStatus {
            key: self.inner.key.clone(),
            initialized: self.is_initialized(),
            disposed: self.is_disposed(),
            connected: slot.session.is_some(),
            generation: slot.generation,
            last_refresh: slot.last_refresh,
            collections: state.collections.len(),
            aliases: state.aliases.len(),
        }
    }
}

impl StateSource for CloudStateProvider {
    fn cloud_state(&self) -> Arc<CloudState> {
        self.inner.current.load_full()
    }

    fn fresh_cloud_state(&self) -> Arc<CloudState> {
        if let Err(e) = self.inner.synchronized_update(true) {
            tracing::warn!("Forced refresh of {} failed: {}", self.inner.key, e);
        }
        self.cloud_state()
    }

    fn metrics(&self) -> Option<&ProviderMetrics> {
        Some(&self.inner.metrics)
    }
}

impl StateProvider for CloudStateProvider {
    fn key(&self) -> &str {
        &self.inner.key
    }

    fn init(&self) -> Result<()> {
        if self.inner.initialized.load(Ordering::Acquire) {
            return Ok(());
        }

        let mut slot = self.inner.lock_slot();
        if self.inner.disposed.load(Ordering::Acquire) {
            return Err(Error::Disposed);
        }
        if !self.inner.initialized.load(Ordering::Acquire) {
            self.inner.update(&mut slot, false)?;
            self.inner.initialized.store(true, Ordering::Release);
        }
        Ok(())
    }

    fn dispose(&self) {
        if self.inner.disposed.load(Ordering::Acquire) {
            return;
        }

        let mut slot = self.inner.lock_slot();
        if !self.inner.disposed.load(Ordering::Acquire) {
            if let Some(session) = slot.session.take() {
                session.close();
            }
            self.inner.disposed.store(true, Ordering::Release);
            tracing::info!("Cluster-state provider {} disposed", self.inner.key);
        }
    }
}

impl Drop for CloudStateProvider {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl ProviderInner {
    fn lock_slot(&self) -> MutexGuard<'_, SessionSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Refresh under the provider lock; skipped once disposed
    fn synchronized_update(&self, clean_session: bool) -> Result<()> {
        let mut slot = self.lock_slot();
        if self.disposed.load(Ordering::Acquire) {
            tracing::debug!("Ignoring refresh of disposed provider {}", self.key);
            return Ok(());
        }
        self.update(&mut slot, clean_session)?;
        // Serving a published snapshot counts as initialized
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    fn handle_notification(&self, event: WatchedEvent) {
        self.metrics.notifications.inc();

        let clean_session = match &event {
            WatchedEvent::Node { path, .. } if !path.is_empty() => false,
            event if event.requires_reconnect() => true,
            other => {
                tracing::debug!("Ignoring coordination event {:?}", other);
                return;
            }
        };

        tracing::debug!("Coordination event {:?}, refreshing", event);
        if let Err(e) = self.synchronized_update(clean_session) {
            self.metrics.notification_failures.inc();
            tracing::error!(
                "Refresh after {:?} failed, keeping previous cluster state: {}",
                event,
                e
            );
        }
    }

    fn update(&self, slot: &mut SessionSlot, clean_session: bool) -> Result<()> {
        let started = Instant::now();
        let result = self.rebuild(slot, clean_session);
        self.metrics.record_refresh(started.elapsed(), result.is_ok());
        result
    }

    fn rebuild(&self, slot: &mut SessionSlot, clean_session: bool) -> Result<()> {
        if slot.session.is_none() || clean_session {
            if let Some(old) = slot.session.take() {
                old.close();
            }
            let sink: Arc<dyn NotificationSink> = Arc::new(ProviderSink {
                provider: self.weak_self.clone(),
            });
            let session = self.connector.connect(
                &self.config.connection,
                self.config.session_timeout(),
                sink,
            )?;
            self.metrics.reconnects.inc();
            tracing::info!("Opened coordination session to {}", self.key);
            slot.session = Some(session);
        }

        let session = slot
            .session
            .as_deref()
            .ok_or_else(|| Error::Internal("no coordination session after connect".into()))?;

        let state = self
            .internal_collections_state(session)?
            .merge(self.external_collections_state(session)?);

        slot.generation += 1;
        slot.last_refresh = Some(Utc::now());
        self.metrics.collections.set(state.collections.len() as u64);
        tracing::info!(
            "Published cluster state #{} from {}: {} collections, {} aliases",
            slot.generation,
            self.key,
            state.collections.len(),
            state.aliases.len()
        );
        self.current.store(Arc::new(state));
        Ok(())
    }

    /// Global document plus aliases; each degrades on its own
    fn internal_collections_state(&self, session: &dyn CoordinationSession) -> Result<CloudState> {
        let data = self.fetch(session, &self.config.cluster_state_path)?;
        let aliases = self.fetch(session, &self.config.aliases_path)?;

        let mut state = match data {
            Some(data) => self.parse_or_empty(&self.config.cluster_state_path, || {
                self.parser.parse_cluster_state(&data, None)
            }),
            None => CloudState::empty(),
        };
        if let Some(aliases) = aliases {
            state.aliases = self.parse_or_empty(&self.config.aliases_path, || {
                self.parser.parse_aliases(&aliases)
            });
        }
        Ok(state)
    }

    /// Parse failures count as fetch failures and leave `T::default()`
    fn parse_or_empty<T: Default>(&self, path: &str, parse: impl FnOnce() -> Result<T>) -> T {
        parse().unwrap_or_else(|e| {
            self.metrics.fetch_failures.inc();
            tracing::warn!("Unreadable {}, ignoring it: {}", path, e);
            T::default()
        })
    }

    /// One contribution per child of the collections container
    fn external_collections_state(&self, session: &dyn CoordinationSession) -> Result<CloudState> {
        let collections_path = &self.config.collections_path;
        let children = match session.get_children(collections_path, true) {
            Ok(Some(children)) => children,
            Ok(None) => return Ok(CloudState::empty()),
            Err(e @ Error::Session(_)) => return Err(e),
            Err(e) => {
                self.metrics.fetch_failures.inc();
                tracing::warn!("Listing {} failed: {}", collections_path, e);
                return Ok(CloudState::empty());
            }
        };

        let mut result = CloudState::empty();
        for child in children {
            let path = self.config.collection_state_path(&child);
            let contribution = match self.fetch(session, &path)? {
                Some(data) => self.parse_or_empty(&path, || self.parser.parse_collection_state(&data)),
                // Collections kept in the global document have no own state node
                None => CloudState::empty(),
            };
            result = result.merge(contribution);
        }
        Ok(result)
    }

    /// Read one document with a watch. Failures other than a lost session
    /// degrade to "missing".
    fn fetch(&self, session: &dyn CoordinationSession, path: &str) -> Result<Option<Vec<u8>>> {
        tracing::debug!("Fetching {}", path);
        match session.get_data(path, true) {
            Ok(data) => Ok(data),
            Err(e @ Error::Session(_)) => Err(e),
            Err(e) => {
                self.metrics.fetch_failures.inc();
                tracing::warn!("Fetching {} failed, using empty contribution: {}", path, e);
                Ok(None)
            }
        }
    }
}

/// Routes session notifications back into the provider without keeping
/// it alive
struct ProviderSink {
    provider: Weak<ProviderInner>,
}

impl NotificationSink for ProviderSink {
    fn process(&self, event: WatchedEvent) {
        match self.provider.upgrade() {
            Some(provider) => provider.handle_notification(event),
            None => tracing::debug!("Dropping {:?} for a released provider", event),
        }
    }
}

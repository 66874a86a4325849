//! # shardlocate
//!
//! Endpoint discovery for sharded, replicated search clusters whose
//! membership lives in a coordination service (ZooKeeper):
//! - Cached, immutable cluster-state snapshots refreshed on watch events
//! - Per-document degradation when one state document cannot be read
//! - Leader-preferred replica selection with fallback and one forced
//!   resynchronization
//! - Collection-scoped operations routed per call
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────┐
//! │     Coordination service     │
//! │ /clusterstate.json           │
//! │ /aliases.json                │
//! │ /collections/<c>/state.json  │
//! └──────────────┬───────────────┘
//!        get + watch │ ▲ notifications
//!                ┌───▼─┴──────────────┐
//!                │ CloudStateProvider │──► Arc<CloudState> (lock-free reads)
//!                └─────────┬──────────┘
//!                          │ ReplicaManager::get_shard_url
//!                ┌─────────▼──────────┐
//!                │  CloudOperations   │──► OperationsFactory(url)
//!                └────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```no_run
//! use shardlocate::cloud::{CloudStateProvider, MemoryCoordinator, ReplicaManager, StateProvider};
//! use shardlocate::ProviderConfig;
//!
//! # fn main() -> shardlocate::Result<()> {
//! let provider = CloudStateProvider::new(ProviderConfig::new("zk1:2181/solr"), MemoryCoordinator::new())?;
//! provider.init()?;
//! let url = provider.get_shard_url(true, Some("docs"), true)?;
//! # let _ = url;
//! # Ok(())
//! # }
//! ```

pub mod cloud;
pub mod common;

// Re-export commonly used types
pub use cloud::{CloudState, CloudStateProvider, ReplicaManager, StateProvider, StateSource};
pub use common::{Config, Error, ProviderConfig, Result};

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build info
pub const BUILD_INFO: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("CARGO_PKG_NAME"), ")");

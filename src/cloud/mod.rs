//! Cluster-state client
//!
//! The provider is responsible for:
//! - Owning the coordination-service session
//! - Fetching and merging global and per-collection state documents
//! - Republishing an immutable snapshot when watches fire
//!
//! Replica selection and the collection-scoped operations façade read the
//! published snapshot.

pub mod memory;
pub mod operations;
pub mod parser;
pub mod provider;
pub mod replica;
pub mod session;
pub mod state;
#[cfg(feature = "zk")]
pub mod zk;

pub use memory::MemoryCoordinator;
pub use operations::{
    CloudOperations, CollectionResolver, DefaultCollectionResolver, NamedCollection,
    OperationsFactory, ResolverRegistry,
};
pub use parser::{JsonStateParser, StateParser};
pub use provider::{CloudStateProvider, ProviderStatus, StateProvider, StateSource};
pub use replica::{select_replicas, ReplicaManager};
pub use session::{
    CoordinationSession, NodeEvent, NotificationSink, SessionConnector, SessionEvent,
    WatchedEvent,
};
pub use state::{CloudState, Collection, Replica, Shard};
#[cfg(feature = "zk")]
pub use zk::ZkConnector;

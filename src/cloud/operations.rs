//! Collection-scoped operations
//!
//! [`CloudOperations`] binds a document type to a collection and transport
//! mode. Each call picks a shard URL through the replica manager and runs
//! the caller's closure against operations built for that URL by an
//! external [`OperationsFactory`].
//!
//! Writes prefer the leader, but when no leader is currently known the
//! leader fallback may route a write to another active replica.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::cloud::provider::StateSource;
use crate::cloud::replica::ReplicaManager;
use crate::cloud::state::Replica;
use crate::common::{Error, Result};

/// Which collection (and transport mode) documents of type `T` live in
pub trait CollectionResolver<T>: Send + Sync {
    /// `None` means the default collection
    fn collection_name(&self) -> Option<String>;

    /// Send queries as POST bodies instead of query strings
    fn is_post_connection(&self) -> bool {
        false
    }
}

/// No explicit collection, GET transport
pub struct DefaultCollectionResolver<T> {
    _doc: PhantomData<fn() -> T>,
}

impl<T> DefaultCollectionResolver<T> {
    pub fn new() -> Self {
        Self { _doc: PhantomData }
    }
}

impl<T> Default for DefaultCollectionResolver<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> CollectionResolver<T> for DefaultCollectionResolver<T> {
    fn collection_name(&self) -> Option<String> {
        None
    }
}

/// Fixed collection name and transport mode
pub struct NamedCollection<T> {
    name: String,
    post_connection: bool,
    _doc: PhantomData<fn() -> T>,
}

impl<T> NamedCollection<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            post_connection: false,
            _doc: PhantomData,
        }
    }

    pub fn post(mut self) -> Self {
        self.post_connection = true;
        self
    }
}

impl<T> CollectionResolver<T> for NamedCollection<T> {
    fn collection_name(&self) -> Option<String> {
        Some(self.name.clone())
    }

    fn is_post_connection(&self) -> bool {
        self.post_connection
    }
}

/// Resolvers keyed by document type
#[derive(Default)]
pub struct ResolverRegistry {
    resolvers: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl ResolverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: 'static>(&mut self, resolver: impl CollectionResolver<T> + 'static) -> &mut Self {
        let resolver: Arc<dyn CollectionResolver<T>> = Arc::new(resolver);
        self.resolvers.insert(TypeId::of::<T>(), Box::new(resolver));
        self
    }

    /// Registered resolver for `T`, or [`DefaultCollectionResolver`]
    pub fn resolve<T: 'static>(&self) -> Arc<dyn CollectionResolver<T>> {
        self.resolvers
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.downcast_ref::<Arc<dyn CollectionResolver<T>>>())
            .cloned()
            .unwrap_or_else(|| Arc::new(DefaultCollectionResolver::<T>::new()))
    }
}

/// Builds per-URL operation handles for documents of type `T`
pub trait OperationsFactory<T>: Send + Sync {
    type Read;
    type Write;

    fn read_operations(&self, url: &str, post_connection: bool) -> Option<Self::Read>;

    fn write_operations(&self, url: &str, post_connection: bool) -> Option<Self::Write>;
}

/// Operations on one collection of a cluster, routed per call
pub struct CloudOperations<T, F> {
    provider: Arc<dyn StateSource>,
    factory: Arc<F>,
    post_connection: bool,
    collection: Option<String>,
    _doc: PhantomData<fn() -> T>,
}

impl<T, F> CloudOperations<T, F>
where
    F: OperationsFactory<T>,
{
    pub fn new(provider: Arc<dyn StateSource>, factory: Arc<F>, post_connection: bool) -> Self {
        Self {
            provider,
            factory,
            post_connection,
            collection: None,
            _doc: PhantomData,
        }
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    pub fn from_resolver(
        provider: Arc<dyn StateSource>,
        factory: Arc<F>,
        resolver: &dyn CollectionResolver<T>,
    ) -> Self {
        Self {
            collection: resolver.collection_name().filter(|name| !name.is_empty()),
            ..Self::new(provider, factory, resolver.is_post_connection())
        }
    }

    pub fn from_registry(provider: Arc<dyn StateSource>, factory: Arc<F>, registry: &ResolverRegistry) -> Self
    where
        T: 'static,
    {
        Self::from_resolver(provider, factory, registry.resolve::<T>().as_ref())
    }

    pub fn collection(&self) -> Option<&str> {
        self.collection.as_deref()
    }

    pub fn is_post_connection(&self) -> bool {
        self.post_connection
    }

    pub fn get_shard_url(&self, leader: bool) -> Result<String> {
        self.provider.get_shard_url(leader, self.collection(), true)
    }

    pub fn select_replicas(&self, leaders: bool) -> Result<Vec<Replica>> {
        self.provider.select_replicas(leaders, self.collection())
    }

    pub fn perform_read_operation<R>(&self, operation: impl FnOnce(&F::Read) -> R, leader: bool) -> Result<R> {
        let url = self.get_shard_url(leader)?;
        let operations = self
            .factory
            .read_operations(&url, self.post_connection)
            .ok_or_else(|| Error::OperationsUnavailable(url.clone()))?;
        Ok(operation(&operations))
    }

    pub fn perform_write_operation<R>(&self, operation: impl FnOnce(&F::Write) -> R, leader: bool) -> Result<R> {
        let url = self.get_shard_url(leader)?;
        let operations = self
            .factory
            .write_operations(&url, self.post_connection)
            .ok_or_else(|| Error::OperationsUnavailable(url.clone()))?;
        Ok(operation(&operations))
    }

    /// Read from any active replica
    pub fn read<R>(&self, operation: impl FnOnce(&F::Read) -> R) -> Result<R> {
        self.perform_read_operation(operation, false)
    }

    /// Write, preferring the shard leader
    pub fn write<R>(&self, operation: impl FnOnce(&F::Write) -> R) -> Result<R> {
        self.perform_write_operation(operation, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::state::{CloudState, Collection, Shard};
    use std::sync::Mutex;

    struct Product;
    struct Review;

    struct StaticSource(Arc<CloudState>);

    impl StateSource for StaticSource {
        fn cloud_state(&self) -> Arc<CloudState> {
            self.0.clone()
        }

        fn fresh_cloud_state(&self) -> Arc<CloudState> {
            self.0.clone()
        }
    }

    #[derive(Debug, PartialEq)]
    struct Handle {
        url: String,
        post: bool,
    }

    #[derive(Default)]
    struct RecordingFactory {
        urls: Mutex<Vec<String>>,
        refuse: bool,
    }

    impl OperationsFactory<Product> for RecordingFactory {
        type Read = Handle;
        type Write = Handle;

        fn read_operations(&self, url: &str, post_connection: bool) -> Option<Handle> {
            self.urls.lock().unwrap().push(url.to_string());
            (!self.refuse).then(|| Handle {
                url: url.to_string(),
                post: post_connection,
            })
        }

        fn write_operations(&self, url: &str, post_connection: bool) -> Option<Handle> {
            self.read_operations(url, post_connection)
        }
    }

    fn source() -> Arc<dyn StateSource> {
        let state = CloudState::from_collections([
            Collection::new("products").with_shard(
                Shard::new("shard1", true)
                    .with_replica(Replica::new("r1", "http://h1/products", true, true))
                    .with_replica(Replica::new("r2", "http://h2/products", true, false)),
            ),
            Collection::new("reviews").with_shard(
                Shard::new("shard1", true)
                    .with_replica(Replica::new("r1", "http://h3/reviews", true, true)),
            ),
        ]);
        Arc::new(StaticSource(Arc::new(state)))
    }

    #[test]
    fn test_write_goes_to_leader() {
        let factory = Arc::new(RecordingFactory::default());
        let ops = CloudOperations::<Product, _>::new(source(), factory.clone(), true).with_collection("products");

        for _ in 0..10 {
            let handle = ops.write(|h| h.url.clone()).unwrap();
            assert_eq!(handle, "http://h1/products");
        }
        let post = ops.read(|h| h.post).unwrap();
        assert!(post);
    }

    #[test]
    fn test_factory_refusal_is_error() {
        let factory = Arc::new(RecordingFactory {
            refuse: true,
            ..Default::default()
        });
        let ops = CloudOperations::<Product, _>::new(source(), factory, false).with_collection("reviews");

        let err = ops.read(|_| ()).unwrap_err();
        assert!(matches!(err, Error::OperationsUnavailable(url) if url == "http://h3/reviews"));
    }

    #[test]
    fn test_registry_resolution() {
        let mut registry = ResolverRegistry::new();
        registry.register::<Product>(NamedCollection::new("reviews").post());

        let product = registry.resolve::<Product>();
        assert_eq!(product.collection_name().as_deref(), Some("reviews"));
        assert!(product.is_post_connection());

        let review = registry.resolve::<Review>();
        assert_eq!(review.collection_name(), None);
        assert!(!review.is_post_connection());
    }

    #[test]
    fn test_from_registry_binds_collection() {
        let mut registry = ResolverRegistry::new();
        registry.register::<Product>(NamedCollection::new("reviews"));

        let factory = Arc::new(RecordingFactory::default());
        let ops = CloudOperations::<Product, _>::from_registry(source(), factory.clone(), &registry);

        assert_eq!(ops.collection(), Some("reviews"));
        assert_eq!(ops.read(|h| h.url.clone()).unwrap(), "http://h3/reviews");
        assert_eq!(ops.select_replicas(true).unwrap().len(), 1);
        assert_eq!(factory.urls.lock().unwrap().as_slice(), ["http://h3/reviews".to_string()]);
    }

    #[test]
    fn test_default_resolver_uses_first_collection() {
        let factory = Arc::new(RecordingFactory::default());
        let ops = CloudOperations::<Product, _>::from_resolver(
            source(),
            factory,
            &DefaultCollectionResolver::<Product>::new(),
        );

        assert_eq!(ops.collection(), None);
        assert_eq!(ops.get_shard_url(true).unwrap(), "http://h1/products");
    }
}

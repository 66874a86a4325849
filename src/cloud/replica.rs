//! Replica selection and load balancing
//!
//! Candidates are filtered by shard state, replica state and (optionally)
//! leadership; one is then picked uniformly at random. Randomization is the
//! only balancing mechanism.

use rand::seq::SliceRandom;

use crate::cloud::provider::StateSource;
use crate::cloud::state::{CloudState, Replica};
use crate::common::{Error, Result};

/// Select the active replicas of a collection.
///
/// `collection` may be an alias. Without a name the first collection in
/// iteration order is used, which is only meaningful for single-collection
/// clusters.
pub fn select_replicas(
    state: &CloudState,
    want_leaders: bool,
    collection: Option<&str>,
) -> Result<Vec<Replica>> {
    if state.collections.is_empty() {
        return Err(Error::UnavailableState);
    }

    let collection = match collection.map(|name| state.resolve_alias(name)) {
        Some(name) => state
            .collections
            .get(name)
            .ok_or_else(|| Error::UnknownCollection(name.to_string()))?,
        None => state
            .collections
            .values()
            .next()
            .ok_or(Error::UnavailableState)?,
    };

    Ok(collection
        .active_shard_replicas()
        .filter(|replica| replica.is_active && (!want_leaders || replica.is_leader))
        .cloned()
        .collect())
}

/// Endpoint selection on top of a [`StateSource`]
pub trait ReplicaManager {
    /// Active replicas of `collection` (leaders only if `want_leaders`)
    fn select_replicas(&self, want_leaders: bool, collection: Option<&str>) -> Result<Vec<Replica>>;

    /// URL of one suitable replica.
    ///
    /// A leader request falls back to any active replica when no leader is
    /// known. If nothing is selectable and `auto_refresh` is set, the state
    /// is resynchronized once and the lookup repeated without refresh.
    fn get_shard_url(&self, want_leader: bool, collection: Option<&str>, auto_refresh: bool) -> Result<String>;
}

impl<S: StateSource + ?Sized> ReplicaManager for S {
    fn select_replicas(&self, want_leaders: bool, collection: Option<&str>) -> Result<Vec<Replica>> {
        select_replicas(&self.cloud_state(), want_leaders, collection)
    }

    fn get_shard_url(&self, want_leader: bool, collection: Option<&str>, auto_refresh: bool) -> Result<String> {
        let mut replicas = self.select_replicas(want_leader, collection)?;

        if want_leader && replicas.is_empty() {
            replicas = self.select_replicas(false, collection)?;
            if !replicas.is_empty() {
                if let Some(metrics) = self.metrics() {
                    metrics.leader_fallbacks.inc();
                }
                tracing::debug!(
                    "No leader known for {}, falling back to any active replica",
                    collection_label(collection)
                );
            }
        }

        if replicas.is_empty() {
            if auto_refresh {
                tracing::warn!(
                    "No active replica for {}, forcing cluster state refresh",
                    collection_label(collection)
                );
                if let Some(metrics) = self.metrics() {
                    metrics.forced_refreshes.inc();
                }
                self.fresh_cloud_state();
                return self.get_shard_url(want_leader, collection, false);
            }
            return Err(Error::NoReplicaAvailable {
                collection: collection_label(collection).to_string(),
                leader: want_leader,
            });
        }

        let replica = replicas
            .choose(&mut rand::thread_rng())
            .ok_or_else(|| Error::Internal("empty candidate list".into()))?;
        if let Some(metrics) = self.metrics() {
            metrics.selections.inc();
        }
        Ok(replica.url.clone())
    }
}

fn collection_label(collection: Option<&str>) -> &str {
    collection.unwrap_or("<default>")
}

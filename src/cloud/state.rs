//! Cluster-state model
//!
//! A [`CloudState`] is one merged view of collections, shards, replicas and
//! aliases. Once published by the provider it is shared behind an `Arc` and
//! never mutated; a refresh always builds a new one.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One physical copy of a shard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replica {
    /// Replica id (e.g. `core_node3`)
    pub name: String,
    /// Base URL of the core serving this replica
    pub url: String,
    pub is_active: bool,
    pub is_leader: bool,
}

impl Replica {
    pub fn new(name: impl Into<String>, url: impl Into<String>, is_active: bool, is_leader: bool) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            is_active,
            is_leader,
        }
    }
}

/// One partition of a collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shard {
    pub name: String,
    pub is_active: bool,
    /// Hash range covered by this shard, when the router publishes one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
    pub replicas: BTreeMap<String, Replica>,
}

impl Shard {
    pub fn new(name: impl Into<String>, is_active: bool) -> Self {
        Self {
            name: name.into(),
            is_active,
            range: None,
            replicas: BTreeMap::new(),
        }
    }

    /// Builder-style replica insertion, keyed by replica name
    pub fn with_replica(mut self, replica: Replica) -> Self {
        self.replicas.insert(replica.name.clone(), replica);
        self
    }

    pub fn leader(&self) -> Option<&Replica> {
        self.replicas.values().find(|r| r.is_leader)
    }
}

/// A logical search index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    pub name: String,
    pub shards: BTreeMap<String, Shard>,
}

impl Collection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shards: BTreeMap::new(),
        }
    }

    pub fn with_shard(mut self, shard: Shard) -> Self {
        self.shards.insert(shard.name.clone(), shard);
        self
    }

    /// Replicas of active shards only
    pub fn active_shard_replicas(&self) -> impl Iterator<Item = &Replica> {
        self.shards
            .values()
            .filter(|shard| shard.is_active)
            .flat_map(|shard| shard.replicas.values())
    }
}

/// Merged, immutable view of cluster membership
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudState {
    pub collections: BTreeMap<String, Collection>,
    /// alias name → collection name
    pub aliases: BTreeMap<String, String>,
}

impl CloudState {
    pub fn new(collections: BTreeMap<String, Collection>) -> Self {
        Self {
            collections,
            aliases: BTreeMap::new(),
        }
    }

    pub fn with_aliases(
        collections: BTreeMap<String, Collection>,
        aliases: BTreeMap<String, String>,
    ) -> Self {
        Self {
            collections,
            aliases,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from a list of collections keyed by their own names
    pub fn from_collections(collections: impl IntoIterator<Item = Collection>) -> Self {
        Self::new(
            collections
                .into_iter()
                .map(|c| (c.name.clone(), c))
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    /// Follow an alias to its collection name; other names pass through
    pub fn resolve_alias<'a>(&'a self, name: &'a str) -> &'a str {
        self.aliases.get(name).map(String::as_str).unwrap_or(name)
    }

    pub fn collection(&self, name: &str) -> Option<&Collection> {
        self.collections.get(self.resolve_alias(name))
    }

    /// Fold another contribution into this one.
    ///
    /// Contributions are expected to cover disjoint collections. When both
    /// carry the same collection the incoming one replaces the existing
    /// entry, so per-collection documents override the global document.
    pub fn merge(mut self, other: CloudState) -> CloudState {
        if other.collections.is_empty() && other.aliases.is_empty() {
            return self;
        }

        for (name, collection) in other.collections {
            if self.collections.insert(name.clone(), collection).is_some() {
                tracing::warn!("Collection {} present in more than one state document, keeping the later one", name);
            }
        }
        self.aliases.extend(other.aliases);

        self
    }
}

//! Shared fixtures for integration tests

#![allow(dead_code)]

use shardlocate::cloud::{CloudStateProvider, MemoryCoordinator};
use shardlocate::ProviderConfig;

pub const CLUSTER_STATE: &str = "/clusterstate.json";
pub const ALIASES: &str = "/aliases.json";

/// Per-collection state path under the default layout
pub fn state_path(collection: &str) -> String {
    format!("/collections/{}/state.json", collection)
}

/// `(name, active, leader)` replicas of one shard
pub fn collection_doc(collection: &str, shard_active: bool, replicas: &[(&str, bool, bool)]) -> String {
    let replicas: serde_json::Map<String, serde_json::Value> = replicas
        .iter()
        .map(|(name, active, leader)| {
            (
                name.to_string(),
                serde_json::json!({
                    "core": format!("{}_{}", collection, name),
                    "base_url": format!("http://{}:8983/solr", name),
                    "state": if *active { "active" } else { "down" },
                    "leader": if *leader { "true" } else { "false" },
                }),
            )
        })
        .collect();

    serde_json::json!({
        collection: {
            "shards": {
                "shard1": {
                    "state": if shard_active { "active" } else { "inactive" },
                    "replicas": replicas,
                }
            }
        }
    })
    .to_string()
}

pub fn replica_url(collection: &str, replica: &str) -> String {
    format!("http://{}:8983/solr/{}_{}", replica, collection, replica)
}

pub fn provider(coord: &MemoryCoordinator) -> CloudStateProvider {
    CloudStateProvider::new(ProviderConfig::new("zk1:2181,zk2:2181/solr"), coord.clone())
        .expect("valid config")
}

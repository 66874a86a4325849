//! State document parsing
//!
//! The provider only sees raw bytes from the coordination service; a
//! [`StateParser`] turns them into [`CloudState`] contributions.
//! [`JsonStateParser`] understands the standard layout:
//!
//! ```text
//! {"docs": {"shards": {"shard1": {"range": "80000000-ffffffff", "state": "active",
//!   "replicas": {"core_node1": {"core": "docs_shard1_replica1",
//!     "base_url": "http://10.0.0.1:8983/solr", "state": "active", "leader": "true"}}}}}}
//! ```

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::cloud::state::{CloudState, Collection, Replica, Shard};
use crate::common::{Error, Result};

const STATE_ACTIVE: &str = "active";

/// Turns coordination-service documents into state contributions
pub trait StateParser: Send + Sync {
    /// Parse the global state document and the optional alias document
    fn parse_cluster_state(&self, state: &[u8], aliases: Option<&[u8]>) -> Result<CloudState>;

    /// Parse a per-collection state document
    fn parse_collection_state(&self, state: &[u8]) -> Result<CloudState>;

    /// Parse the alias document alone (alias name to collection name)
    fn parse_aliases(&self, aliases: &[u8]) -> Result<BTreeMap<String, String>> {
        Ok(self.parse_cluster_state(&[], Some(aliases))?.aliases)
    }
}

/// JSON parser for the standard cluster state layout
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonStateParser;

impl JsonStateParser {
    pub fn new() -> Self {
        Self
    }

    fn parse_collections(&self, data: &[u8]) -> Result<BTreeMap<String, Collection>> {
        let Some(root) = parse_object(data)? else {
            return Ok(BTreeMap::new());
        };

        root.into_iter()
            .map(|(name, value)| {
                let collection = build_collection(&name, &value)?;
                Ok((name, collection))
            })
            .collect()
    }
}

impl StateParser for JsonStateParser {
    fn parse_cluster_state(&self, state: &[u8], aliases: Option<&[u8]>) -> Result<CloudState> {
        let collections = self.parse_collections(state)?;
        let aliases = match aliases {
            Some(data) => self.parse_aliases(data)?,
            None => BTreeMap::new(),
        };
        Ok(CloudState::with_aliases(collections, aliases))
    }

    fn parse_collection_state(&self, state: &[u8]) -> Result<CloudState> {
        Ok(CloudState::new(self.parse_collections(state)?))
    }

    fn parse_aliases(&self, data: &[u8]) -> Result<BTreeMap<String, String>> {
        let Some(mut root) = parse_object(data)? else {
            return Ok(BTreeMap::new());
        };

        let Some(entries) = root.remove("collection") else {
            return Ok(BTreeMap::new());
        };
        let entries = match entries {
            Value::Object(map) => map,
            other => {
                return Err(Error::Parse(format!(
                    "aliases 'collection' must be an object, got {}",
                    other
                )))
            }
        };

        entries
            .into_iter()
            .map(|(alias, target)| match target {
                Value::String(target) => Ok((alias, target)),
                other => Err(Error::Parse(format!(
                    "alias {} must map to a collection name, got {}",
                    alias, other
                ))),
            })
            .collect()
    }
}

/// Empty or whitespace-only documents are treated as absent
fn parse_object(data: &[u8]) -> Result<Option<Map<String, Value>>> {
    if data.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    match serde_json::from_slice(data)? {
        Value::Object(map) => Ok(Some(map)),
        Value::Null => Ok(None),
        other => Err(Error::Parse(format!(
            "expected a JSON object, got {}",
            type_name(&other)
        ))),
    }
}

fn build_collection(name: &str, value: &Value) -> Result<Collection> {
    let mut collection = Collection::new(name);
    let Some(shards) = value.get("shards") else {
        return Ok(collection);
    };
    let shards = shards
        .as_object()
        .ok_or_else(|| Error::Parse(format!("collection {}: 'shards' is not an object", name)))?;

    for (shard_name, shard_value) in shards {
        collection = collection.with_shard(build_shard(shard_name, shard_value)?);
    }
    Ok(collection)
}

fn build_shard(name: &str, value: &Value) -> Result<Shard> {
    // Legacy documents carry no shard state; those shards are live
    let is_active = value
        .get("state")
        .and_then(Value::as_str)
        .map_or(true, |state| state == STATE_ACTIVE);

    let mut shard = Shard::new(name, is_active);
    shard.range = value.get("range").and_then(Value::as_str).map(str::to_string);

    if let Some(replicas) = value.get("replicas") {
        let replicas = replicas
            .as_object()
            .ok_or_else(|| Error::Parse(format!("shard {}: 'replicas' is not an object", name)))?;
        for (replica_name, replica_value) in replicas {
            shard = shard.with_replica(build_replica(replica_name, replica_value)?);
        }
    }
    Ok(shard)
}

fn build_replica(name: &str, value: &Value) -> Result<Replica> {
    let base_url = value
        .get("base_url")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Parse(format!("replica {}: missing base_url", name)))?;
    let core = value
        .get("core")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Parse(format!("replica {}: missing core", name)))?;

    let is_active = value.get("state").and_then(Value::as_str) == Some(STATE_ACTIVE);
    let is_leader = match value.get("leader") {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    };

    let url = format!("{}/{}", base_url.trim_end_matches('/'), core);
    Ok(Replica::new(name, url, is_active, is_leader))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLUSTER_STATE: &str = r#"{
        "docs": {
            "router": {"name": "compositeId"},
            "shards": {
                "shard1": {
                    "range": "80000000-ffffffff",
                    "state": "active",
                    "replicas": {
                        "core_node1": {
                            "core": "docs_shard1_replica1",
                            "base_url": "http://10.0.0.1:8983/solr",
                            "node_name": "10.0.0.1:8983_solr",
                            "state": "active",
                            "leader": "true"
                        },
                        "core_node2": {
                            "core": "docs_shard1_replica2",
                            "base_url": "http://10.0.0.2:8983/solr/",
                            "state": "recovering"
                        }
                    }
                },
                "shard2": {
                    "state": "inactive",
                    "replicas": {}
                }
            }
        }
    }"#;

    #[test]
    fn test_parse_cluster_state() {
        let aliases = br#"{"collection": {"current": "docs"}}"#;
        let state = JsonStateParser::new()
            .parse_cluster_state(CLUSTER_STATE.as_bytes(), Some(aliases))
            .unwrap();

        let docs = &state.collections["docs"];
        assert_eq!(docs.shards.len(), 2);

        let shard1 = &docs.shards["shard1"];
        assert!(shard1.is_active);
        assert_eq!(shard1.range.as_deref(), Some("80000000-ffffffff"));

        let leader = shard1.leader().unwrap();
        assert_eq!(leader.url, "http://10.0.0.1:8983/solr/docs_shard1_replica1");
        assert!(leader.is_active);

        let follower = &shard1.replicas["core_node2"];
        assert_eq!(follower.url, "http://10.0.0.2:8983/solr/docs_shard1_replica2");
        assert!(!follower.is_active);
        assert!(!follower.is_leader);

        assert!(!docs.shards["shard2"].is_active);
        assert_eq!(state.aliases["current"], "docs");
    }

    #[test]
    fn test_shard_without_state_is_active() {
        let doc = br#"{"c": {"shards": {"s": {"replicas": {"r": {
            "core": "c1", "base_url": "http://h:8983/solr", "state": "active", "leader": true}}}}}}"#;
        let state = JsonStateParser::new().parse_collection_state(doc).unwrap();
        let shard = &state.collections["c"].shards["s"];
        assert!(shard.is_active);
        assert!(shard.replicas["r"].is_leader);
    }

    #[test]
    fn test_empty_documents() {
        let parser = JsonStateParser::new();
        assert!(parser.parse_cluster_state(b"", None).unwrap().is_empty());
        assert!(parser.parse_cluster_state(b"{}", Some(b"")).unwrap().aliases.is_empty());
        assert!(parser.parse_collection_state(b"  \n").unwrap().is_empty());
    }

    #[test]
    fn test_parse_aliases_alone() {
        let parser = JsonStateParser::new();
        let aliases = parser.parse_aliases(br#"{"collection": {"a": "docs", "b": "logs"}}"#).unwrap();
        assert_eq!(aliases.len(), 2);
        assert_eq!(aliases["b"], "logs");

        assert!(parser.parse_aliases(b"{}").unwrap().is_empty());
        assert!(matches!(
            parser.parse_aliases(br#"{"collection": ["a"]}"#),
            Err(Error::Parse(_))
        ));
        assert!(matches!(
            parser.parse_cluster_state(CLUSTER_STATE.as_bytes(), Some(br#"{"collection": {"a": 1}}"#)),
            Err(Error::Parse(_))
        ));
    }

    #[test]
    fn test_malformed_documents() {
        let parser = JsonStateParser::new();
        assert!(matches!(
            parser.parse_collection_state(b"{not json"),
            Err(Error::Json(_))
        ));
        assert!(matches!(
            parser.parse_collection_state(b"[1, 2]"),
            Err(Error::Parse(_))
        ));
        let missing_url = br#"{"c": {"shards": {"s": {"replicas": {"r": {"core": "c1"}}}}}}"#;
        assert!(matches!(
            parser.parse_collection_state(missing_url),
            Err(Error::Parse(_))
        ));
    }
}

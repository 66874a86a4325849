//! Configuration for shardlocate components

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::common::utils::join_path;
use crate::common::{Error, Result};

/// Default config file name, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "shardlocate.toml";

/// Prefix for environment overrides (`SHARDLOCATE__PROVIDER__CONNECTION`)
pub const ENV_PREFIX: &str = "SHARDLOCATE";

/// Global configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Cluster-state provider config
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load from `shardlocate.toml` (if present) and the environment
    pub fn load() -> Result<Self> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load from a specific file (optional) and the environment.
    /// Environment variables take priority over the file.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

/// Cluster-state provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Coordination service connection string (`host:port[,host:port][/chroot]`)
    #[serde(default)]
    pub connection: String,

    /// Session timeout passed to the coordination service
    #[serde(default = "default_session_timeout")]
    pub session_timeout_ms: u64,

    /// Global cluster state document
    #[serde(default = "default_cluster_state_path")]
    pub cluster_state_path: String,

    /// Alias document
    #[serde(default = "default_aliases_path")]
    pub aliases_path: String,

    /// Container node listing per-collection state
    #[serde(default = "default_collections_path")]
    pub collections_path: String,

    /// Per-collection state document name under `collections_path/<name>/`
    #[serde(default = "default_collection_state_file")]
    pub collection_state_file: String,
}

fn default_session_timeout() -> u64 {
    10_000
}
fn default_cluster_state_path() -> String {
    "/clusterstate.json".to_string()
}
fn default_aliases_path() -> String {
    "/aliases.json".to_string()
}
fn default_collections_path() -> String {
    "/collections".to_string()
}
fn default_collection_state_file() -> String {
    "state.json".to_string()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            connection: String::new(),
            session_timeout_ms: default_session_timeout(),
            cluster_state_path: default_cluster_state_path(),
            aliases_path: default_aliases_path(),
            collections_path: default_collections_path(),
            collection_state_file: default_collection_state_file(),
        }
    }
}

impl ProviderConfig {
    pub fn new(connection: impl Into<String>) -> Self {
        Self {
            connection: connection.into(),
            ..Default::default()
        }
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms)
    }

    /// Path of the state document for one child of `collections_path`
    pub fn collection_state_path(&self, collection: &str) -> String {
        join_path(
            &join_path(&self.collections_path, collection),
            &self.collection_state_file,
        )
    }

    /// Reject configurations the provider cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.connection.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "coordination service connection string is empty".into(),
            ));
        }
        if self.session_timeout_ms == 0 {
            return Err(Error::InvalidConfig("session timeout must be > 0".into()));
        }
        for (name, path) in [
            ("cluster_state_path", &self.cluster_state_path),
            ("aliases_path", &self.aliases_path),
            ("collections_path", &self.collections_path),
        ] {
            if !path.starts_with('/') {
                return Err(Error::InvalidConfig(format!(
                    "{} must be absolute: {}",
                    name, path
                )));
            }
        }
        if self.collection_state_file.is_empty() || self.collection_state_file.contains('/') {
            return Err(Error::InvalidConfig(format!(
                "invalid collection state file name: {:?}",
                self.collection_state_file
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ProviderConfig::new("localhost:2181");
        assert!(config.validate().is_ok());
        assert_eq!(config.session_timeout(), Duration::from_secs(10));
        assert_eq!(
            config.collection_state_path("docs"),
            "/collections/docs/state.json"
        );
    }

    #[test]
    fn test_empty_connection_rejected() {
        let err = ProviderConfig::default().validate().unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_relative_path_rejected() {
        let mut config = ProviderConfig::new("localhost:2181");
        config.aliases_path = "aliases.json".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
log_level = "debug"

[provider]
connection = "zk1:2181,zk2:2181/solr"
session_timeout_ms = 5000
"#
        )
        .unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.provider.connection, "zk1:2181,zk2:2181/solr");
        assert_eq!(config.provider.session_timeout_ms, 5000);
        assert_eq!(config.provider.collections_path, "/collections");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.provider.cluster_state_path, "/clusterstate.json");
    }
}

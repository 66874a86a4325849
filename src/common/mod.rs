//! Common utilities and types shared across shardlocate

pub mod config;
pub mod error;
pub mod metrics;
pub mod utils;

pub use config::{Config, ProviderConfig};
pub use error::{Error, Result};
pub use metrics::ProviderMetrics;
pub use utils::{join_path, parse_duration};

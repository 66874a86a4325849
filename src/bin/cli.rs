//! CLI for inspecting cluster state through ZooKeeper

use clap::{Parser, Subcommand};
use shardlocate::cloud::{CloudStateProvider, ReplicaManager, StateProvider, StateSource, ZkConnector};
use shardlocate::common::parse_duration;
use shardlocate::Config;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "shardlocate")]
#[command(about = "Inspect collections and pick replica endpoints from ZooKeeper")]
#[command(version)]
struct Cli {
    /// ZooKeeper connection string (overrides config)
    #[arg(long)]
    zk: Option<String>,

    /// Config file
    #[arg(long, default_value = shardlocate::common::config::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Session timeout (e.g. "10s", overrides config)
    #[arg(long)]
    session_timeout: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the merged cluster state as JSON
    State,

    /// List selectable replicas of a collection
    Replicas {
        /// Collection or alias (first collection if omitted)
        #[arg(long)]
        collection: Option<String>,

        /// Leaders only
        #[arg(long)]
        leaders: bool,
    },

    /// Print one shard URL
    Url {
        /// Collection or alias (first collection if omitted)
        #[arg(long)]
        collection: Option<String>,

        /// Prefer the shard leader
        #[arg(long)]
        leader: bool,

        /// Fail instead of resynchronizing when nothing is selectable
        #[arg(long)]
        no_refresh: bool,
    },

    /// Print provider status and metrics
    Metrics,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load config from file, then override with CLI arguments
    let mut config = Config::load_from(&cli.config)?;
    if let Some(zk) = cli.zk {
        config.provider.connection = zk;
    }
    if let Some(timeout) = cli.session_timeout.as_deref() {
        config.provider.session_timeout_ms =
            u64::try_from(parse_duration(timeout)?.as_millis()).unwrap_or(u64::MAX);
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let provider = CloudStateProvider::new(config.provider, ZkConnector::new())?;
    provider.init()?;

    match cli.command {
        Commands::State => {
            let state = provider.cloud_state();
            println!("{}", serde_json::to_string_pretty(state.as_ref())?);
        }

        Commands::Replicas { collection, leaders } => {
            let replicas = provider.select_replicas(leaders, collection.as_deref())?;
            if replicas.is_empty() {
                println!("No selectable replicas");
            }
            for replica in replicas {
                println!(
                    "{}\t{}{}",
                    replica.name,
                    replica.url,
                    if replica.is_leader { "\tleader" } else { "" }
                );
            }
        }

        Commands::Url {
            collection,
            leader,
            no_refresh,
        } => {
            let url = provider.get_shard_url(leader, collection.as_deref(), !no_refresh)?;
            println!("{}", url);
        }

        Commands::Metrics => {
            let status = provider.status();
            println!("Provider status:");
            println!("  Key: {}", status.key);
            println!("  Generation: {}", status.generation);
            println!("  Collections: {}", status.collections);
            println!("  Aliases: {}", status.aliases);
            if let Some(at) = status.last_refresh {
                println!("  Last refresh: {}", at.to_rfc3339());
            }
            if let Some(metrics) = provider.metrics() {
                print!("{}", metrics.to_prometheus());
            }
        }
    }

    provider.dispose();
    Ok(())
}

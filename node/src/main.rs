// chainmirror: replicate a chain from RPC peers into local storage

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use node::config::MirrorConfig;
use node::network::NetworkProfile;
use node::sync::SyncEvent;
use node::{logging, metrics, Node};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "chainmirror")]
#[command(about = "Mirror a blockchain from a pool of RPC peers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Network profile: mainnet or testnet
    #[arg(short, long)]
    network: Option<NetworkProfile>,

    /// Peer endpoint; repeat to give several. Overrides the profile seeds
    #[arg(short, long = "endpoint")]
    endpoints: Vec<String>,

    /// Log level, e.g. debug or chainmirror=trace
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the syncer until interrupted
    Sync {
        /// Stop after this many seconds
        #[arg(long)]
        duration_secs: Option<u64>,
    },

    /// Print the current block count
    Height,

    /// Print the version reported by an active peer
    Version,

    /// Print peer telemetry once the mesh is ready
    Peers,

    /// Drop stored copies of a block beyond the first N
    Prune {
        height: u64,

        #[arg(long, default_value_t = 1)]
        keep: u32,
    },
}

#[derive(Default)]
struct SyncReport {
    succeeded: u64,
    failed: u64,
    max_height: Option<u64>,
}

impl SyncReport {
    fn record(&mut self, event: &SyncEvent) {
        if let SyncEvent::FetchCompleted { height, success } = event {
            if *success {
                self.succeeded += 1;
                self.max_height = self.max_height.max(Some(*height));
            } else {
                self.failed += 1;
            }
        }
    }
}

fn load_config(cli: &Cli) -> Result<MirrorConfig> {
    let mut config = MirrorConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(profile) = cli.network {
        config.network.profile = profile;
    }
    if !cli.endpoints.is_empty() {
        config.network.endpoints = cli.endpoints.clone();
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    // One-shot commands never run the syncer
    if !matches!(cli.command, Commands::Sync { .. }) {
        config.syncer.start_on_init = false;
    }
    config.validate()?;
    Ok(config)
}

async fn run_sync(node: &Node, duration_secs: Option<u64>) -> Result<()> {
    let mut events = node.syncer().subscribe();
    if !node.syncer().is_running() {
        node.syncer().start().await;
    }

    let deadline = async {
        match duration_secs {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    let mut report = SyncReport::default();
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => report.record(&event),
                Err(RecvError::Lagged(skipped)) => warn!("report skipped {} events", skipped),
                Err(RecvError::Closed) => break,
            },
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }

    println!(
        "fetched: {} failed: {} max height: {}",
        report.succeeded,
        report.failed,
        report
            .max_height
            .map_or_else(|| "-".to_string(), |h| h.to_string())
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    logging::init_logging(&config.logging);
    metrics::install_exporter(&config.metrics)?;

    let node = Node::new(config).await?;

    let outcome = match &cli.command {
        Commands::Sync { duration_secs } => run_sync(&node, *duration_secs).await,
        Commands::Height => {
            node.mesh().wait_until_ready().await;
            let height = node.api().get_block_count().await?;
            println!("{height}");
            Ok(())
        }
        Commands::Version => {
            node.mesh().wait_until_ready().await;
            let version = node.api().get_version().await?;
            println!("{}", serde_json::to_string_pretty(&version)?);
            Ok(())
        }
        Commands::Peers => {
            node.mesh().wait_until_ready().await;
            println!(
                "{:<40} {:>8} {:>10} {:>10} {:>8}",
                "endpoint", "active", "latency", "height", "pending"
            );
            for peer in node.mesh().peers() {
                let t = peer.telemetry();
                println!(
                    "{:<40} {:>8} {:>10} {:>10} {:>8}",
                    peer.endpoint(),
                    t.is_active.map_or("?".to_string(), |a| a.to_string()),
                    t.latency_ms.map_or("?".to_string(), |l| format!("{l}ms")),
                    t.height.map_or("?".to_string(), |h| h.to_string()),
                    t.pending_requests
                );
            }
            Ok(())
        }
        Commands::Prune { height, keep } => {
            node.storage().prune_block(*height, *keep).await?;
            println!("pruned height {height} to {keep} copies");
            Ok(())
        }
    };

    node.close().await?;
    outcome
}

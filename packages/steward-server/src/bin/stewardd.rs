//! `stewardd` -- the fleet controller daemon.
//!
//! Runs one control loop per configured cluster and serves the operator API
//! plus the node report endpoint over HTTP.
//!
//! # Usage
//!
//! ```text
//! stewardd start -c steward.json         # run the daemon
//! stewardd check-config -c steward.json  # validate a config file and exit
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use steward_server::cluster::{
    ControllerSet, FleetController, HttpStatePublisher, StaticPeerLiveness, SystemClock,
};
use steward_server::network::{NetworkConfig, NetworkModule};
use steward_server::service::config::DaemonConfig;
use steward_server::store::{MemoryVersionStore, VersionStore};

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "stewardd", version, about = "Content cluster fleet controller daemon")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run controllers for every configured cluster and serve the API.
    Start {
        /// Path to the JSON configuration file.
        #[arg(short, long, env = "STEWARDD_CONFIG")]
        config: PathBuf,
    },
    /// Validate a configuration file and exit.
    CheckConfig {
        /// Path to the JSON configuration file.
        #[arg(short, long, env = "STEWARDD_CONFIG")]
        config: PathBuf,
    },
}

// ---------------------------------------------------------------------------
// Entrypoint
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_tracing();

    match cli.command {
        Commands::Start { config } => cmd_start(&config).await,
        Commands::CheckConfig { config } => cmd_check_config(&config),
    }
}

/// Initializes the `tracing` subscriber. Respects `RUST_LOG` when set,
/// otherwise logs at info.
fn setup_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

// ---------------------------------------------------------------------------
// stewardd start
// ---------------------------------------------------------------------------

async fn cmd_start(path: &Path) -> Result<()> {
    let config = DaemonConfig::from_file(path)?;
    info!(clusters = config.clusters.len(), "starting stewardd");

    if let Some(bind) = &config.metrics_bind {
        install_metrics_exporter(bind)?;
    }

    let store = open_version_store(&config)?;

    let controllers = Arc::new(ControllerSet::new());
    let mut workers = Vec::new();
    for spec in config.clusters.clone() {
        let publish_timeout = Duration::from_millis(spec.tuning.publish_timeout_ms);
        let controller = FleetController::new(
            spec,
            Arc::new(HttpStatePublisher::new(publish_timeout)?),
            Arc::new(StaticPeerLiveness),
            Arc::new(SystemClock),
            Arc::clone(&store),
        )?;
        let (handle, worker) = controller.spawn();
        controllers.insert(handle);
        workers.push(worker);
    }

    let network_config = NetworkConfig {
        host: config.host.clone(),
        port: config.port,
        ..NetworkConfig::default()
    };
    let mut module = NetworkModule::new(network_config, Arc::clone(&controllers));
    module.start().await.context("binding the operator API")?;

    module
        .serve(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    // Controllers stop after the listener so requests in flight during the
    // drain still reach a live control loop.
    for worker in &mut workers {
        worker.stop().await;
    }
    info!("stewardd stopped");
    Ok(())
}

/// Opens the configured version store, or falls back to the in-memory one
/// when no `storePath` is set.
fn open_version_store(config: &DaemonConfig) -> Result<Arc<dyn VersionStore>> {
    match &config.store_path {
        #[cfg(feature = "redb")]
        Some(path) => {
            let store = steward_server::store::RedbVersionStore::open(path)
                .with_context(|| format!("opening version store {}", path.display()))?;
            info!(path = %path.display(), "version store opened");
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "redb"))]
        Some(path) => anyhow::bail!(
            "storePath {} requires the redb feature, which is disabled in this build",
            path.display()
        ),
        None => {
            warn!("no storePath configured, version numbering will not survive restarts");
            Ok(Arc::new(MemoryVersionStore::new()))
        }
    }
}

fn install_metrics_exporter(bind: &str) -> Result<()> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let addr: std::net::SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid metricsBind address {bind}"))?;
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("installing the Prometheus exporter")?;
    info!(%addr, "Prometheus exporter listening");
    Ok(())
}

// ---------------------------------------------------------------------------
// stewardd check-config
// ---------------------------------------------------------------------------

fn cmd_check_config(path: &Path) -> Result<()> {
    let config = DaemonConfig::from_file(path)?;

    for cluster in &config.clusters {
        println!(
            "{}: {} storage nodes, {} distributors, generation {}",
            cluster.name,
            cluster.topology.storage_count(),
            cluster.topology.distributor_count,
            cluster.generation,
        );
    }
    println!("configuration OK");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

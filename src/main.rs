//! Capsule Vault Daemon
//!
//! Runs the capsule lifecycle service: HTTP API, readiness sweeper, and the
//! local record store, wired to the configured ledger and content-store
//! collaborators.
//!
//! ## Usage
//!
//! ```bash
//! # Start with defaults (in-memory collaborators, sweep every 60s)
//! capsule-vault
//!
//! # Start with custom config
//! capsule-vault --config /path/to/config.toml
//!
//! # Start with custom HTTP port
//! capsule-vault --http-port 8095
//!
//! # Store content on a real IPFS node
//! capsule-vault --ipfs-api-url http://127.0.0.1:5001
//!
//! # Disable the background sweeper (manual POST /sweep only)
//! capsule-vault --no-sweep
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::EnvFilter;

use capsule_vault::content_store::ContentStore;
use capsule_vault::services::{events, Services};
use capsule_vault::sweeper::{self, SweeperConfig};
use capsule_vault::{CapsuleDb, Config, HttpServer, IpfsClient, MemoryContentStore, MockLedger};

#[derive(Parser, Debug)]
#[command(name = "capsule-vault")]
#[command(about = "Time capsule lifecycle service")]
struct Args {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Storage directory
    #[arg(long)]
    storage_dir: Option<PathBuf>,

    /// HTTP API port
    #[arg(long)]
    http_port: Option<u16>,

    /// Seconds between readiness sweeps
    #[arg(long)]
    sweep_interval: Option<u64>,

    /// IPFS API URL for the content store (in-memory store when unset)
    #[arg(long, env = "IPFS_API_URL")]
    ipfs_api_url: Option<String>,

    /// Disable the background sweeper (manual POST /sweep only)
    #[arg(long)]
    no_sweep: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("capsule_vault=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let mut config = if let Some(config_path) = &args.config {
        Config::load(config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?
    } else {
        Config::default()
    };

    // CLI flags win over the file
    if let Some(dir) = args.storage_dir {
        config.storage_dir = dir;
    }
    if let Some(port) = args.http_port {
        config.http_port = port;
    }
    if let Some(interval) = args.sweep_interval {
        config.sweep_interval_secs = interval;
    }
    if args.ipfs_api_url.is_some() {
        config.ipfs_api_url = args.ipfs_api_url;
    }

    info!(
        storage_dir = %config.storage_dir.display(),
        http_port = config.http_port,
        sweep_interval_secs = config.sweep_interval_secs,
        "Starting capsule-vault"
    );

    tokio::fs::create_dir_all(&config.storage_dir)
        .await
        .context("Failed to create storage directory")?;

    // First run: write the effective defaults next to the db
    let config_path = config.config_path();
    if !config_path.exists() {
        config.save(&config_path).context("Failed to save config")?;
        info!(path = %config_path.display(), "Created default config");
    }

    // Open the record store
    let db = Arc::new(CapsuleDb::open(&config.storage_dir).context("Failed to open database")?);

    // Wire collaborators: the ledger is always the mock provider; the
    // content store is IPFS when an API URL is configured
    let ledger = Arc::new(MockLedger::new());
    let content_store: Arc<dyn ContentStore> = match &config.ipfs_api_url {
        Some(url) => {
            info!(url = %url, "Using IPFS content store");
            Arc::new(
                IpfsClient::new(url, config.content_store_timeout_secs)
                    .context("Failed to build IPFS client")?,
            )
        }
        None => {
            info!("Using in-memory content store");
            Arc::new(MemoryContentStore::new())
        }
    };

    let services = Arc::new(Services::new(db, ledger, content_store));

    // Audit log of lifecycle events
    events::spawn_logging_listener(services.events.clone());

    // Readiness sweeper, stopped through the shutdown broadcast
    let (shutdown_tx, _) = broadcast::channel(1);
    let sweeper_handle = if args.no_sweep {
        info!("Background sweeper disabled");
        None
    } else {
        Some(sweeper::spawn(
            services.capsules.clone(),
            SweeperConfig {
                interval_secs: config.sweep_interval_secs,
            },
            shutdown_tx.subscribe(),
        ))
    };

    // HTTP API
    let bind_addr: SocketAddr = ([0, 0, 0, 0], config.http_port).into();
    let server = Arc::new(HttpServer::new(services, bind_addr));

    tokio::select! {
        result = server.run() => {
            result.context("HTTP server failed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    // Stop the sweeper and wait for it to drain
    let _ = shutdown_tx.send(());
    if let Some(handle) = sweeper_handle {
        let _ = handle.await;
    }

    info!("capsule-vault stopped");
    Ok(())
}

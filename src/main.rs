// Allow dead code - some accessors are kept for API completeness
#![allow(dead_code)]

//! openisms: risk-assessment bookkeeping service
//!
//! Processes, assets, threats, containers, and controls are linked through
//! a flat many-to-many join table (the risktable) stored in a single JSON
//! document. The service recomputes weighted risk scores on read and serves
//! rendering-ready report structures over HTTP.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                        OPENISMS                            │
//! ├────────────────────────────────────────────────────────────┤
//! │  Assessment Store (data.json)  ←── whole-document commits  │
//! │  Control Library (controls.json) ← immutable reference     │
//! │  Join Engine (risktable)       ←── lookups, cascades       │
//! │  Risk Scoring                  ←── weighted, derived       │
//! │  HTTP API (8080)               ←── CRUD, reports, metrics  │
//! └────────────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

mod api;
mod config;
mod error;
mod reports;
mod risktable;
mod scoring;
mod store;
mod types;

use api::Metrics;
use config::OpenismsConfig;
use store::Store;

/// openisms - risk-assessment bookkeeping service
#[derive(Parser, Debug)]
#[command(name = "openisms")]
#[command(version = "0.1.0")]
#[command(about = "Risk-assessment bookkeeping over a flat JSON store", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "openisms.toml")]
    config: PathBuf,

    /// Directory holding data.json, controls.json, and deliverables.json;
    /// overrides the configured file paths
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// HTTP API port
    #[arg(long)]
    api_port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .init();

    info!("openisms v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = if args.config.exists() {
        OpenismsConfig::load(&args.config)?
    } else {
        warn!("Config file not found, using defaults");
        OpenismsConfig::default()
    };

    // Override config with CLI args
    let config = match &args.data_dir {
        Some(dir) => config.with_data_dir(dir),
        None => config,
    };
    let config = match args.api_port {
        Some(port) => config.with_api_port(port),
        None => config,
    };

    config.validate()?;

    info!("Configuration:");
    info!("   Data file: {:?}", config.data_file);
    info!("   Control library: {:?}", config.control_library_file);
    info!("   API port: {}", config.api_port);
    info!("   Risk divisor: {}", config.risk_score_divisor);

    let shared_config = Arc::new(config);

    // Open the store; this runs the impact-score repair pass
    let store = Store::open(&shared_config)?;
    let stats = store.stats();
    info!(
        "Store opened: {} processes, {} assets, {} threats, {} containers, {} link rows, {} library controls",
        stats.processes, stats.assets, stats.threats, stats.containers, stats.link_rows, stats.controls
    );

    let store = Arc::new(RwLock::new(store));
    let metrics = Arc::new(Metrics::new());

    let api_handle = tokio::spawn(api::run_api_server(
        shared_config.clone(),
        store.clone(),
        metrics.clone(),
    ));

    info!("Service started, press Ctrl+C to shut down");

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
        result = api_handle => {
            error!("HTTP API exited: {:?}", result);
        }
    }

    // Graceful shutdown: flush the document
    {
        let s = store.read().await;
        s.flush()?;
        info!("Assessment document flushed to disk");
    }

    info!("openisms shutting down");
    Ok(())
}

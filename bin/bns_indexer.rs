//! # BNS Indexer
//!
//! Runs one full crawl of the naming service and writes every name to the
//! document store.
//!
//! ## Usage
//!
//! ```bash
//! DATABASE_URL=postgres://... cargo run --bin bns-indexer -- --config Config.toml
//! ```
//!
//! Press Ctrl+C to stop; workers stop at their next wait and the counters
//! reached so far are printed.

use anyhow::{Context, Result};
use bns_indexer::{
    database, metrics, CoreRpcClient, HttpProfileResolver, Indexer, PostgresStore, Settings,
};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Parser)]
#[command(name = "bns-indexer", version, about = "Index every BNS name with its zone file and profile")]
struct Args {
    /// Settings file
    #[arg(long, default_value = "Config.toml")]
    config: PathBuf,

    /// Serve Prometheus metrics on this address (needs the `observability` feature)
    #[arg(long)]
    metrics_addr: Option<SocketAddr>,
}

#[cfg(not(feature = "observability"))]
fn init_telemetry(settings: &Settings, metrics_addr: Option<SocketAddr>) -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&settings.log.level))
        .init();
    if metrics_addr.is_some() {
        log::warn!("--metrics-addr ignored: built without the `observability` feature");
    }
    Ok(())
}

#[cfg(feature = "observability")]
fn init_telemetry(settings: &Settings, metrics_addr: Option<SocketAddr>) -> Result<()> {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log.level));
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .init();

    if let Some(addr) = metrics_addr {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("failed to install Prometheus exporter")?;
        tracing::info!(%addr, "📈 Metrics exporter listening");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let args = Args::parse();

    // 1. Load settings
    let settings = Settings::from_path(&args.config)
        .with_context(|| format!("failed to load settings from {}", args.config.display()))?;

    // 2. Logging and metrics
    init_telemetry(&settings, args.metrics_addr)?;
    metrics::describe_metrics();

    // 3. Upstream clients
    let client = Arc::new(CoreRpcClient::new(&settings.core)?);
    log::info!("🚀 Starting BNS indexer against {}", client.endpoint());
    let resolver = Arc::new(HttpProfileResolver::new(Duration::from_secs(
        settings.profiles.timeout_seconds,
    ))?);

    // 4. Document store
    let pool = database::connect(&settings.database).await?;
    let store = Arc::new(PostgresStore::new(pool));
    log::info!("✅ Database connected");

    // 5. Ctrl+C cancels the run
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            log::info!("🛑 Shutdown signal received, stopping crawl...");
            on_signal.cancel();
        }
    });

    // 6. Crawl
    let indexer = Indexer::new(&settings, client, resolver, store);
    let snapshot = indexer.run(cancel).await?;

    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    println!("cursor: {}", indexer.cursor().get());
    Ok(())
}

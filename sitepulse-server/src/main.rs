//! Sitepulse telemetry server
//!
//! The ingestion gateway for the marketing site's client telemetry:
//! rate limiting, CORS, CSRF double-submit and event persistence.

mod api;
mod config;
mod gateway;
mod server;
mod shutdown;
mod state;

use clap::Parser;
use config::ConfigLoader;
use rand::RngCore;
use server::{build_router, run_server};
use shutdown::spawn_config_reload_handler;
use sitepulse_core::csrf::CsrfService;
use sitepulse_core::limiter::RateLimiter;
use sitepulse_core::store::MemoryEventStore;
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Sitepulse - telemetry ingestion gateway
#[derive(Parser, Debug)]
#[command(name = "sitepulse-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./sitepulse-config.toml")]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:3000)
    #[arg(short, long)]
    listen: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    init_tracing();

    // Parse command line arguments
    let args = Args::parse();

    tracing::info!("Starting sitepulse-server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_loader = Arc::new(ConfigLoader::new(&args.config, args.listen));
    let loaded = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;

    let listen_addr = loaded.listen;
    tracing::info!("Configuration loaded from {:?}", args.config);

    let csrf_key = match &loaded.csrf_key {
        Some(key) => key.clone().into_bytes(),
        None => {
            tracing::warn!(
                "no csrf_key configured, generating an ephemeral one; \
                 tokens will not survive a restart"
            );
            let mut key = vec![0u8; 32];
            rand::rng().fill_bytes(&mut key);
            key
        }
    };

    // The persistence engine is an external collaborator; the built-in
    // backend keeps events in process memory.
    tracing::info!("Using the in-memory event store");

    let state = AppState::new(
        loaded.trusted_origins,
        RateLimiter::new(loaded.rate_policy),
        CsrfService::new(&csrf_key),
        Arc::new(MemoryEventStore::new()),
        Arc::new(loaded.validator),
    );

    // Spawn config reload handler (listens for SIGHUP)
    let shutdown_notify = spawn_config_reload_handler(state.clone(), config_loader);

    // Build the router
    let router = build_router(state);

    // Run the server
    tracing::info!("Starting HTTP server on {}", listen_addr);
    let result = run_server(router, listen_addr).await;

    // Signal the config reload handler to stop
    shutdown_notify.notify_one();
    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sitepulse_core=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

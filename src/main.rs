//! Cubby: a path-addressed key-value store over HTTPS and HTTP/3.
//!
//! This is the application entry point. It initializes tracing, loads
//! configuration from a TOML file, opens the embedded store, builds the
//! TLS configuration shared by both transports, sets up the Axum router,
//! and hands everything to the lifecycle controller until shutdown.

mod config;
mod error;
mod http;
mod middleware;
mod routes;
mod state;
mod store;
mod tls;

use std::net::SocketAddr;
use std::path::Path;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::{AppConfig, TlsMode, DEFAULT_CONFIG_PATH, DEFAULT_LOG_FILTER};
use crate::http::{wait_for_signal, Lifecycle};
use routes::create_router;
use state::AppState;
use store::Store;
use tls::{AcmeIssuer, TlsConfigBuilder};

/// Cubby: a path-addressed key-value store over HTTPS and HTTP/3
#[derive(Parser, Debug)]
#[command(name = "cubby", version, about)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Log level filter (e.g., "cubby=debug,tower_http=info")
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments
    let args = Args::parse();

    // Load configuration before tracing so the configured format applies
    let config = AppConfig::load(&args.config)?;

    // Initialize tracing with priority: CLI > env > default
    let log_filter = args
        .log_level
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

    let registry = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&log_filter));
    if config.logging.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("Loaded configuration");

    // Open the embedded store
    let store = Store::open(&config.storage.path)?;
    tracing::info!(path = %config.storage.path, "Opened store");

    let addr: SocketAddr = format!("{}:{}", config.http.host, config.http.port).parse()?;

    // Build the single TLS configuration both transports share
    let tls_settings = &config.http.tls;
    let mut builder = TlsConfigBuilder::new();
    let mut acme_task = None;

    if matches!(tls_settings.mode, TlsMode::Manual | TlsMode::Hybrid) {
        builder = builder.with_local(
            Path::new(&tls_settings.cert_path),
            Path::new(&tls_settings.key_path),
        )?;
    }
    if tls_settings.acme_enabled() {
        // Validated non-empty at config load
        let email = tls_settings.acme_email.as_deref().unwrap_or_default();
        let (issuer, task) = AcmeIssuer::spawn(
            email,
            &tls_settings.acme_domains,
            &tls_settings.acme_cache_dir,
            tls_settings.acme_production,
        )?;
        builder = builder.with_acme(&issuer);
        acme_task = Some(task);
    }
    let tls_config = builder.build()?;

    // Create application state and router
    let state = AppState::new(store);
    let app = create_router(state);

    // Bind everything, then serve until SIGINT/SIGTERM
    let lifecycle = Lifecycle::bind(addr, tls_config, &config.http, acme_task)?;
    tracing::info!(
        stream = %lifecycle.stream_addr()?,
        datagram = %lifecycle.datagram_addr()?,
        mode = ?config.http.tls.mode,
        "Listening on both transports"
    );

    lifecycle.run(app, wait_for_signal()).await?;

    Ok(())
}

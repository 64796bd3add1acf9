//! Resource arbitration server.
//!
//! ```text
//!     TCP clients                   ┌────────────────────────────────────┐
//!     ───────────────────────────▶  │ net::listener → admission          │
//!     {"username": ...}             │ net::connection → protocol framing │
//!     {"username","time",           │        │                           │
//!      "request"}                   │        ▼                           │
//!     ◀───────────────────────────  │ arbiter (sessions, 4 slots, bans)  │
//!     {"username","resource",       │        ▲                           │
//!      "status"}                    │ admin API ── ResourceServer        │
//!                                   └────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use resource_arbiter::admin::{serve_admin, AdminState};
use resource_arbiter::config::loader::load_config;
use resource_arbiter::config::watcher::ConfigWatcher;
use resource_arbiter::lifecycle::{wait_for_signal, Shutdown};
use resource_arbiter::observability::{logging, metrics};
use resource_arbiter::{ArbiterConfig, ResourceServer};

#[derive(Parser)]
#[command(name = "resource-arbiter")]
#[command(about = "Leases four shared resources to authorized TCP clients", long_about = None)]
struct Args {
    /// Path to a TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listening port from the configuration.
    #[arg(short, long)]
    port: Option<i64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => ArbiterConfig::default(),
    };
    if let Some(port) = args.port {
        config.listener.port = port;
    }

    logging::init_logging(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "resource-arbiter starting");

    tracing::info!(
        bind_host = %config.listener.bind_host,
        port = config.listener.port,
        client_limit = config.listener.client_limit,
        z_time_ms = config.leases.z_time_ms,
        permitted_users = config.auth.permitted_users.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let server = Arc::new(ResourceServer::new(&config));
    server.start().await?;

    // Hot reload. The CLI port override stays in force across reloads.
    let _watcher = match &args.config {
        Some(path) => {
            let (watcher, mut updates) = ConfigWatcher::new(path);
            match watcher.run() {
                Ok(handle) => {
                    let server = Arc::clone(&server);
                    let port_override = args.port;
                    tokio::spawn(async move {
                        while let Some(mut new_config) = updates.recv().await {
                            if let Some(port) = port_override {
                                new_config.listener.port = port;
                            }
                            server.apply_config(&new_config);
                            tracing::info!("Configuration reloaded");
                        }
                    });
                    Some(handle)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Config watcher unavailable, hot reload disabled");
                    None
                }
            }
        }
        None => None,
    };

    let admin_shutdown = Shutdown::new();
    if config.admin.enabled {
        match config.admin.bind_address.parse() {
            Ok(addr) => {
                let state = AdminState::new(Arc::clone(&server), &config.admin.api_key);
                let shutdown_rx = admin_shutdown.subscribe();
                tokio::spawn(async move {
                    if let Err(e) = serve_admin(addr, state, shutdown_rx).await {
                        tracing::error!(error = %e, "Admin API failed");
                    }
                });
            }
            Err(_) => tracing::error!(
                bind_address = %config.admin.bind_address,
                "Failed to parse admin bind address"
            ),
        }
    }

    wait_for_signal().await;

    admin_shutdown.trigger();
    server.stop().await;

    tracing::info!("Shutdown complete");
    Ok(())
}

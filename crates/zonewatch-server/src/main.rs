//! # zonewatch-server
//!
//! HTTP server for the zonewatch geofencing system.
//!
//! This binary provides:
//! - REST API for zone resolution, leave protection and adaptive polling
//! - OpenAPI documentation via Swagger UI
//! - Structured logging to file and stdout
//!
//! ## Running
//!
//! ```bash
//! # Development
//! cargo run --package zonewatch-server
//!
//! # Explicit configuration file
//! ZONEWATCH_CONFIG=./config.toml ./zonewatch-server
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;
use zonewatch_core::ZonewatchConfig;
use zonewatch_server::api::create_router;
use zonewatch_server::logging;
use zonewatch_server::state::AppState;

/// Environment variable naming the configuration file.
const CONFIG_PATH_ENV: &str = "ZONEWATCH_CONFIG";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = match std::env::var_os(CONFIG_PATH_ENV) {
        Some(path) => PathBuf::from(path),
        None => ZonewatchConfig::default_path()?,
    };
    let config = ZonewatchConfig::load_or_default(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    logging::init(config.server.production)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        users = config.users.len(),
        "Starting zonewatch-server"
    );

    let addr: SocketAddr = config
        .server
        .bind_address
        .parse()
        .with_context(|| format!("Invalid bind address '{}'", config.server.bind_address))?;

    let state = AppState::new(config, Some(config_path)).shared();
    let app = create_router(state);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

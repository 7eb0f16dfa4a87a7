//! # exhibit-server
//!
//! Daemon for an exhibit tag.
//!
//! This binary provides:
//! - The exhibit GATT service and LE advertising (via BlueZ)
//! - NFC tag emulation of the stored URL, with debounced visit counting
//! - A local bench API with an OpenAPI document
//! - Structured logging to file and stdout
//!
//! ## Running
//!
//! ```bash
//! # Development, no Bluetooth adapter needed
//! cargo run --package exhibit-server --features mock-bluetooth
//!
//! # On the exhibit unit
//! ./exhibit-server
//!
//! # Show the effective configuration
//! ./exhibit-server --print-config
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::net::SocketAddr;

use anyhow::Context;
use exhibit_core::ExhibitConfig;
use exhibit_server::api;
use exhibit_server::logging;
use exhibit_server::radio::Radio;
use exhibit_server::state::AppState;
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ExhibitConfig::load().context("Failed to load configuration")?;

    if std::env::args().skip(1).any(|arg| arg == "--print-config") {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    logging::init(config.server.production)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        name = %config.device.name,
        service_uuid = %config.device.service_uuid,
        "Starting exhibit-server"
    );

    let radio = Radio::start(&config).await?;
    let addr: SocketAddr = config
        .server
        .bind_address
        .parse()
        .context("Invalid server.bind_address")?;
    let app = api::create_router(AppState::new(&radio, config));

    let listener = TcpListener::bind(addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!(tag_running = radio.is_running(), "exhibit-server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(%err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

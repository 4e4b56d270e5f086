//! presence-watch - network presence detection daemon
//!
//! Decides whether one device is on the local network by combining direct
//! reachability probes with a UniFi controller's client table.

mod config;
mod db;
mod engine;
mod events;
mod monitor;
mod probe;
mod profile;
mod scheduler;
mod transport;
mod unifi;
mod web;

use config::ServerConfig;
use db::Store;
use events::{DeviceStatus, StatusBoard};
use monitor::Monitor;
use transport::ReqwestTransport;
use web::Server;

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("presence_watch=info".parse()?))
        .init();

    // Load configuration
    let cfg = ServerConfig::load()?;
    tracing::info!(
        "Watching {} at {}:{} ({} mode)",
        cfg.device.name, cfg.device.address, cfg.device.port, cfg.device.mode
    );
    tracing::info!("Using database at {}", cfg.db_path);

    // Restore the last known presence record
    let store = Store::new(&cfg.db_path)?;
    let initial = store.load_device(&cfg.device.name)?.unwrap_or_default();
    tracing::info!(
        "Restored state: {} ({} consecutive failures)",
        initial.record.presence, initial.record.failures
    );

    let board = Arc::new(StatusBoard::new(DeviceStatus::new(&cfg.device.name, &initial.record)));
    let transport = Arc::new(ReqwestTransport::new()?);

    let (monitor, handle) = Monitor::new(
        cfg.device.clone(),
        cfg.controller.clone(),
        transport,
        initial,
        board.clone(),
        Some(store),
    );
    tracing::info!("Effective detection mode: {}", monitor.mode());
    tokio::spawn(monitor.run());

    // Trace every attribute update at debug level
    let mut updates = board.subscribe();
    tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(update) => tracing::debug!(
                    attribute = ?update.attribute,
                    value = %update.value,
                    state_change = update.is_state_change,
                    "attribute update"
                ),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::debug!("attribute log lagged by {} updates", n)
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Start web server
    let server = Server::new(cfg.http_port, board, handle);
    server.start().await?;

    Ok(())
}

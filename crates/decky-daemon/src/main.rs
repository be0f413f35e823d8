//! Decky Daemon
//!
//! Keeps a Stream Deck in sync with the configured pages, handles key
//! presses and exposes a D-Bus control interface.

mod actions;
mod animation;
mod config;
mod connection;
mod controller;
mod dbus;
mod page;
mod platform;
mod rendering;
#[cfg(test)]
mod testing;
mod widgets;

use anyhow::{Context, Result};
use decky_hw::HidProvider;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::Config;
use controller::Controller;
use rendering::{ButtonRenderer, IconResolver};

#[tokio::main]
async fn main() -> Result<()> {
    // Setup logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(config::default_config_path);

    let config = Config::load(&config_path).with_context(|| {
        format!("Failed to load configuration from {}", config_path.display())
    })?;
    info!("Loaded configuration from: {}", config_path.display());
    let config = Arc::new(config);

    // Detection may query the session bus with blocking calls
    let platform = tokio::task::spawn_blocking(platform::detect_platform)
        .await
        .context("Platform detection failed")?;
    let renderer = ButtonRenderer::new(IconResolver::from_config(&config))
        .context("Failed to initialize renderer")?;

    let controller = Controller::new(config.clone(), Arc::new(HidProvider), platform, renderer);
    controller.start().await;

    // Start D-Bus service
    let _dbus_connection = match dbus::run_dbus_server(controller.clone(), config.dbus.bus).await
    {
        Ok(conn) => conn,
        Err(e) => {
            warn!(
                "Failed to start D-Bus service: {}. Continuing without D-Bus.",
                e
            );
            None
        }
    };

    // Setup Unix signal handlers
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())?;

    tokio::select! {
        _ = controller.cancelled() => {
            info!("Shutdown requested via D-Bus");
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down");
        }
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down");
        }
    }

    controller.shutdown().await;
    Ok(())
}

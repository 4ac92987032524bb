//! # floorsync-agent
//!
//! floorsync hub binary: loads settings, starts the HTTP/WebSocket server
//! and waits for Ctrl-C.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use floorsync_server::{HubConfig, HubServer};
use floorsync_settings::HubSettings;

/// floorsync real-time hub.
#[derive(Parser, Debug)]
#[command(name = "floorsync", about = "Real-time sync hub for the restaurant dashboard")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (defaults to `~/.floorsync/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Log filter directive, e.g. `debug` or `floorsync_server=trace`.
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    /// Fold CLI overrides into loaded settings.
    fn apply(&self, settings: &mut HubSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
    }
}

fn load_settings(cli: &Cli) -> Result<HubSettings> {
    let path = cli
        .settings
        .clone()
        .unwrap_or_else(floorsync_settings::settings_path);
    let mut settings = floorsync_settings::load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    cli.apply(&mut settings);
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let settings = load_settings(&args)?;

    if settings.logging.json {
        floorsync_core::logging::init_json_subscriber(&settings.logging.level);
    } else {
        floorsync_core::logging::init_subscriber(&settings.logging.level);
    }

    let metrics = floorsync_server::metrics::install_recorder();
    let config = HubConfig::from_settings(&settings.server);
    let server = HubServer::new(config, metrics);

    let (addr, handle) = server
        .listen()
        .await
        .context("Failed to bind server")?;
    server.shutdown().track(handle);
    tracing::info!(
        max_connections = server.config().max_connections,
        "floorsync hub ready on ws://{addr}/ws"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    server.shutdown().graceful_shutdown(None).await;
    tracing::info!("Shutdown complete");
    Ok(())
}

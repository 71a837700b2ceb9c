//! # mosaic-node
//!
//! Mosaic coordination server binary: loads settings, starts the relay,
//! and runs until ctrl-c.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use mosaic_server::{MosaicServer, ServerConfig};
use mosaic_settings::MosaicSettings;

/// Time allowed for background tasks to stop on shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Mosaic display-wall coordination server.
#[derive(Parser, Debug)]
#[command(name = "mosaic-node", about = "Mosaic display-wall coordination server")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (defaults to `~/.mosaic/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,
}

impl Cli {
    /// Apply command-line overrides on top of resolved settings.
    fn apply(&self, settings: &mut MosaicSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let settings_path = args
        .settings
        .clone()
        .unwrap_or_else(mosaic_settings::settings_path);
    let mut settings = mosaic_settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("Failed to load settings from {}", settings_path.display()))?;
    args.apply(&mut settings);

    mosaic_core::logging::init_subscriber(&settings.logging.level);

    let server = MosaicServer::new(ServerConfig::from_settings(&settings));
    let (addr, handle) = server.listen().await.context("Failed to bind server")?;

    tracing::info!(
        server_id = %server.server_id(),
        peers = settings.peers.initial.len(),
        "Mosaic listening on http://{addr}"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    server.peers().close_all();
    server.shutdown().graceful_shutdown(Some(SHUTDOWN_TIMEOUT)).await;
    let _ = handle.await;

    tracing::info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_leave_settings_alone() {
        let cli = Cli::parse_from(["mosaic-node"]);
        let mut settings = MosaicSettings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.server.host, MosaicSettings::default().server.host);
        assert_eq!(settings.server.port, MosaicSettings::default().server.port);
        assert!(cli.settings.is_none());
    }

    #[test]
    fn cli_overrides_host_and_port() {
        let cli = Cli::parse_from(["mosaic-node", "--host", "127.0.0.1", "--port", "0"]);
        let mut settings = MosaicSettings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 0);
    }

    #[test]
    fn cli_settings_path() {
        let cli = Cli::parse_from(["mosaic-node", "--settings", "/etc/mosaic.json"]);
        assert_eq!(cli.settings, Some(PathBuf::from("/etc/mosaic.json")));
    }

    #[test]
    fn cli_rejects_bad_port() {
        assert!(Cli::try_parse_from(["mosaic-node", "--port", "99999"]).is_err());
    }

    #[tokio::test]
    async fn server_graceful_shutdown() {
        let mut settings = MosaicSettings::default();
        settings.server.host = "127.0.0.1".into();
        settings.server.port = 0;
        let server = MosaicServer::new(ServerConfig::from_settings(&settings));
        let (_, handle) = server.listen().await.unwrap();

        server.shutdown().graceful_shutdown(Some(Duration::from_secs(2))).await;
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("shutdown timed out")
            .expect("join error");
    }
}

mod server;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use floorsync_core::{logging, Config, Coordinator};

use server::FloorSyncServer;

/// Realtime room coordinator for the FloorSync back office
#[derive(Debug, Parser)]
#[command(name = "floorsync", version, about)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(long, env = "FLOORSYNC_CONFIG")]
    config: Option<String>,

    /// Override the configured listen host
    #[arg(long)]
    host: Option<String>,

    /// Override the configured listen port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Load configuration
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    // 2. Validate configuration (fail fast on misconfigurations)
    config.validate()?;

    // 3. Initialize logging
    logging::init_logging(&config.logging)?;
    info!("FloorSync coordinator starting...");
    info!("HTTP address: {}", config.http_address());

    // 4. Build the coordinator and serve until shutdown
    let coordinator = Coordinator::new(config.coordinator.clone());
    FloorSyncServer::new(config, coordinator).start().await
}

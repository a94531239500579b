//! Lemonade gateway server
//!
//! Relays binary WebSocket frames for game clients under a global session cap.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use lemonade::config::GatewayConfig;
use lemonade::server::Gateway;

/// Lemonade gateway server
///
/// WebSocket relay with admission control
#[derive(Parser, Debug)]
#[command(name = "lemonade")]
#[command(version, about, long_about = None)]
struct Args {
    /// TOML config file; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, value_parser = clap::value_parser!(u16).range(1..))]
    port: Option<u16>,

    /// Bind address
    #[arg(long)]
    bind: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Max number of concurrent WebSocket connections
    #[arg(long)]
    max_ws_connections: Option<usize>,

    /// WebSocket read buffer size
    #[arg(long)]
    ws_read_buffer_size: Option<usize>,

    /// WebSocket write buffer size
    #[arg(long)]
    ws_write_buffer_size: Option<usize>,

    /// Frames buffered per session
    #[arg(long)]
    queue_capacity: Option<usize>,

    #[arg(long)]
    min_game_name_length: Option<usize>,

    #[arg(long)]
    max_game_name_length: Option<usize>,

    #[arg(long)]
    min_player_name_length: Option<usize>,

    #[arg(long)]
    max_player_name_length: Option<usize>,
}

impl Args {
    /// Build the configuration: file first, then flags on top
    fn into_config(self) -> anyhow::Result<GatewayConfig> {
        let mut config = match &self.config {
            Some(path) => GatewayConfig::load(path)?,
            None => GatewayConfig::default(),
        };

        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(bind) = self.bind {
            config.bind = bind;
        }
        if let Some(log_level) = self.log_level {
            config.log_level = log_level;
        }
        if let Some(max) = self.max_ws_connections {
            config.max_ws_connections = max;
        }
        if let Some(size) = self.ws_read_buffer_size {
            config.ws_read_buffer_size = size;
        }
        if let Some(size) = self.ws_write_buffer_size {
            config.ws_write_buffer_size = size;
        }
        if let Some(capacity) = self.queue_capacity {
            config.queue_capacity = capacity;
        }
        if let Some(len) = self.min_game_name_length {
            config.min_game_name_length = len;
        }
        if let Some(len) = self.max_game_name_length {
            config.max_game_name_length = len;
        }
        if let Some(len) = self.min_player_name_length {
            config.min_player_name_length = len;
        }
        if let Some(len) = self.max_player_name_length {
            config.max_player_name_length = len;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Args::parse().into_config()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    info!("Lemonade v{}", env!("CARGO_PKG_VERSION"));

    let gateway = Arc::new(Gateway::new(config)?);
    let gateway_handle = Arc::clone(&gateway);

    // Spawn shutdown signal handler
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Initiating graceful shutdown...");
        gateway_handle.shutdown();
    });

    gateway.run().await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }
}

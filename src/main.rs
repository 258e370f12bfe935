//! Comet bridge (v1)
//!
//! Serves the bundled echo pipeline over the comet bridge.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request       ┌──────────────────────────────────────────────┐
//!     ─────────────────────┼─▶ hyper ──▶ event handler ──▶ translator     │
//!                          │                   │                │         │
//!                          │                   ▼                ▼         │
//!                          │             ResponseWriter ◀── pipeline      │
//!     Client Response      │                   │   (writes at any time)   │
//!     ◀────────────────────┼── chunked body ◀──┘                          │
//!                          │                                              │
//!                          │   environment (resources, attributes, log)   │
//!                          └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use comet_bridge::config::{load_config, BridgeConfig};
use comet_bridge::observability::{logging, metrics};
use comet_bridge::pipeline::EchoPipeline;
use comet_bridge::CometServer;

#[derive(Parser)]
#[command(name = "comet-bridge")]
#[command(about = "Long-lived HTTP responses over a streaming pipeline", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => BridgeConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    logging::init_logging(&config.observability.log_level);
    tracing::info!("comet-bridge v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        require_content_type = config.translator.require_content_type,
        pipeline = %config.pipeline.name,
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

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let pipeline = EchoPipeline::new(config.limits.max_body_bytes);
    let server = CometServer::new(config, pipeline)?;
    server.run(listener).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

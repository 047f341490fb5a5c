//! Real-time video relay: camera frames in over a WebSocket, tracked and
//! annotated frames back out.

use std::path::PathBuf;

use clap::Parser;
use color_eyre::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vidrelay::vision::{IouTracker, NullDetector};
use vidrelay::Config;

#[derive(Debug, Parser)]
#[command(name = "vidrelay", version, about = "Real-time annotated video relay")]
struct Args {
    /// TOML config file (defaults to ./vidrelay.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override server.bind_address
    #[arg(long)]
    bind: Option<String>,

    /// Override server.port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vidrelay=info")),
        )
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    info!("vidrelay launching...");

    let args = Args::parse();
    let mut config = Config::load(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.server.bind_address = bind;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    info!("Configuration: {:?}", config);

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    vidrelay::run(
        config,
        Box::new(NullDetector),
        Box::new(IouTracker::default()),
        shutdown,
    )
    .await?;

    info!("vidrelay shutting down");
    Ok(())
}

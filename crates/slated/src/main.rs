//! Slate Daemon - tutoring API server
//!
//! Serves hints, evaluations and practice history to the whiteboard client.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use slated::{server, AppState, Config};

#[derive(Parser)]
#[command(name = "slated")]
#[command(about = "Slate tutoring API server", long_about = None)]
#[command(version = slate_shared::VERSION)]
struct Args {
    /// Path to the TOML config file
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Listen port (overrides config and $PORT)
    #[arg(long, short)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // .env is optional
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Slate Daemon v{} starting", slate_shared::VERSION);

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    config.validate()?;

    let state = AppState::from_config(config)?;
    server::run(state).await
}

mod config;
mod query;
mod server;
mod session;
mod telemetry;
mod transport;

use clap::Parser;
use config::{Config, DEFAULT_CONFIG_PATH};
use obridge_core::MemoryDriver;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Debug, Parser)]
#[command(name = "obridge", about = "Binary protocol gateway to Oracle databases")]
struct Args {
    /// Path to the TOML settings file.
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let found = Path::new(&args.config).exists();
    let config = Config::from_path(&args.config)?;

    let level = config.server.log_level.parse::<Level>().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;
    if !found {
        info!("no config found at {}, using defaults", args.config);
    }

    let driver = MemoryDriver::from_fixtures(config.upstream.fixtures.clone())?
        .accept_only(config.upstream.accept.clone());
    info!(
        fixtures = config.upstream.fixtures.len(),
        "using in-memory upstream driver"
    );

    let token = CancellationToken::new();
    let shutdown = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
        }
        shutdown.cancel();
    });

    server::run(config, Arc::new(driver), token).await
}

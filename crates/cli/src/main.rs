use anyhow::Result;
use clap::Parser;
use cli::watch;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uploader_core::config;

#[derive(Parser)]
#[command(name = "immich-folder-sync")]
#[command(about = "Uploads settled media from watched folders to an Immich server", long_about = None)]
struct Cli {
    /// Path to config JSON (created with defaults if missing)
    #[arg(short, long, default_value = config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = config::load_or_bootstrap(&cli.config)?;

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            return;
        }
        info!("shutdown requested");
        signal.cancel();
    });

    watch::watch_folders(cfg, shutdown).await
}

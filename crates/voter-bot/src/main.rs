//! Commit-reveal price voter - entry point.

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// Commit-reveal price voter client
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via VOTER_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize TLS crypto provider (must be before any WS connections)
    voter_feed::init_crypto();

    let args = Args::parse();

    voter_telemetry::init_logging()?;

    info!("Starting price voter v{}", env!("CARGO_PKG_VERSION"));

    // Config path: CLI arg > VOTER_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("VOTER_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    info!(config_path = %config_path, "Loading configuration");
    let config = voter_bot::AppConfig::from_file(&config_path)?;
    info!(assets = config.assets.len(), rpc_url = %config.chain.rpc_url, "Configuration loaded");

    let app = voter_bot::Application::new(config)?;
    app.run().await?;

    Ok(())
}

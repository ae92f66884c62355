//! CLI entry point booting the inpaint service core.

use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = inpaintd::config::CliArgs::parse();
    let config = inpaintd::config::ServiceConfig::load(cli).await?;

    if let Err(error) = inpaintd::run(config).await {
        tracing::error!(error = %error, "service bootstrap failed");
        return Err(error.into());
    }

    Ok(())
}

//! reviewd - review workflow service

use anyhow::Context;
use clap::Parser;
use review_service::{ServiceConfig, Server};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Review workflow service CLI
#[derive(Parser)]
#[command(name = "reviewd")]
#[command(about = "Review workflow service", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "REVIEW_CONFIG")]
    config: Option<String>,

    /// Listen address, overrides the configuration file
    #[arg(short, long, env = "REVIEW_LISTEN_ADDR")]
    listen: Option<String>,

    /// Bootstrap catalog, overrides the configuration file
    #[arg(long, env = "REVIEW_CATALOG")]
    catalog: Option<String>,

    /// Log level, overrides the configuration file
    #[arg(long, env = "REVIEW_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "REVIEW_LOG_JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config =
        ServiceConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| {
            cli.log_level
                .clone()
                .unwrap_or_else(|| config.logging.level.clone())
                .into()
        });

    if cli.json || config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    // Override with CLI args
    if let Some(listen) = cli.listen {
        config.server.listen_addr = listen
            .parse()
            .with_context(|| format!("Invalid listen address: {}", listen))?;
    }
    if let Some(catalog) = cli.catalog {
        config.catalog.path = Some(catalog);
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        listen = %config.server.listen_addr,
        catalog = config.catalog.path.as_deref().unwrap_or("-"),
        "Starting reviewd"
    );

    let server = Server::new(config).await?;
    server.run().await?;
    Ok(())
}

//! dualsignd - two-party contract signing daemon

use anyhow::Context;
use clap::Parser;
use dualsign_service::config::StorageConfig;
use dualsign_service::telemetry::init_tracing;
use dualsign_service::{Server, ServiceConfig};

/// dualsign daemon CLI
#[derive(Parser)]
#[command(name = "dualsignd")]
#[command(about = "dualsign - two-party contract signing service", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "DUALSIGN_CONFIG")]
    config: Option<String>,

    /// Listen address, overrides `server.listen_addr`
    #[arg(short, long, env = "DUALSIGN_LISTEN_ADDR")]
    listen: Option<String>,

    /// PostgreSQL URL; switches storage to postgres
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Log level
    #[arg(long, env = "DUALSIGN_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "DUALSIGN_LOG_JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config =
        ServiceConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    // Override with CLI args
    if let Some(listen) = cli.listen {
        config.server.listen_addr = listen
            .parse()
            .with_context(|| format!("invalid listen address: {listen}"))?;
    }
    if let Some(url) = cli.database_url {
        config.storage = match config.storage {
            StorageConfig::Postgres {
                max_connections,
                connect_timeout_secs,
                ..
            } => StorageConfig::Postgres {
                url,
                max_connections,
                connect_timeout_secs,
            },
            StorageConfig::Memory => StorageConfig::Postgres {
                url,
                max_connections: 10,
                connect_timeout_secs: 5,
            },
        };
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    config.logging.json |= cli.json;
    config.validate()?;

    init_tracing(&config.logging)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        listen = %config.server.listen_addr,
        storage = config.storage.label(),
        "starting dualsignd"
    );

    let server = Server::new(config).await?;
    server.run().await?;
    Ok(())
}

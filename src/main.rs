mod cli;
mod commands;
mod http;

use anyhow::Result;
use clap::Parser;
use tracing::warn;

// mimalloc avoids glibc malloc's poor behavior under the ingest pipeline's
// high-concurrency allocation churn.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use driftnet_core::config::AppConfig;

use crate::cli::{Cli, Commands};

fn main() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config_str = std::fs::read_to_string(&cli.config).unwrap_or_else(|_| {
        warn!(path = %cli.config, "config file not found, using bundled defaults");
        include_str!("../config/default.toml").to_string()
    });
    let mut config: AppConfig = toml::from_str(&config_str)?;

    if let Ok(v) = std::env::var("DATABASE_URL") {
        config.database.postgres_url = v;
    }
    if let Ok(v) = std::env::var("CLICK_HMAC_SECRET") {
        config.click.hmac_secret = Some(v);
    }
    if let Ok(v) = std::env::var("BUS_URL") {
        config.bus.url = v;
    }
    if let Ok(v) = std::env::var("REDIS_URL") {
        config.redis.url = v;
    }

    match cli.command {
        Commands::Serve { bind } => commands::run_serve(config, bind).await?,
        Commands::Frontier { action } => commands::run_frontier_action(config, action).await?,
        Commands::Outbox => commands::run_outbox(config).await?,
        Commands::Migrate => commands::run_migrate(config).await?,
    }

    Ok(())
}

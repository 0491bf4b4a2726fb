use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use driftnet_click::{Batcher, ClickBuffer, ClickSigner, IngestPipeline, RateLimiter};
use driftnet_core::config::AppConfig;
use driftnet_frontier::Frontier;
use driftnet_outbox::{NatsBus, Router};
use driftnet_scheduler as scheduler;
use driftnet_storage::Storage;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cli::FrontierAction;
use crate::http;

pub async fn run_serve(config: AppConfig, bind_override: Option<String>) -> Result<()> {
    let hmac_secret = config
        .click
        .hmac_secret
        .clone()
        .ok_or(driftnet_core::ErrMissingSecret)?;

    let storage = Arc::new(Storage::new(&config.database.postgres_url).await?);
    storage.run_migrations().await?;

    let signer = ClickSigner::new(hmac_secret, config.click.signature_length)?;
    let rate_limiter = Arc::new(RateLimiter::new(config.ratelimit.max_per_minute, config.ratelimit.window()));
    let buffer = Arc::new(ClickBuffer::new(config.click.buffer_size));
    let pipeline = Arc::new(IngestPipeline::new(
        signer,
        rate_limiter,
        buffer.clone(),
        config.click.max_timestamp_age(),
    ));

    let batcher = Batcher::new(
        storage.clone(),
        config.click.flush_threshold,
        config.click.flush_interval(),
        config.click.insert_batch_size,
        config.click.flush_timeout(),
    );

    let cancel = CancellationToken::new();
    let batcher_cancel = cancel.clone();
    let batcher_handle = tokio::spawn(batcher.run(buffer, batcher_cancel));

    let bind: SocketAddr = bind_override
        .or_else(|| std::env::var("BIND_ADDR").ok())
        .unwrap_or_else(|| "0.0.0.0:8080".to_string())
        .parse()?;

    let app = http::router(http::AppState { pipeline });
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(%bind, "click ingest server listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cancel.cancel();
    batcher_handle.await?;
    Ok(())
}

pub async fn run_outbox(config: AppConfig) -> Result<()> {
    let storage = Storage::new(&config.database.postgres_url).await?;
    storage.run_migrations().await?;
    let bus = Arc::new(NatsBus::connect(&config.bus.url).await?);
    let router = Router::new(storage.pool().clone(), bus, config.outbox);

    let cancel = CancellationToken::new();
    let run_cancel = cancel.clone();
    let handle = tokio::spawn(router.run(run_cancel));

    shutdown_signal().await;
    cancel.cancel();
    handle.await?;
    Ok(())
}

pub async fn run_frontier_action(config: AppConfig, action: FrontierAction) -> Result<()> {
    let storage = Storage::new(&config.database.postgres_url).await?;
    storage.run_migrations().await?;
    let frontier = Frontier::new(storage.pool().clone(), config.frontier);

    match action {
        FrontierAction::Submit { url, origin, priority } => {
            let origin = driftnet_core::Origin::parse(&origin)
                .ok_or_else(|| anyhow::anyhow!("unknown origin: {origin}"))?;
            let inserted = frontier.submit(&url, origin, priority).await?;
            println!("{}", if inserted { "submitted" } else { "already present" });
        }
        FrontierAction::Reset { id } => {
            frontier.reset(&id).await?;
            println!("reset {id}");
        }
        FrontierAction::RecoverStaleClaims => {
            let n = frontier.recover_stale_claims().await?;
            println!("recovered {n} stale claims");
        }
    }
    Ok(())
}

pub async fn run_migrate(config: AppConfig) -> Result<()> {
    let storage = Storage::new(&config.database.postgres_url).await?;
    storage.run_migrations().await?;

    // Touches the adaptive scheduler's Redis connection so `migrate` also
    // surfaces a misconfigured REDIS_URL before `outbox`/`serve` would.
    if !config.redis.url.is_empty() {
        let _ = scheduler::connect(&config.redis.url).await?;
    }
    println!("migrations applied");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}

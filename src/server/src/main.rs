use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use api::AppState;
use common::config::Config;
use pow::PowService;
use ratelimit::RateLimiter;
use sqlx::SqlitePool;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let config = Config::load()?;
    let pool = storage::init(&config.storage.path).await?;
    info!(path = %config.storage.path, "storage ready");
    info!(
        pow = config.pow.enabled,
        rate_limit = config.rate_limit.enabled,
        "admission controls"
    );

    let addr = config.server.addr.clone();
    let reaper_interval = config.server.reaper_interval_seconds;
    let state = AppState {
        pool: pool.clone(),
        pow: Arc::new(PowService::new(
            config.pow.enabled,
            config.pow.difficulty,
            config.pow.ttl_seconds,
        )),
        limiter: Arc::new(RateLimiter::new(
            config.rate_limit.enabled,
            config.rate_limit.capacity,
            config.rate_limit.refill_per_minute,
        )),
        config: Arc::new(config),
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reaper = tokio::spawn(reap_expired_pastes(pool, reaper_interval, shutdown_rx));

    api::serve(state, &addr, shutdown_signal()).await?;

    shutdown_tx.send(true).ok();
    reaper.await.ok();
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut term = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("installing SIGTERM handler failed");
        tokio::select! {
            _ = ctrl_c => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}

/// Periodic backstop for rows the read paths have not already reaped.
async fn reap_expired_pastes(
    pool: SqlitePool,
    interval_seconds: u64,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_seconds.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match storage::paste::reap_expired(&pool, common::timestamp_secs()).await {
                    Ok(0) => {}
                    Ok(count) => info!(count, "reaped expired pastes"),
                    Err(err) => error!("reaping expired pastes: {err:#}"),
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}

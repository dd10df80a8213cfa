mod config;
mod metrics;
mod runner;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cfg = config::load_config()?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    let telemetry = metrics::SchedulerTelemetry::new();

    tracing::info!("scheduler starting");
    tracing::info!(
        tick_interval = ?cfg.tick_interval,
        lease_ttl = ?cfg.lease_ttl,
        batch_size = cfg.batch_size,
        global_concurrency = cfg.global_concurrency,
        per_account_concurrency = cfg.per_account_concurrency,
        "config loaded"
    );

    let shutdown = CancellationToken::new();

    let mut join_set: tokio::task::JoinSet<Result<()>> = tokio::task::JoinSet::new();
    {
        let shutdown = shutdown.clone();
        let telemetry = telemetry.clone();
        join_set.spawn(async move {
            let scheduler = runner::Scheduler::new(cfg, telemetry).await?;
            scheduler.run(shutdown).await
        });
    }

    tracing::info!("scheduler started");

    let mut fatal: Option<anyhow::Error> = None;
    tokio::select! {
        res = shutdown_signal() => {
            res?;
            tracing::info!("shutdown requested");
        },
        res = join_set.join_next() => {
            if let Some(res) = res {
                let res = res.context("scheduler task panicked")?;
                match res {
                    Ok(()) => fatal = Some(anyhow::anyhow!("scheduler task exited unexpectedly")),
                    Err(e) => fatal = Some(e.context("scheduler task failed")),
                }
            }
        }
    }

    shutdown.cancel();

    while let Some(res) = join_set.join_next().await {
        let res = res.context("scheduler task panicked")?;
        if let Err(e) = res {
            fatal.get_or_insert_with(|| e.context("scheduler task failed"));
        }
    }

    fatal.map_or(Ok(()), Err)
}

async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate()).context("install SIGTERM handler")?;
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = sigterm.recv() => {},
        }
        Ok(())
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.context("ctrl-c")?;
        Ok(())
    }
}

mod account_gate;
mod context;
mod fsm_driver;
mod governor_cache;
mod watchdog;

use crate::config::AppConfig;
use crate::metrics::SchedulerTelemetry;
use account_gate::AccountGate;
use anyhow::{Context as _, Result};
use context::WorkerCtx;
use domain::clock::{Clock, SystemClock};
use governor_cache::GovernorCache;
use platform::PlatformClient;
use std::sync::Arc;
use std::time::Instant;
use store::Store;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Owns the store/client/telemetry handles, a `run(shutdown)` loop ticking
/// on an interval, and a `tick` that leases work and fans it out over a
/// `JoinSet`. Also runs the lease watchdog on the same interval, and gates
/// per-post workers through `AccountGate`.
pub struct Scheduler {
    cfg: AppConfig,
    store: Store,
    platform: Arc<dyn PlatformClient>,
    governor: Arc<GovernorCache>,
    account_gate: Arc<AccountGate>,
    telemetry: SchedulerTelemetry,
    clock: Arc<dyn Clock>,
}

impl Scheduler {
    pub async fn new(cfg: AppConfig, telemetry: SchedulerTelemetry) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(cfg.db_max_connections)
            .connect(&cfg.database_url)
            .await
            .context("connect to scheduler database")?;
        let store = Store::new(pool);
        store.migrate().await.context("run scheduler migrations")?;

        let platform: Arc<dyn PlatformClient> = Arc::new(
            platform::HttpPlatformClient::new(cfg.platform_base_url.clone(), cfg.platform_timeout)
                .context("build platform client")?,
        );

        Ok(Self {
            account_gate: Arc::new(AccountGate::new(cfg.per_account_concurrency)),
            governor: Arc::new(GovernorCache::new()),
            clock: Arc::new(SystemClock),
            cfg,
            store,
            platform,
            telemetry,
        })
    }

    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let mut interval = tokio::time::interval(self.cfg.tick_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("shutdown");
                    return Ok(());
                }
                _ = interval.tick() => {}
            }

            let started = Instant::now();
            match self.tick().await {
                Ok(leased) => {
                    self.telemetry.tick_ok(started.elapsed().as_millis() as u64);
                    if leased > 0 {
                        tracing::debug!(leased, "tick leased posts");
                    }
                }
                Err(err) => {
                    self.telemetry.tick_err(started.elapsed().as_millis() as u64);
                    tracing::warn!(err = %err, "tick failed");
                }
            }

            if let Err(err) = watchdog::sweep(&self.store, &self.telemetry).await {
                tracing::warn!(err = %err, "watchdog sweep failed");
            }
        }
    }

    /// One tick: lease due posts (§4.6's CTE + `SKIP LOCKED`), then drive
    /// each through the publish FSM on a bounded `JoinSet`, gated per-account
    /// by `AccountGate` so quota consumption and publish order stay
    /// serialized within an account while different accounts proceed
    /// concurrently.
    async fn tick(&self) -> Result<usize> {
        let posts = self
            .store
            .lease_due_posts(
                &self.cfg.instance_id,
                self.cfg.lease_grace,
                self.cfg.lease_ttl,
                self.cfg.batch_size,
            )
            .await
            .context("lease due posts")?;

        if posts.is_empty() {
            return Ok(0);
        }
        let leased_count = posts.len();
        self.telemetry.posts_leased(leased_count as u64);

        let global_sem = Arc::new(tokio::sync::Semaphore::new(self.cfg.global_concurrency));
        let mut set: JoinSet<()> = JoinSet::new();

        for post in posts {
            let ctx = WorkerCtx {
                cfg: self.cfg.clone(),
                store: self.store.clone(),
                platform: self.platform.clone(),
                governor: self.governor.clone(),
                account_gate: self.account_gate.clone(),
                telemetry: self.telemetry.clone(),
                instance_id: self.cfg.instance_id.clone(),
                clock: self.clock.clone(),
            };
            let global_sem = global_sem.clone();
            set.spawn(async move {
                let _global_permit = match global_sem.acquire_owned().await {
                    Ok(p) => p,
                    Err(_) => return,
                };
                let _account_permit = ctx.account_gate.acquire(post.account_id).await;
                let post_id = post.id;
                if let Err(err) = fsm_driver::drive_post(&ctx, post).await {
                    tracing::warn!(post_id = %post_id, err = %err, "post publish task failed");
                }
            });
        }

        while let Some(res) = set.join_next().await {
            if let Err(err) = res {
                tracing::warn!(err = %err, "publish task panicked");
            }
        }

        Ok(leased_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use domain::clock::FixedClock;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    fn test_config() -> AppConfig {
        AppConfig {
            database_url: String::new(),
            db_max_connections: 1,
            tick_interval: Duration::from_secs(5),
            lease_grace: Duration::from_secs(0),
            lease_ttl: Duration::from_secs(300),
            batch_size: 1,
            global_concurrency: 1,
            per_account_concurrency: 1,
            platform_base_url: "http://127.0.0.1:0".into(),
            platform_timeout: Duration::from_secs(1),
            max_retries: 0,
            instance_id: "scheduler-test".into(),
        }
    }

    /// `Scheduler::new` always wires `SystemClock`; this constructs one
    /// directly with an injected `FixedClock` the way a test seam should, to
    /// prove the field actually carries an injected clock through rather
    /// than defaulting. Uses `connect_lazy` so no real database is touched.
    fn scheduler_with_clock(clock: Arc<dyn Clock>) -> Scheduler {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://unused/unused")
            .expect("lazy pool construction never connects eagerly");
        Scheduler {
            cfg: test_config(),
            store: Store::new(pool),
            platform: Arc::new(platform::MockPlatformClient::new(1)),
            governor: Arc::new(GovernorCache::new()),
            account_gate: Arc::new(AccountGate::new(1)),
            telemetry: SchedulerTelemetry::new(),
            clock,
        }
    }

    #[test]
    fn injected_clock_is_used_instead_of_system_time() {
        let fixed = Utc.with_ymd_and_hms(2031, 6, 1, 12, 0, 0).unwrap();
        let fixed_clock = Arc::new(FixedClock::new(fixed));
        let scheduler = scheduler_with_clock(fixed_clock.clone());
        assert_eq!(scheduler.clock.now(), fixed);

        fixed_clock.advance(chrono::Duration::hours(1));
        assert_eq!(
            scheduler.clock.now(),
            fixed + chrono::Duration::hours(1),
            "scheduler should observe the same injected clock, not a SystemClock default"
        );
    }
}

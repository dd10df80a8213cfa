use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

/// Tick cadence, lease TTL and batch size, plus the worker pool's
/// concurrency caps. A flat `envy::from_env` struct with `#[serde(default)]`
/// and secs-suffixed raw fields converted to `Duration` at load time.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub db_max_connections: u32,

    pub tick_interval: Duration,
    pub lease_grace: Duration,
    pub lease_ttl: Duration,
    pub batch_size: i64,

    pub global_concurrency: usize,
    pub per_account_concurrency: usize,

    pub platform_base_url: String,
    pub platform_timeout: Duration,

    pub max_retries: i32,

    pub instance_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct Env {
    database_url: String,
    db_max_connections: u32,

    scheduler_tick_interval_secs: u64,
    scheduler_lease_grace_secs: u64,
    scheduler_lease_ttl_secs: u64,
    scheduler_batch_size: i64,

    scheduler_global_concurrency: usize,
    scheduler_per_account_concurrency: usize,

    platform_base_url: String,
    platform_timeout_secs: u64,

    scheduler_max_retries: i32,

    instance_id: Option<String>,
}

impl Default for Env {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            db_max_connections: DEFAULT_DB_MAX_CONNECTIONS,
            scheduler_tick_interval_secs: DEFAULT_TICK_INTERVAL_SECS,
            scheduler_lease_grace_secs: DEFAULT_LEASE_GRACE_SECS,
            scheduler_lease_ttl_secs: DEFAULT_LEASE_TTL_SECS,
            scheduler_batch_size: DEFAULT_BATCH_SIZE,
            scheduler_global_concurrency: DEFAULT_GLOBAL_CONCURRENCY,
            scheduler_per_account_concurrency: DEFAULT_PER_ACCOUNT_CONCURRENCY,
            platform_base_url: String::new(),
            platform_timeout_secs: DEFAULT_PLATFORM_TIMEOUT_SECS,
            scheduler_max_retries: DEFAULT_MAX_RETRIES,
            instance_id: None,
        }
    }
}

pub fn load_config() -> Result<AppConfig> {
    let env: Env = envy::from_env().context("load scheduler env config")?;
    if env.database_url.trim().is_empty() {
        anyhow::bail!("DATABASE_URL must be set");
    }
    if env.platform_base_url.trim().is_empty() {
        anyhow::bail!("PLATFORM_BASE_URL must be set");
    }

    Ok(AppConfig {
        database_url: env.database_url,
        db_max_connections: env.db_max_connections.max(1),
        tick_interval: Duration::from_secs(env.scheduler_tick_interval_secs.max(1)),
        lease_grace: Duration::from_secs(env.scheduler_lease_grace_secs),
        lease_ttl: Duration::from_secs(env.scheduler_lease_ttl_secs.max(1)),
        batch_size: env.scheduler_batch_size.max(1),
        global_concurrency: env.scheduler_global_concurrency.max(1),
        per_account_concurrency: env.scheduler_per_account_concurrency.max(1),
        platform_base_url: env.platform_base_url,
        platform_timeout: Duration::from_secs(env.platform_timeout_secs.max(1)),
        max_retries: env.scheduler_max_retries.max(0),
        instance_id: env
            .instance_id
            .unwrap_or_else(|| format!("scheduler-{}", std::process::id())),
    })
}

const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_TICK_INTERVAL_SECS: u64 = 5;
const DEFAULT_LEASE_GRACE_SECS: u64 = 0;
const DEFAULT_LEASE_TTL_SECS: u64 = 300;
const DEFAULT_BATCH_SIZE: i64 = 50;
const DEFAULT_GLOBAL_CONCURRENCY: usize = 16;
const DEFAULT_PER_ACCOUNT_CONCURRENCY: usize = 1;
const DEFAULT_PLATFORM_TIMEOUT_SECS: u64 = 20;
const DEFAULT_MAX_RETRIES: i32 = 5;

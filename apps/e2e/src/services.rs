use crate::process::null_stdio;
use crate::util::repo_root;
use anyhow::{Context, Result};
use std::process::{Child, Command, Stdio};

pub fn spawn_scheduler(
    db_url: &str,
    platform_base_url: &str,
    instance_id: &str,
    extra_env: &[(&str, &str)],
) -> Result<Child> {
    let root = repo_root();
    let mut cmd = Command::new(root.join("target/debug/scheduler"));
    cmd.current_dir(&root)
        .env("DATABASE_URL", db_url)
        .env("DB_MAX_CONNECTIONS", "5")
        .env("PLATFORM_BASE_URL", platform_base_url)
        .env("SCHEDULER_TICK_INTERVAL_SECS", "1")
        .env("SCHEDULER_LEASE_GRACE_SECS", "0")
        .env("SCHEDULER_LEASE_TTL_SECS", "10")
        .env("SCHEDULER_BATCH_SIZE", "50")
        .env("SCHEDULER_GLOBAL_CONCURRENCY", "4")
        .env("SCHEDULER_PER_ACCOUNT_CONCURRENCY", "1")
        .env("PLATFORM_TIMEOUT_SECS", "5")
        .env("SCHEDULER_MAX_RETRIES", "3")
        .env("INSTANCE_ID", instance_id)
        .env("RUST_LOG", "info")
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());
    for (k, v) in extra_env {
        cmd.env(k, v);
    }
    null_stdio(&mut cmd);
    cmd.spawn().context("spawn scheduler")
}

pub fn spawn_api(db_url: &str, bind_addr: &str) -> Result<Child> {
    let root = repo_root();
    let mut cmd = Command::new(root.join("target/debug/api"));
    cmd.current_dir(&root)
        .env("DATABASE_URL", db_url)
        .env("DB_MAX_CONNECTIONS", "5")
        .env("API_BIND_ADDR", bind_addr)
        .env("RUST_LOG", "info")
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());
    null_stdio(&mut cmd);
    cmd.spawn().context("spawn api")
}

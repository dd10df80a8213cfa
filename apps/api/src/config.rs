use anyhow::{Context, Result};
use serde::Deserialize;

/// Flat `envy::from_env` struct with `#[serde(default)]`, validated/parsed
/// into a typed `AppConfig` at load time.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub bind_addr: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct Env {
    database_url: String,
    db_max_connections: u32,
    api_bind_addr: String,
}

impl Default for Env {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            db_max_connections: DEFAULT_DB_MAX_CONNECTIONS,
            api_bind_addr: DEFAULT_BIND_ADDR.to_string(),
        }
    }
}

pub fn load_config() -> Result<AppConfig> {
    let env: Env = envy::from_env().context("load api env config")?;
    if env.database_url.trim().is_empty() {
        anyhow::bail!("DATABASE_URL must be set");
    }

    Ok(AppConfig {
        database_url: env.database_url,
        db_max_connections: env.db_max_connections.max(1),
        bind_addr: env.api_bind_addr,
    })
}

const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

use anyhow::{Context, Result};
use sqlx::{Connection, PgConnection};
use std::time::{Duration, Instant};

pub async fn wait_for_postgres(db_url: &str, timeout: Duration) -> Result<()> {
    let start = Instant::now();
    loop {
        match PgConnection::connect(db_url).await {
            Ok(mut c) => {
                sqlx::query("select 1").execute(&mut c).await?;
                return Ok(());
            }
            Err(e) => {
                if start.elapsed() > timeout {
                    return Err(e).context("postgres not ready before timeout");
                }
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
        }
    }
}

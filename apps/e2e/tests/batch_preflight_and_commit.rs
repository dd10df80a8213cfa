use anyhow::Result;
use e2e::binaries::cargo_build_api_bin;
use e2e::docker::{start_postgres, PostgresOptions};
use e2e::http::{http_get_json, http_post_json, wait_for_http_ok};
use e2e::postgres::wait_for_postgres;
use e2e::process::KillOnDrop;
use e2e::services::spawn_api;
use e2e::util::{find_free_port, require_bins};
use serde_json::{json, Value};
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;
use store::Store;

/// Seed scenario 6 / spec §8's "preflight/commit fidelity" property, run
/// against the real `/api/posts/batch_preflight` and `/api/posts/batch/commit`
/// handlers (not just the pure `domain::planner::plan` unit tests): the same
/// week/media-pool parameters `domain::planner`'s own tests use, so preflight
/// is known to return 16 slots, and `commit` fed the same seed must insert
/// exactly that many rows.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn commit_creates_exactly_what_preflight_previewed() -> Result<()> {
    if !require_bins(&["docker"]) {
        return Ok(());
    }

    let pg = start_postgres(PostgresOptions {
        container_name: Some(format!("scheduler-e2e-pg-{}", find_free_port()?)),
        ..Default::default()
    })
    .await?;
    wait_for_postgres(&pg.db_url, Duration::from_secs(30)).await?;

    cargo_build_api_bin()?;
    let port = find_free_port()?;
    let bind_addr = format!("127.0.0.1:{port}");
    let _api = KillOnDrop::new(spawn_api(&pg.db_url, &bind_addr)?);
    let base = format!("http://{bind_addr}");
    wait_for_http_ok(&format!("{base}/health"), Duration::from_secs(15)).await?;

    let pool = PgPoolOptions::new().max_connections(5).connect(&pg.db_url).await?;
    let store = Store::new(pool);
    let account = store
        .upsert_account("pu-batch", "handle-batch", "tok-batch", chrono_tz::America::New_York)
        .await?;

    let media_pool: Vec<Value> = (0..18)
        .map(|i| json!({ "type": "image", "url": format!("https://cdn.example.com/batch/{i}.jpg") }))
        .collect();

    let request_body = json!({
        "account_id": account.id,
        "start_date": "2025-06-02",
        "end_date": "2025-06-08",
        "weekly_plan": [3, 3, 3, 3, 3, 1, 0],
        "random_start": "09:00",
        "random_end": "21:00",
        "media_pool": media_pool,
        "video_mode": "reel_feed",
        "seed": 7,
    });

    let (status, preflight) = http_post_json(&format!("{base}/api/posts/batch_preflight"), &request_body).await?;
    assert!(status.is_success(), "preflight failed: {status} {preflight}");
    let slots = preflight["slots"].as_array().expect("slots array");
    assert_eq!(slots.len(), 16, "scenario 6 expects 16 previewed slots: {preflight}");
    assert_eq!(preflight["insufficient"], json!(false));

    let (status, commit) = http_post_json(&format!("{base}/api/posts/batch/commit"), &request_body).await?;
    assert!(status.is_success(), "commit failed: {status} {commit}");
    assert_eq!(
        commit["created"].as_u64(),
        Some(slots.len() as u64),
        "commit must create exactly len(preflight.slots) posts: {commit}"
    );

    let query_url = format!(
        "{base}/api/posts/query?account_id={}&start=2025-06-01T00:00:00Z&end=2025-06-09T00:00:00Z",
        account.id
    );
    let queried = http_get_json(&query_url).await?;
    let items = queried["items"].as_array().expect("items array");
    assert_eq!(items.len(), 16, "exactly 16 rows must have been inserted: {items:?}");

    Ok(())
}

use anyhow::Result;
use e2e::binaries::cargo_build_api_bin;
use e2e::docker::{start_postgres, PostgresOptions};
use e2e::http::{http_get_json, http_post_json, wait_for_http_ok};
use e2e::postgres::wait_for_postgres;
use e2e::process::KillOnDrop;
use e2e::services::spawn_api;
use e2e::util::{find_free_port, require_bins};
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;
use store::Store;

/// Spec §4.3/§6: a second post within the minimum spacing window on the
/// same account/day is rejected with a spacing conflict, and a retried
/// create carrying the same `client_request_id` returns the original post
/// instead of inserting a duplicate.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn spacing_conflict_and_idempotent_replay() -> Result<()> {
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

    // Account onboarding/credential rotation is out of scope for this HTTP
    // surface (§1, §6's `/accounts/refresh` only re-reads the current list
    // per DESIGN.md's resolution of that open question), so the account row
    // is seeded directly through the store, the same seam an out-of-scope
    // onboarding process would use.
    let pool = PgPoolOptions::new().max_connections(5).connect(&pg.db_url).await?;
    let store = Store::new(pool);
    let account = store.upsert_account("pu-2", "handle-2", "tok-2", chrono_tz::UTC).await?;
    let account_id = account.id;

    let scheduled_at = "2030-01-15T10:00:00Z";
    let (status, body) = http_post_json(
        &format!("{base}/api/posts"),
        &json!({
            "account_id": account_id,
            "post_type": "photo",
            "media_url": "https://cdn.example.com/first.jpg",
            "caption": "first",
            "scheduled_at": scheduled_at,
            "client_request_id": "req-1",
        }),
    )
    .await?;
    assert!(status.is_success(), "first create failed: {status} {body}");
    let first_id = body["id"].as_i64().expect("post id");

    let (status, body) = http_post_json(
        &format!("{base}/api/posts"),
        &json!({
            "account_id": account_id,
            "post_type": "photo",
            "media_url": "https://cdn.example.com/second.jpg",
            "scheduled_at": "2030-01-15T10:05:00Z",
        }),
    )
    .await?;
    assert_eq!(status.as_u16(), 409, "expected spacing conflict, got {status} {body}");
    assert!(body.get("neighbors").is_some(), "409 body should list offending neighbors: {body}");

    let (status, body) = http_post_json(
        &format!("{base}/api/posts"),
        &json!({
            "account_id": account_id,
            "post_type": "photo",
            "media_url": "https://cdn.example.com/first.jpg",
            "caption": "first",
            "scheduled_at": scheduled_at,
            "client_request_id": "req-1",
        }),
    )
    .await?;
    assert!(status.is_success(), "idempotent replay should succeed: {status} {body}");
    assert_eq!(body["id"].as_i64(), Some(first_id), "replay should return the original post id");

    let query_url = format!(
        "{base}/api/posts/query?account_id={account_id}&start=2030-01-01T00:00:00Z&end=2030-02-01T00:00:00Z"
    );
    let queried = http_get_json(&query_url).await?;
    let items = queried["items"].as_array().expect("items array");
    assert_eq!(items.len(), 1, "idempotent replay must not have inserted a second row: {items:?}");
    assert_eq!(items[0]["id"].as_i64(), Some(first_id));

    Ok(())
}

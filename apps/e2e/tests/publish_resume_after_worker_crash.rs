use anyhow::Result;
use chrono::Utc;
use domain::model::{MediaRef, PostStatus, PostType};
use e2e::binaries::cargo_build_scheduler_bin;
use e2e::docker::{start_postgres, PostgresOptions};
use e2e::fake_platform::FakePlatform;
use e2e::postgres::wait_for_postgres;
use e2e::process::KillOnDrop;
use e2e::services::spawn_scheduler;
use e2e::util::{find_free_port, require_bins};
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;
use store::{NewPost, Store};

/// Spec §8's most emphasized testable property: "at-most-once publish...
/// a crash between CreateContainer and Publish resumes from polling the
/// stored container_id" (seed scenario 5). A worker is killed the instant
/// it has persisted `container_id` and moved the post to `publishing`; once
/// its lease expires a second worker picks the post back up and must resume
/// at the poll step rather than creating a second container.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn crashed_worker_resumes_at_poll_without_recreating_container() -> Result<()> {
    if !require_bins(&["docker"]) {
        return Ok(());
    }

    let pg = start_postgres(PostgresOptions {
        container_name: Some(format!("scheduler-e2e-pg-{}", find_free_port()?)),
        ..Default::default()
    })
    .await?;
    wait_for_postgres(&pg.db_url, Duration::from_secs(30)).await?;

    let pool = PgPoolOptions::new().max_connections(5).connect(&pg.db_url).await?;
    let store = Store::new(pool);
    store.migrate().await?;

    let account = store
        .upsert_account("pu-crash", "handle-crash", "tok-crash", chrono_tz::UTC)
        .await?;

    let outcome = store
        .create_post(
            NewPost {
                account_id: account.id,
                platform: "instagram".to_string(),
                post_type: PostType::Photo,
                media: MediaRef::Single {
                    url: "https://cdn.example.com/crash.jpg".to_string(),
                },
                caption: Some("resume me".to_string()),
                scheduled_at: Utc::now(),
                client_request_id: None,
                override_spacing: false,
            },
            chrono_tz::UTC,
        )
        .await?;
    let post_id = outcome.post.id;

    // Enough polls that the first worker can't possibly reach `Posted`
    // before it's killed, but few enough the second worker finishes fast.
    let fake_platform = FakePlatform::start(3, 25).await?;

    cargo_build_scheduler_bin()?;

    let mut first = KillOnDrop::new(spawn_scheduler(
        &pg.db_url,
        &fake_platform.base_url,
        "e2e-scheduler-crash-1",
        &[("SCHEDULER_LEASE_TTL_SECS", "3")],
    )?);

    // Wait until the first worker has created the container and persisted
    // it onto the post (the exact crash point scenario 5 names), then kill
    // it before it can poll its way to a finished publish.
    let crash_point_deadline = std::time::Instant::now() + Duration::from_secs(20);
    loop {
        let post = store.get_post(post_id).await?;
        if post.status == PostStatus::Publishing && post.publish_result.get("container_id").is_some() {
            break;
        }
        assert_ne!(post.status, PostStatus::Failed, "post unexpectedly failed before crash point: {post:?}");
        if std::time::Instant::now() > crash_point_deadline {
            panic!("post never reached publishing with a persisted container_id: {post:?}");
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    first.kill_now();

    assert_eq!(fake_platform.create_call_count(), 1, "container must be created exactly once");
    assert_eq!(fake_platform.publish_call_count(), 0, "publish must not have happened before the crash");

    let post_at_crash = store.get_post(post_id).await?;
    let container_id = post_at_crash.publish_result["container_id"]
        .as_str()
        .expect("container_id persisted")
        .to_string();

    // Let the dead worker's lease expire so the watchdog in the second
    // instance reclaims it.
    tokio::time::sleep(Duration::from_secs(4)).await;

    let _second = KillOnDrop::new(spawn_scheduler(
        &pg.db_url,
        &fake_platform.base_url,
        "e2e-scheduler-crash-2",
        &[],
    )?);

    let deadline = std::time::Instant::now() + Duration::from_secs(30);
    loop {
        let post = store.get_post(post_id).await?;
        if post.status == PostStatus::Posted {
            assert_eq!(
                post.publish_result["container_id"].as_str(),
                Some(container_id.as_str()),
                "resumed post must keep the original container_id, not a new one"
            );
            assert!(post.publish_result.get("platform_media_id").is_some());
            break;
        }
        assert_ne!(post.status, PostStatus::Failed, "post unexpectedly failed: {post:?}");
        if std::time::Instant::now() > deadline {
            panic!("post did not resume to Posted within timeout, last status: {:?}", post.status);
        }
        tokio::time::sleep(Duration::from_millis(300)).await;
    }

    assert_eq!(
        fake_platform.create_call_count(),
        1,
        "resumed publish must not have created a second container"
    );
    assert_eq!(fake_platform.publish_call_count(), 1, "resumed publish must publish exactly once");

    Ok(())
}

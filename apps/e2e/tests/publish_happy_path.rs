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

/// Spec §8: a freshly scheduled post, once its `scheduled_at` passes, is
/// leased, published against the platform, and lands in `Posted` carrying
/// the platform's container/media ids.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn scheduled_post_is_leased_and_published() -> Result<()> {
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
        .upsert_account("pu-1", "handle-1", "tok-1", chrono_tz::UTC)
        .await?;

    let outcome = store
        .create_post(
            NewPost {
                account_id: account.id,
                platform: "instagram".to_string(),
                post_type: PostType::Photo,
                media: MediaRef::Single {
                    url: "https://cdn.example.com/a.jpg".to_string(),
                },
                caption: Some("hello".to_string()),
                scheduled_at: Utc::now(),
                client_request_id: None,
                override_spacing: false,
            },
            chrono_tz::UTC,
        )
        .await?;
    let post_id = outcome.post.id;

    let fake_platform = FakePlatform::start(2, 25).await?;

    cargo_build_scheduler_bin()?;
    let _scheduler = KillOnDrop::new(spawn_scheduler(
        &pg.db_url,
        &fake_platform.base_url,
        "e2e-scheduler-1",
        &[],
    )?);

    let deadline = std::time::Instant::now() + Duration::from_secs(30);
    loop {
        let post = store.get_post(post_id).await?;
        if post.status == PostStatus::Posted {
            assert!(post.publish_result.get("platform_media_id").is_some());
            break;
        }
        assert_ne!(post.status, PostStatus::Failed, "post unexpectedly failed: {post:?}");
        if std::time::Instant::now() > deadline {
            panic!("post did not reach Posted within timeout, last status: {:?}", post.status);
        }
        tokio::time::sleep(Duration::from_millis(300)).await;
    }

    Ok(())
}

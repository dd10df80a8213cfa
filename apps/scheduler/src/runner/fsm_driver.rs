use super::context::WorkerCtx;
use domain::governor::{reserve_remote, RemoteDecision};
use domain::model::{MediaRef, Post, PostStatus};
use domain::retry::{jittered_retry_delay, poll_backoff, MAX_POLL_WAIT};
use domain::{CoreError, CoreResult};
use platform::ContainerStatus;
use store::StatusPatch;

/// Drives one leased post through the publish FSM: governor check,
/// create-container (resuming from a persisted `container_id` if a previous
/// worker crashed after creating it), poll with backoff, publish. Every
/// transition is a compare-and-set against the store; a `Conflict` there
/// means the post was cancelled (or re-leased) concurrently, and the worker
/// simply stops rather than treating it as a failure.
pub async fn drive_post(ctx: &WorkerCtx, post: Post) -> anyhow::Result<()> {
    let account = ctx.store.get_account(post.account_id).await?;

    if !account.active {
        account_frozen(ctx, &post).await?;
        return Ok(());
    }

    let limit = ctx.governor.get_or_refresh(ctx.platform.as_ref(), &account).await?;
    let now = ctx.clock.now();
    let (decision, retry_after) = reserve_remote(&limit, now);
    if decision == RemoteDecision::ExceedsRemoteQuota {
        ctx.telemetry.rate_limited();
        // Refresh so a long-idle cached limit doesn't repeatedly defer posts
        // past the real reset time.
        let _ = ctx.governor.refresh(ctx.platform.as_ref(), &account).await;
        reschedule_for_quota(ctx, &post, retry_after.unwrap_or(std::time::Duration::from_secs(30))).await?;
        return Ok(());
    }

    let started = ctx.clock.monotonic_now();

    let container_id = match post.publish_result.get("container_id").and_then(|v| v.as_str()) {
        Some(id) => {
            let id = id.to_string();
            // A previous worker persisted `container_id` then crashed before
            // reaching `publishing`. The CAS leaves `publish_result`
            // untouched (it already holds the container id) and only moves
            // the status forward, so a successor resumes at the poll step
            // below instead of re-creating the container.
            match ctx
                .store
                .update_status_from(post.id, &[PostStatus::Leased], PostStatus::Publishing, StatusPatch::default())
                .await
            {
                Ok(()) => id,
                Err(CoreError::Conflict(_)) => {
                    ctx.telemetry.post_cancelled();
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }
        }
        None => match create_container(ctx, &account, &post).await {
            Ok(id) => {
                let patch = StatusPatch {
                    publish_result: Some(serde_json::json!({ "container_id": id })),
                    ..Default::default()
                };
                match ctx
                    .store
                    .update_status_from(post.id, &[PostStatus::Leased], PostStatus::Publishing, patch)
                    .await
                {
                    Ok(()) => id,
                    Err(CoreError::Conflict(_)) => {
                        ctx.telemetry.post_cancelled();
                        return Ok(());
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            Err(e) => return handle_failure(ctx, &post, e).await,
        },
    };

    if is_cancelled(ctx, post.id).await? {
        ctx.telemetry.post_cancelled();
        return Ok(());
    }

    let deadline = ctx.clock.monotonic_now() + MAX_POLL_WAIT;
    let mut attempt = 0u32;
    loop {
        match ctx.platform.container_status(&account, &container_id).await {
            Ok(ContainerStatus::Finished) => break,
            Ok(ContainerStatus::InProgress) => {
                if ctx.clock.monotonic_now() >= deadline {
                    return handle_failure(
                        ctx,
                        &post,
                        CoreError::Transient("container poll exceeded max wait".into()),
                    )
                    .await;
                }
                if is_cancelled(ctx, post.id).await? {
                    ctx.telemetry.post_cancelled();
                    return Ok(());
                }
                tokio::time::sleep(poll_backoff(attempt)).await;
                attempt += 1;
            }
            Ok(ContainerStatus::Error) | Ok(ContainerStatus::Expired) => {
                return handle_failure(
                    ctx,
                    &post,
                    CoreError::Terminal {
                        code: "container_error".into(),
                        message: "container entered ERROR or EXPIRED state".into(),
                    },
                )
                .await;
            }
            Err(e) => return handle_failure(ctx, &post, e).await,
        }
    }

    // A cancel observed right up to this point is honored; once `Publish` is
    // called the operation is no longer cancellable.
    if is_cancelled(ctx, post.id).await? {
        ctx.telemetry.post_cancelled();
        return Ok(());
    }

    match ctx.platform.publish(&account, &container_id).await {
        Ok(platform_media_id) => {
            let patch = StatusPatch {
                publish_result: Some(serde_json::json!({
                    "container_id": container_id,
                    "platform_media_id": platform_media_id,
                })),
                clear_lock: true,
                ..Default::default()
            };
            match ctx
                .store
                .update_status_from(post.id, &[PostStatus::Publishing], PostStatus::Posted, patch)
                .await
            {
                Ok(()) => {
                    let elapsed = ctx.clock.monotonic_now().saturating_duration_since(started);
                    ctx.telemetry.post_posted(elapsed.as_millis() as u64);
                    Ok(())
                }
                Err(CoreError::Conflict(_)) => {
                    ctx.telemetry.post_cancelled();
                    Ok(())
                }
                Err(e) => Err(e.into()),
            }
        }
        Err(e) => handle_failure(ctx, &post, e).await,
    }
}

async fn create_container(ctx: &WorkerCtx, account: &domain::model::Account, post: &Post) -> CoreResult<String> {
    match &post.media {
        MediaRef::Single { url } => {
            ctx.platform
                .create_container(account, url, post.caption.as_deref())
                .await
        }
        MediaRef::Carousel { urls } => {
            let mut children = Vec::with_capacity(urls.len());
            for url in urls {
                children.push(ctx.platform.create_carousel_child(account, url).await?);
            }
            ctx.platform
                .create_carousel_parent(account, &children, post.caption.as_deref())
                .await
        }
    }
}

async fn is_cancelled(ctx: &WorkerCtx, id: domain::model::PostId) -> anyhow::Result<bool> {
    let current = ctx.store.get_post(id).await?;
    Ok(current.status == PostStatus::Cancelled)
}

async fn account_frozen(ctx: &WorkerCtx, post: &Post) -> anyhow::Result<()> {
    let patch = StatusPatch {
        error_code: Some("account_frozen".into()),
        clear_lock: true,
        ..Default::default()
    };
    match ctx
        .store
        .update_status_from(
            post.id,
            &[PostStatus::Scheduled, PostStatus::Leased, PostStatus::Publishing],
            PostStatus::Failed,
            patch,
        )
        .await
    {
        Ok(()) => ctx.telemetry.post_failed(),
        Err(CoreError::Conflict(_)) => ctx.telemetry.post_cancelled(),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

async fn reschedule_for_quota(ctx: &WorkerCtx, post: &Post, retry_after: std::time::Duration) -> anyhow::Result<()> {
    let reschedule_to = post
        .scheduled_at
        .max(ctx.clock.now() + chrono::Duration::from_std(retry_after).unwrap_or_default());
    let patch = StatusPatch {
        retry_count: Some(post.retry_count + 1),
        reschedule_to: Some(reschedule_to),
        clear_lock: true,
        ..Default::default()
    };
    match ctx
        .store
        .update_status_from(post.id, &[PostStatus::Leased, PostStatus::Publishing], PostStatus::Scheduled, patch)
        .await
    {
        Ok(()) => ctx.telemetry.post_retried(),
        Err(CoreError::Conflict(_)) => ctx.telemetry.post_cancelled(),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

/// Spec §4.7 steps 5/6: retryable failures go back to `scheduled` with
/// jittered backoff added to `scheduled_at` until `MaxRetries` is exhausted;
/// everything else (and exhausted retries) becomes `failed`.
async fn handle_failure(ctx: &WorkerCtx, post: &Post, err: CoreError) -> anyhow::Result<()> {
    match err {
        CoreError::RateLimited { retry_after } => {
            ctx.telemetry.rate_limited();
            reschedule_for_quota(ctx, post, retry_after).await
        }
        CoreError::Transient(message) if post.retry_count + 1 < ctx.cfg.max_retries => {
            let mut rng = rand::thread_rng();
            let delay = jittered_retry_delay(post.retry_count, &mut rng);
            let reschedule_to = post
                .scheduled_at
                .max(ctx.clock.now() + chrono::Duration::from_std(delay).unwrap_or_default());
            let patch = StatusPatch {
                retry_count: Some(post.retry_count + 1),
                error_code: Some(message),
                reschedule_to: Some(reschedule_to),
                clear_lock: true,
                ..Default::default()
            };
            match ctx
                .store
                .update_status_from(post.id, &[PostStatus::Leased, PostStatus::Publishing], PostStatus::Scheduled, patch)
                .await
            {
                Ok(()) => ctx.telemetry.post_retried(),
                Err(CoreError::Conflict(_)) => ctx.telemetry.post_cancelled(),
                Err(e) => return Err(e.into()),
            }
            Ok(())
        }
        other => {
            let (code, message) = match other {
                CoreError::Terminal { code, message } => (code, message),
                CoreError::Transient(message) => ("max_retries_exceeded".to_string(), message),
                other => ("publish_failed".to_string(), other.to_string()),
            };
            let patch = StatusPatch {
                error_code: Some(format!("{code}: {message}")),
                clear_lock: true,
                ..Default::default()
            };
            match ctx
                .store
                .update_status_from(post.id, &[PostStatus::Leased, PostStatus::Publishing], PostStatus::Failed, patch)
                .await
            {
                Ok(()) => ctx.telemetry.post_failed(),
                Err(CoreError::Conflict(_)) => ctx.telemetry.post_cancelled(),
                Err(e) => return Err(e.into()),
            }
            Ok(())
        }
    }
}

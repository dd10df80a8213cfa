use crate::Store;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use domain::governor::{reserve_local, ReserveDecision, LOCAL_DAILY_CAP};
use domain::model::{AccountId, MediaRef, Post, PostId, PostStatus, PostType};
use domain::{CoreError, CoreResult};
use sqlx::postgres::PgRow;
use sqlx::Row;
use std::time::Duration;

const MIN_SPACING: ChronoDuration = ChronoDuration::minutes(15);

fn transient(e: sqlx::Error) -> CoreError {
    CoreError::Transient(e.to_string())
}

fn row_to_post(row: &PgRow) -> CoreResult<Post> {
    let post_type = PostType::parse(row.try_get::<String, _>("post_type").map_err(transient)?.as_str())?;
    let media_url_raw: String = row.try_get("media_url").map_err(transient)?;
    let media = MediaRef::from_wire(post_type, &media_url_raw)?;
    let status = PostStatus::parse(row.try_get::<String, _>("status").map_err(transient)?.as_str())?;
    Ok(Post {
        id: row.try_get("id").map_err(transient)?,
        account_id: row.try_get("account_id").map_err(transient)?,
        platform: row.try_get("platform").map_err(transient)?,
        post_type,
        media,
        caption: row.try_get("caption").map_err(transient)?,
        scheduled_at: row.try_get("scheduled_at").map_err(transient)?,
        status,
        retry_count: row.try_get("retry_count").map_err(transient)?,
        error_code: row.try_get("error_code").map_err(transient)?,
        publish_result: row.try_get("publish_result").map_err(transient)?,
        locked_at: row.try_get("locked_at").map_err(transient)?,
        client_request_id: row.try_get("client_request_id").map_err(transient)?,
    })
}

/// Converts a local calendar date to the `[start, end)` UTC instant bounds
/// of that day in `tz`, so spacing/cap queries can stay simple `>=`/`<`
/// range scans on `scheduled_at` instead of per-row timezone math in SQL.
fn local_day_utc_bounds(date: NaiveDate, tz: Tz) -> (DateTime<Utc>, DateTime<Utc>) {
    let start_naive = date.and_hms_opt(0, 0, 0).unwrap();
    let end_naive = date.succ_opt().unwrap().and_hms_opt(0, 0, 0).unwrap();
    let start = match tz.from_local_datetime(&start_naive) {
        chrono::LocalResult::Single(dt) => dt,
        chrono::LocalResult::Ambiguous(dt, _) => dt,
        chrono::LocalResult::None => tz.from_utc_datetime(&start_naive),
    };
    let end = match tz.from_local_datetime(&end_naive) {
        chrono::LocalResult::Single(dt) => dt,
        chrono::LocalResult::Ambiguous(_, dt) => dt,
        chrono::LocalResult::None => tz.from_utc_datetime(&end_naive),
    };
    (start.with_timezone(&Utc), end.with_timezone(&Utc))
}

pub struct NewPost {
    pub account_id: AccountId,
    pub platform: String,
    pub post_type: PostType,
    pub media: MediaRef,
    pub caption: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    pub client_request_id: Option<String>,
    pub override_spacing: bool,
}

pub struct CreateOutcome {
    pub post: Post,
    pub idempotent_hit: bool,
}

impl Store {
    /// Neighboring non-terminal posts on `date` (account-local), for both
    /// the spacing invariant (§3) and `SpacingConflict`'s "offending
    /// neighbor times" payload (§7).
    pub async fn neighbors_on_local_date(
        &self,
        account_id: AccountId,
        date: NaiveDate,
        tz: Tz,
        exclude_id: Option<PostId>,
    ) -> CoreResult<Vec<DateTime<Utc>>> {
        let (start, end) = local_day_utc_bounds(date, tz);
        let rows = sqlx::query(
            "select scheduled_at from scheduler.posts \
             where account_id = $1 and scheduled_at >= $2 and scheduled_at < $3 \
               and status not in ('failed', 'cancelled') and id <> coalesce($4, -1)",
        )
        .bind(account_id)
        .bind(start)
        .bind(end)
        .bind(exclude_id)
        .fetch_all(&self.pool)
        .await
        .map_err(transient)?;
        rows.into_iter()
            .map(|r| r.try_get::<DateTime<Utc>, _>("scheduled_at").map_err(transient))
            .collect()
    }

    async fn enforce_spacing_and_cap(
        &self,
        account_id: AccountId,
        scheduled_at: DateTime<Utc>,
        tz: Tz,
        exclude_id: Option<PostId>,
        override_spacing: bool,
    ) -> CoreResult<()> {
        let local_date = scheduled_at.with_timezone(&tz).date_naive();
        let neighbors = self
            .neighbors_on_local_date(account_id, local_date, tz, exclude_id)
            .await?;

        if override_spacing {
            return Ok(());
        }

        if reserve_local(neighbors.len() as i64, false) != ReserveDecision::Ok {
            return Err(CoreError::Conflict(format!(
                "account {account_id} already has {} non-terminal posts on {local_date} (cap {LOCAL_DAILY_CAP})",
                neighbors.len()
            )));
        }

        let offenders: Vec<DateTime<Utc>> = neighbors
            .into_iter()
            .filter(|t| (*t - scheduled_at).abs() < MIN_SPACING)
            .collect();
        if !offenders.is_empty() {
            return Err(CoreError::SpacingConflict {
                message: format!(
                    "post at {scheduled_at} is within {} of an existing post",
                    MIN_SPACING
                ),
                neighbors: offenders,
            });
        }
        Ok(())
    }

    pub async fn create_post(&self, new: NewPost, tz: Tz) -> CoreResult<CreateOutcome> {
        new.media.validate()?;

        if let Some(crid) = &new.client_request_id {
            if let Some(existing) = self.find_by_client_request_id(new.account_id, crid).await? {
                return Ok(CreateOutcome {
                    post: existing,
                    idempotent_hit: true,
                });
            }
        }

        self.enforce_spacing_and_cap(new.account_id, new.scheduled_at, tz, None, new.override_spacing)
            .await?;

        let row = sqlx::query(
            "insert into scheduler.posts \
                (account_id, platform, post_type, media_url, caption, scheduled_at, \
                 client_request_id, override_spacing) \
             values ($1, $2, $3, $4, $5, $6, $7, $8) \
             on conflict (account_id, client_request_id) where client_request_id is not null \
             do nothing \
             returning id, account_id, platform, post_type, media_url, caption, scheduled_at, \
                       status, retry_count, error_code, publish_result, locked_at, client_request_id",
        )
        .bind(new.account_id)
        .bind(&new.platform)
        .bind(new.post_type.as_db_str())
        .bind(new.media.to_wire())
        .bind(&new.caption)
        .bind(new.scheduled_at)
        .bind(&new.client_request_id)
        .bind(new.override_spacing)
        .fetch_optional(&self.pool)
        .await
        .map_err(transient)?;

        match row {
            Some(row) => Ok(CreateOutcome {
                post: row_to_post(&row)?,
                idempotent_hit: false,
            }),
            None => {
                // Lost the race to a concurrent identical request.
                let crid = new
                    .client_request_id
                    .expect("on-conflict target requires client_request_id");
                let existing = self
                    .find_by_client_request_id(new.account_id, &crid)
                    .await?
                    .ok_or_else(|| CoreError::Transient("idempotent insert raced but no row found".into()))?;
                Ok(CreateOutcome {
                    post: existing,
                    idempotent_hit: true,
                })
            }
        }
    }

    /// Inserts a week-chunk of planner-produced posts inside a single
    /// transaction: if insertion fails mid-chunk, the whole chunk is rolled
    /// back. The planner has already resolved spacing/cap against
    /// `existing_local_minutes`, so this skips the per-row spacing re-check
    /// `create_post` does for interactively-created posts and inserts
    /// directly.
    pub async fn create_posts_chunk(&self, posts: Vec<NewPost>) -> CoreResult<Vec<Post>> {
        let mut tx = self.pool.begin().await.map_err(transient)?;
        let mut created = Vec::with_capacity(posts.len());
        for new in posts {
            new.media.validate()?;
            let row = sqlx::query(
                "insert into scheduler.posts \
                    (account_id, platform, post_type, media_url, caption, scheduled_at, \
                     client_request_id, override_spacing) \
                 values ($1, $2, $3, $4, $5, $6, $7, $8) \
                 returning id, account_id, platform, post_type, media_url, caption, scheduled_at, \
                           status, retry_count, error_code, publish_result, locked_at, client_request_id",
            )
            .bind(new.account_id)
            .bind(&new.platform)
            .bind(new.post_type.as_db_str())
            .bind(new.media.to_wire())
            .bind(&new.caption)
            .bind(new.scheduled_at)
            .bind(&new.client_request_id)
            .bind(new.override_spacing)
            .fetch_one(&mut *tx)
            .await
            .map_err(transient)?;
            created.push(row_to_post(&row)?);
        }
        tx.commit().await.map_err(transient)?;
        Ok(created)
    }

    pub async fn find_by_client_request_id(
        &self,
        account_id: AccountId,
        client_request_id: &str,
    ) -> CoreResult<Option<Post>> {
        let row = sqlx::query(
            "select id, account_id, platform, post_type, media_url, caption, scheduled_at, \
                    status, retry_count, error_code, publish_result, locked_at, client_request_id \
             from scheduler.posts where account_id = $1 and client_request_id = $2",
        )
        .bind(account_id)
        .bind(client_request_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(transient)?;
        row.as_ref().map(row_to_post).transpose()
    }

    pub async fn get_post(&self, id: PostId) -> CoreResult<Post> {
        let row = sqlx::query(
            "select id, account_id, platform, post_type, media_url, caption, scheduled_at, \
                    status, retry_count, error_code, publish_result, locked_at, client_request_id \
             from scheduler.posts where id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(transient)?
        .ok_or_else(|| CoreError::NotFound(format!("post {id}")))?;
        row_to_post(&row)
    }

    pub async fn query_posts(
        &self,
        account_id: AccountId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> CoreResult<Vec<Post>> {
        let rows = sqlx::query(
            "select id, account_id, platform, post_type, media_url, caption, scheduled_at, \
                    status, retry_count, error_code, publish_result, locked_at, client_request_id \
             from scheduler.posts \
             where account_id = $1 and scheduled_at >= $2 and scheduled_at < $3 \
             order by scheduled_at, id",
        )
        .bind(account_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(transient)?;
        rows.iter().map(row_to_post).collect()
    }

    /// Move only succeeds for a future `scheduled` post (§4.5). On spacing
    /// violation, returns `SpacingConflict` with the offending neighbors so
    /// the caller can retry with `override_spacing=true`.
    pub async fn move_post(
        &self,
        id: PostId,
        new_scheduled_at: DateTime<Utc>,
        tz: Tz,
        override_spacing: bool,
    ) -> CoreResult<Post> {
        let post = self.get_post(id).await?;
        if post.status != PostStatus::Scheduled {
            return Err(CoreError::Conflict(format!(
                "post {id} is {:?}, only scheduled posts may be moved",
                post.status
            )));
        }
        self.enforce_spacing_and_cap(post.account_id, new_scheduled_at, tz, Some(id), override_spacing)
            .await?;

        let row = sqlx::query(
            "update scheduler.posts set scheduled_at = $1, override_spacing = $2, updated_at = now() \
             where id = $3 and status = 'scheduled' \
             returning id, account_id, platform, post_type, media_url, caption, scheduled_at, \
                       status, retry_count, error_code, publish_result, locked_at, client_request_id",
        )
        .bind(new_scheduled_at)
        .bind(override_spacing)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(transient)?
        .ok_or_else(|| CoreError::Conflict(format!("post {id} changed status concurrently")))?;
        row_to_post(&row)
    }

    /// §4.5: only future scheduled posts may be edited.
    pub async fn edit_caption(&self, id: PostId, caption: Option<String>) -> CoreResult<Post> {
        let row = sqlx::query(
            "update scheduler.posts set caption = $1, updated_at = now() \
             where id = $2 and status = 'scheduled' and scheduled_at > now() \
             returning id, account_id, platform, post_type, media_url, caption, scheduled_at, \
                       status, retry_count, error_code, publish_result, locked_at, client_request_id",
        )
        .bind(caption)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(transient)?
        .ok_or_else(|| CoreError::Conflict(format!("post {id} is not an editable future scheduled post")))?;
        row_to_post(&row)
    }

    /// Replace the post's media. When `caption` is `None`, attempts to
    /// extract one from the new url's `*****TEXT*****` filename marker
    /// (§4.5, §6). Only future scheduled posts may be replaced.
    pub async fn replace_media(
        &self,
        id: PostId,
        media: MediaRef,
        caption: Option<String>,
    ) -> CoreResult<Post> {
        media.validate()?;
        let caption = caption.or_else(|| {
            let url = match &media {
                MediaRef::Single { url } => url.clone(),
                MediaRef::Carousel { urls } => urls.first().cloned().unwrap_or_default(),
            };
            domain::model::extract_caption_from_filename(&url)
        });

        let row = sqlx::query(
            "update scheduler.posts set media_url = $1, caption = coalesce($2, caption), updated_at = now() \
             where id = $3 and status = 'scheduled' and scheduled_at > now() \
             returning id, account_id, platform, post_type, media_url, caption, scheduled_at, \
                       status, retry_count, error_code, publish_result, locked_at, client_request_id",
        )
        .bind(media.to_wire())
        .bind(caption)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(transient)?
        .ok_or_else(|| CoreError::Conflict(format!("post {id} is not an editable future scheduled post")))?;
        row_to_post(&row)
    }

    pub async fn delete_post(&self, id: PostId) -> CoreResult<()> {
        let n = sqlx::query("delete from scheduler.posts where id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(transient)?
            .rows_affected();
        if n == 0 {
            return Err(CoreError::NotFound(format!("post {id}")));
        }
        Ok(())
    }

    pub async fn bulk_delete(&self, ids: &[PostId]) -> CoreResult<u64> {
        let n = sqlx::query("delete from scheduler.posts where id = any($1)")
            .bind(ids)
            .execute(&self.pool)
            .await
            .map_err(transient)?
            .rows_affected();
        Ok(n)
    }

    /// Spec §4.1/§8: removes `{p : p.account_id=A, p.scheduled_at>T, p.status in (scheduled, leased)}`.
    pub async fn delete_after(&self, account_id: AccountId, after: DateTime<Utc>) -> CoreResult<u64> {
        let n = sqlx::query(
            "delete from scheduler.posts \
             where account_id = $1 and scheduled_at > $2 and status in ('scheduled', 'leased')",
        )
        .bind(account_id)
        .bind(after)
        .execute(&self.pool)
        .await
        .map_err(transient)?
        .rows_affected();
        Ok(n)
    }

    pub async fn clear_old_posts(&self, account_id: AccountId, now: DateTime<Utc>) -> CoreResult<u64> {
        let n = sqlx::query("delete from scheduler.posts where account_id = $1 and scheduled_at < $2")
            .bind(account_id)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(transient)?
            .rows_affected();
        Ok(n)
    }

    pub async fn count_non_terminal_on_local_date(
        &self,
        account_id: AccountId,
        date: NaiveDate,
        tz: Tz,
    ) -> CoreResult<i64> {
        Ok(self.neighbors_on_local_date(account_id, date, tz, None).await?.len() as i64)
    }

    /// Due-work scan + at-most-once lease, via a CTE plus
    /// `FOR UPDATE SKIP LOCKED`. `grace` lets the leaser pick up posts whose
    /// `scheduled_at` is a few seconds in the future, so a `TickInterval`
    /// boundary doesn't delay dispatch by a whole tick. Mirrors the teacher's
    /// `lease_jobs`: the claiming instance's id and an explicit
    /// `lease_expires_at` (computed from `lease_ttl` at claim time, not
    /// re-derived later) are stamped onto the row so the watchdog reclaims
    /// off a stored deadline instead of recomputing one from `locked_at`.
    pub async fn lease_due_posts(
        &self,
        leased_by: &str,
        grace: Duration,
        lease_ttl: Duration,
        limit: i64,
    ) -> CoreResult<Vec<Post>> {
        let grace_secs = grace.as_secs() as f64;
        let ttl_secs = lease_ttl.as_secs() as f64;
        let rows = sqlx::query(
            "with due as ( \
                select id from scheduler.posts \
                where status = 'scheduled' \
                  and scheduled_at <= now() + make_interval(secs => $1) \
                order by scheduled_at, id \
                limit $2 \
                for update skip locked \
             ) \
             update scheduler.posts p set \
                status = 'leased', \
                locked_at = now(), \
                leased_by = $3, \
                lease_expires_at = now() + make_interval(secs => $4), \
                updated_at = now() \
             from due \
             where p.id = due.id \
             returning p.id, p.account_id, p.platform, p.post_type, p.media_url, p.caption, \
                       p.scheduled_at, p.status, p.retry_count, p.error_code, p.publish_result, \
                       p.locked_at, p.client_request_id",
        )
        .bind(grace_secs)
        .bind(limit)
        .bind(leased_by)
        .bind(ttl_secs)
        .fetch_all(&self.pool)
        .await
        .map_err(transient)?;
        rows.iter().map(row_to_post).collect()
    }

    pub async fn renew_lease(&self, id: PostId) -> CoreResult<()> {
        let n = sqlx::query(
            "update scheduler.posts set locked_at = now(), updated_at = now() \
             where id = $1 and status in ('leased', 'publishing')",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(transient)?
        .rows_affected();
        if n == 0 {
            return Err(CoreError::Conflict(format!("lost lease for post {id}")));
        }
        Ok(())
    }

    /// Watchdog sweep (§4.6/§5): returns expired leases to `scheduled`,
    /// incrementing `retry_count` so the FSM driver's retry-exhaustion
    /// accounting stays correct. Reclaims off the `lease_expires_at` stamped
    /// by `lease_due_posts` at claim time rather than recomputing a deadline
    /// from `locked_at` + a TTL passed in again here, so a post's lease
    /// length is decided once, at the moment it's granted.
    pub async fn reclaim_expired_leases(&self) -> CoreResult<u64> {
        let n = sqlx::query(
            "update scheduler.posts set \
                status = 'scheduled', \
                locked_at = null, \
                leased_by = null, \
                lease_expires_at = null, \
                retry_count = retry_count + 1, \
                updated_at = now() \
             where status in ('leased', 'publishing') \
               and lease_expires_at < now()",
        )
        .execute(&self.pool)
        .await
        .map_err(transient)?
        .rows_affected();
        Ok(n)
    }

    /// Compare-and-set transition used by the FSM driver. `expected` is a
    /// `state = any($4::text[])` guard: a rejected update (0 rows) means the
    /// post's status changed concurrently (cancelled, lease expired and
    /// re-leased, etc).
    pub async fn update_status_from(
        &self,
        id: PostId,
        expected: &[PostStatus],
        next: PostStatus,
        patch: StatusPatch,
    ) -> CoreResult<()> {
        let expected: Vec<&'static str> = expected.iter().map(|s| s.as_db_str()).collect();
        let n = sqlx::query(
            "update scheduler.posts set \
                status = $1, \
                retry_count = coalesce($2, retry_count), \
                error_code = $3, \
                publish_result = coalesce($4, publish_result), \
                scheduled_at = coalesce($5, scheduled_at), \
                locked_at = case when $6 then null else locked_at end, \
                leased_by = case when $6 then null else leased_by end, \
                lease_expires_at = case when $6 then null else lease_expires_at end, \
                updated_at = now() \
             where id = $7 and status = any($8::text[])",
        )
        .bind(next.as_db_str())
        .bind(patch.retry_count)
        .bind(patch.error_code)
        .bind(patch.publish_result)
        .bind(patch.reschedule_to)
        .bind(patch.clear_lock)
        .bind(id)
        .bind(&expected)
        .execute(&self.pool)
        .await
        .map_err(transient)?
        .rows_affected();
        if n == 0 {
            return Err(CoreError::Conflict(format!(
                "post {id} was not in one of {expected:?} when transitioning to {next:?}"
            )));
        }
        Ok(())
    }

}

/// Optional fields a status transition may persist alongside the new status.
#[derive(Default)]
pub struct StatusPatch {
    pub retry_count: Option<i32>,
    pub error_code: Option<String>,
    pub publish_result: Option<serde_json::Value>,
    pub reschedule_to: Option<DateTime<Utc>>,
    pub clear_lock: bool,
}

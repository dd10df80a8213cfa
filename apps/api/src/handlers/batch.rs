use crate::error::ApiResult;
use crate::state::AppState;
use crate::wire::{local_date_range_to_utc, parse_minute_of_day};
use axum::extract::State;
use axum::Json;
use chrono::{Datelike, NaiveDate, Timelike};
use domain::model::{AccountId, PostStatus, PostType};
use domain::planner::{plan, MediaItem, PlannedSlot, PlannerInput, VideoMode, WeeklyPlan};
use domain::CoreError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::str::FromStr;
use store::NewPost;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MediaItemWire {
    Image { url: String },
    Video { url: String },
    Carousel { urls: Vec<String> },
}

fn to_media_item(w: &MediaItemWire) -> MediaItem {
    match w {
        MediaItemWire::Image { url } => MediaItem::Image(url.clone()),
        MediaItemWire::Video { url } => MediaItem::Video(url.clone()),
        MediaItemWire::Carousel { urls } => MediaItem::Carousel(urls.clone()),
    }
}

fn parse_video_mode(raw: &str) -> Result<VideoMode, CoreError> {
    match raw {
        "reel_feed" => Ok(VideoMode::ReelFeed),
        "reel_only" => Ok(VideoMode::ReelOnly),
        other => Err(CoreError::Validation(format!(
            "unknown video_mode: {other} (expected reel_feed|reel_only)"
        ))),
    }
}

/// Shared by preflight and commit: commit must feed `plan()` the identical
/// seed and inputs preflight used, so committing creates exactly the posts
/// preflight previewed.
#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub account_id: AccountId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub weekly_plan: [u8; 7],
    pub timezone: Option<String>,
    pub random_start: String,
    pub random_end: String,
    pub min_spacing_minutes: Option<i64>,
    pub media_pool: Vec<MediaItemWire>,
    pub video_mode: String,
    pub override_spacing: Option<bool>,
    pub seed: Option<u64>,
}

async fn build_planner_input(state: &AppState, req: &BatchRequest) -> ApiResult<(PlannerInput, u64)> {
    let account = state.store.get_account(req.account_id).await?;
    let tz = match &req.timezone {
        Some(raw) => chrono_tz::Tz::from_str(raw)
            .map_err(|_| CoreError::Validation(format!("unknown timezone: {raw}")))?,
        None => account.timezone,
    };

    let mut weekly_plan: WeeklyPlan = req.weekly_plan;
    for n in &mut weekly_plan {
        *n = (*n).min(15);
    }

    let (start_utc, end_utc) = local_date_range_to_utc(req.start_date, req.end_date, tz);
    let existing = state.store.query_posts(req.account_id, start_utc, end_utc).await?;
    let mut existing_local_minutes: HashMap<NaiveDate, Vec<i64>> = HashMap::new();
    for post in existing {
        if matches!(post.status, PostStatus::Failed | PostStatus::Cancelled) {
            continue;
        }
        let local = post.scheduled_at.with_timezone(&tz);
        let minute = (local.hour() * 60 + local.minute()) as i64;
        existing_local_minutes.entry(local.date_naive()).or_default().push(minute);
    }

    let video_mode = parse_video_mode(&req.video_mode)?;
    let media_pool: Vec<MediaItem> = req.media_pool.iter().map(to_media_item).collect();
    let seed = req.seed.unwrap_or_else(|| rand::random::<u64>());
    if req.seed.is_none() {
        tracing::info!(seed, account_id = %req.account_id, "batch request generated random seed");
    }

    let input = PlannerInput {
        start_date: req.start_date,
        end_date: req.end_date,
        weekly_plan,
        timezone: tz,
        random_start_minute: parse_minute_of_day(&req.random_start)?,
        random_end_minute: parse_minute_of_day(&req.random_end)?,
        min_spacing_minutes: req.min_spacing_minutes.unwrap_or(15),
        media_pool,
        video_mode,
        override_spacing: req.override_spacing.unwrap_or(false),
        existing_local_minutes,
        seed,
    };
    Ok((input, seed))
}

#[derive(Debug, Serialize)]
struct SlotWire {
    local_date: NaiveDate,
    scheduled_at: chrono::DateTime<chrono::Utc>,
    media: domain::model::MediaRef,
    post_type: PostType,
}

impl From<&PlannedSlot> for SlotWire {
    fn from(s: &PlannedSlot) -> Self {
        Self {
            local_date: s.local_date,
            scheduled_at: s.scheduled_at,
            media: s.media.clone(),
            post_type: s.post_type,
        }
    }
}

pub async fn batch_preflight(
    State(state): State<AppState>,
    Json(req): Json<BatchRequest>,
) -> ApiResult<Json<Value>> {
    let (input, seed) = build_planner_input(&state, &req).await?;
    let output = plan(input);
    let slots: Vec<SlotWire> = output.slots.iter().map(SlotWire::from).collect();
    Ok(Json(json!({
        "slots": slots,
        "conflicts": output.conflicts.iter().map(|c| json!({
            "date": c.date,
            "requested": c.requested,
            "scheduled": c.scheduled,
            "reason": c.reason,
        })).collect::<Vec<_>>(),
        "insufficient": output.insufficient_media,
        "seed": seed,
    })))
}

/// Re-runs `plan()` with the same seed `batch_preflight` returned, then
/// inserts the resulting slots in ISO-week chunks, each its own
/// transaction.
pub async fn batch_commit(
    State(state): State<AppState>,
    Json(req): Json<BatchRequest>,
) -> ApiResult<Json<Value>> {
    let (input, _seed) = build_planner_input(&state, &req).await?;
    let override_spacing = input.override_spacing;
    let output = plan(input);
    if output.insufficient_media {
        return Err(CoreError::Validation(
            "media pool is insufficient for the requested weekly plan".into(),
        )
        .into());
    }

    let mut chunks: Vec<Vec<NewPost>> = Vec::new();
    let mut current_week: Option<(i32, u32)> = None;
    for slot in &output.slots {
        let iso = slot.local_date.iso_week();
        let key = (iso.year(), iso.week());
        if current_week != Some(key) {
            chunks.push(Vec::new());
            current_week = Some(key);
        }
        let caption = match &slot.media {
            domain::model::MediaRef::Single { url } => domain::model::extract_caption_from_filename(url),
            domain::model::MediaRef::Carousel { urls } => urls
                .first()
                .and_then(|url| domain::model::extract_caption_from_filename(url)),
        };
        chunks.last_mut().unwrap().push(NewPost {
            account_id: req.account_id,
            platform: "instagram".to_string(),
            post_type: slot.post_type,
            media: slot.media.clone(),
            caption,
            scheduled_at: slot.scheduled_at,
            client_request_id: None,
            override_spacing,
        });
    }

    let mut created = 0u64;
    for chunk in chunks {
        let inserted = state.store.create_posts_chunk(chunk).await?;
        created += inserted.len() as u64;
    }

    Ok(Json(json!({ "ok": true, "created": created })))
}

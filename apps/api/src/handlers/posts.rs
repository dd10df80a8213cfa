use crate::error::ApiResult;
use crate::state::AppState;
use crate::wire::parse_scheduled_at;
use axum::extract::{Path, Query, State};
use axum::Json;
use domain::model::{AccountId, MediaAssetId, MediaRef, PostId, PostType};
use domain::CoreError;
use serde::Deserialize;
use serde_json::{json, Value};
use store::NewPost;

#[derive(Debug, Deserialize)]
pub struct QueryParams {
    pub account_id: AccountId,
    pub start: String,
    pub end: String,
}

pub async fn query_posts(
    State(state): State<AppState>,
    Query(params): Query<QueryParams>,
) -> ApiResult<Json<Value>> {
    let account = state.store.get_account(params.account_id).await?;
    let start = parse_scheduled_at(&params.start, account.timezone)?;
    let end = parse_scheduled_at(&params.end, account.timezone)?;
    let items = state.store.query_posts(params.account_id, start, end).await?;
    Ok(Json(json!({ "items": items })))
}

#[derive(Debug, Deserialize)]
pub struct CreatePostPayload {
    pub account_id: AccountId,
    pub platform: Option<String>,
    pub post_type: String,
    pub media_url: String,
    pub caption: Option<String>,
    pub scheduled_at: String,
    pub asset_id: Option<MediaAssetId>,
    pub client_request_id: Option<String>,
    pub override_spacing: Option<bool>,
}

pub async fn create_post(
    State(state): State<AppState>,
    Json(payload): Json<CreatePostPayload>,
) -> ApiResult<(axum::http::StatusCode, Json<Value>)> {
    let account = state.store.get_account(payload.account_id).await?;
    let post_type = PostType::parse(&payload.post_type)?;

    let media_url = match payload.asset_id {
        Some(asset_id) => {
            let asset = state.store.get_media_asset(asset_id).await?;
            if asset.account_id != payload.account_id {
                return Err(CoreError::Validation(format!(
                    "media asset {asset_id} does not belong to account {}",
                    payload.account_id
                ))
                .into());
            }
            asset.media_url
        }
        None => payload.media_url,
    };
    let media = MediaRef::from_wire(post_type, &media_url)?;

    let caption = payload
        .caption
        .or_else(|| domain::model::extract_caption_from_filename(&media_url));

    let scheduled_at = parse_scheduled_at(&payload.scheduled_at, account.timezone)?;

    let new = NewPost {
        account_id: payload.account_id,
        platform: payload.platform.unwrap_or_else(|| "instagram".to_string()),
        post_type,
        media,
        caption,
        scheduled_at,
        client_request_id: payload.client_request_id,
        override_spacing: payload.override_spacing.unwrap_or(false),
    };

    let outcome = state.store.create_post(new, account.timezone).await?;
    let status = if outcome.idempotent_hit {
        axum::http::StatusCode::OK
    } else {
        axum::http::StatusCode::CREATED
    };
    Ok((
        status,
        Json(json!({ "id": outcome.post.id, "status": outcome.post.status })),
    ))
}

#[derive(Debug, Deserialize, Default)]
pub struct UpdatePostPayload {
    pub scheduled_at: Option<String>,
    pub caption: Option<String>,
    pub media_url: Option<String>,
    pub override_spacing: Option<bool>,
}

/// Move/edit/replace, dispatched from one partial-update payload: media
/// replacement first (it may also update the caption), then a standalone
/// caption edit, then the move. Every step only succeeds against a future
/// `scheduled` post; the store enforces that.
pub async fn update_post(
    State(state): State<AppState>,
    Path(id): Path<PostId>,
    Json(payload): Json<UpdatePostPayload>,
) -> ApiResult<Json<Value>> {
    if let Some(media_url) = payload.media_url {
        let current = state.store.get_post(id).await?;
        let media = MediaRef::from_wire(current.post_type, &media_url)?;
        state.store.replace_media(id, media, payload.caption.clone()).await?;
    } else if let Some(caption) = payload.caption {
        state.store.edit_caption(id, Some(caption)).await?;
    }

    if let Some(raw) = payload.scheduled_at {
        let current = state.store.get_post(id).await?;
        let account = state.store.get_account(current.account_id).await?;
        let scheduled_at = parse_scheduled_at(&raw, account.timezone)?;
        state
            .store
            .move_post(id, scheduled_at, account.timezone, payload.override_spacing.unwrap_or(false))
            .await?;
    }

    let post = state.store.get_post(id).await?;
    Ok(Json(json!(post)))
}

pub async fn delete_post(State(state): State<AppState>, Path(id): Path<PostId>) -> ApiResult<Json<Value>> {
    state.store.delete_post(id).await?;
    Ok(Json(json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
pub struct BulkDeletePayload {
    pub ids: Vec<PostId>,
}

pub async fn bulk_delete(
    State(state): State<AppState>,
    Json(payload): Json<BulkDeletePayload>,
) -> ApiResult<Json<Value>> {
    let deleted = state.store.bulk_delete(&payload.ids).await?;
    Ok(Json(json!({ "deleted": deleted })))
}

#[derive(Debug, Deserialize)]
pub struct DeleteAfterPayload {
    pub account_id: AccountId,
    pub after: String,
}

pub async fn delete_after(
    State(state): State<AppState>,
    Json(payload): Json<DeleteAfterPayload>,
) -> ApiResult<Json<Value>> {
    let account = state.store.get_account(payload.account_id).await?;
    let after = parse_scheduled_at(&payload.after, account.timezone)?;
    let deleted = state.store.delete_after(payload.account_id, after).await?;
    Ok(Json(json!({ "deleted": deleted })))
}

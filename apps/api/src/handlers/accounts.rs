use crate::error::ApiResult;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::Json;
use domain::model::AccountId;
use serde::Deserialize;
use serde_json::{json, Value};

pub async fn list_accounts(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let accounts = state.store.list_accounts().await?;
    Ok(Json(json!({ "items": accounts })))
}

/// §6: both fields are optional and there is no account-identifying field —
/// OAuth token acquisition and profile refresh are out of scope (§1), so this
/// endpoint does not mutate any account row. It exists as the seam the UI
/// polls after an out-of-scope refresh flow completes elsewhere; the response
/// is always the current account list re-read from the store.
#[derive(Debug, Default, Deserialize)]
pub struct RefreshAccountPayload {
    pub token: Option<String>,
    pub timezone: Option<String>,
}

pub async fn refresh_accounts(
    State(state): State<AppState>,
    body: Option<Json<RefreshAccountPayload>>,
) -> ApiResult<Json<Value>> {
    let _ = body.map(|Json(payload)| payload).unwrap_or_default();
    let accounts = state.store.list_accounts().await?;
    Ok(Json(json!({ "items": accounts })))
}

pub async fn freeze_account(
    State(state): State<AppState>,
    Path(id): Path<AccountId>,
) -> ApiResult<Json<Value>> {
    let failed = state.store.freeze_account(id).await?;
    tracing::info!(account_id = %id, failed, "account frozen");
    Ok(Json(json!({ "ok": true })))
}

pub async fn unfreeze_account(
    State(state): State<AppState>,
    Path(id): Path<AccountId>,
) -> ApiResult<Json<Value>> {
    state.store.set_account_active(id, true).await?;
    Ok(Json(json!({ "ok": true })))
}

pub async fn clear_old_posts(
    State(state): State<AppState>,
    Path(id): Path<AccountId>,
) -> ApiResult<Json<Value>> {
    // Ensures the account exists before reporting a deletion count.
    state.store.get_account(id).await?;
    let deleted = state.store.clear_old_posts(id, chrono::Utc::now()).await?;
    Ok(Json(json!({ "deleted": deleted })))
}

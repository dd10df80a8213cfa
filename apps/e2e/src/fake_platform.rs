use anyhow::{Context, Result};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

/// In-process HTTP stand-in for the platform's graph API, implemented as a
/// single-purpose axum mock server. Unlike
/// `platform::mock::MockPlatformClient` (an in-process `PlatformClient` impl
/// used by crate-level unit tests), this one is driven over real HTTP so
/// `apps/scheduler`'s `HttpPlatformClient` can be exercised end-to-end
/// against a subprocess via `PLATFORM_BASE_URL`.
pub struct FakePlatform {
    pub base_url: String,
    handle: JoinHandle<()>,
    inner: Arc<Inner>,
}

struct Inner {
    next_id: AtomicU64,
    containers: Mutex<HashMap<String, u32>>,
    polls_until_ready: AtomicU32,
    publish_used: AtomicU32,
    publish_limit: AtomicU32,
    revoked_tokens: Mutex<Vec<String>>,
    create_calls: AtomicU32,
    publish_calls: AtomicU32,
}

impl FakePlatform {
    pub async fn start(polls_until_ready: u32, publish_limit: u32) -> Result<Self> {
        let inner = Arc::new(Inner {
            next_id: AtomicU64::new(1),
            containers: Mutex::new(HashMap::new()),
            polls_until_ready: AtomicU32::new(polls_until_ready.max(1)),
            publish_used: AtomicU32::new(0),
            publish_limit: AtomicU32::new(publish_limit),
            revoked_tokens: Mutex::new(Vec::new()),
            create_calls: AtomicU32::new(0),
            publish_calls: AtomicU32::new(0),
        });

        let app = Router::new()
            .route("/media", post(create_media))
            .route("/media_publish", post(publish_media))
            .route("/content_publishing_limit", get(publishing_limit))
            .route("/{id}", get(container_status))
            .with_state(inner.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .context("bind fake platform")?;
        let addr: SocketAddr = listener.local_addr().context("fake platform local_addr")?;
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Ok(Self {
            base_url: format!("http://{addr}"),
            handle,
            inner,
        })
    }

    /// Subsequent calls bearing this bearer token fail with 401, exercising
    /// the scheduler's `auth_revoked` terminal-error path.
    pub fn revoke_token(&self, token: &str) {
        self.inner
            .revoked_tokens
            .lock()
            .expect("revoked_tokens mutex poisoned")
            .push(token.to_string());
    }

    pub fn set_publish_limit(&self, used: u32, limit: u32) {
        self.inner.publish_used.store(used, Ordering::SeqCst);
        self.inner.publish_limit.store(limit, Ordering::SeqCst);
    }

    /// Number of `create_container`/`create_carousel_child`/
    /// `create_carousel_parent` calls (i.e. `POST /media`) observed so far.
    /// Used to assert a resumed post doesn't re-create its container.
    pub fn create_call_count(&self) -> u32 {
        self.inner.create_calls.load(Ordering::SeqCst)
    }

    /// Number of `publish` calls (`POST /media_publish`) observed so far.
    pub fn publish_call_count(&self) -> u32 {
        self.inner.publish_calls.load(Ordering::SeqCst)
    }
}

impl Drop for FakePlatform {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn bearer_token(headers: &HeaderMap) -> String {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or_default()
        .to_string()
}

fn check_auth(inner: &Inner, headers: &HeaderMap) -> Result<(), (StatusCode, Json<Value>)> {
    let token = bearer_token(headers);
    let revoked = inner.revoked_tokens.lock().expect("revoked_tokens mutex poisoned");
    if revoked.contains(&token) {
        return Err((StatusCode::UNAUTHORIZED, Json(json!({ "error": "token revoked" }))));
    }
    Ok(())
}

async fn create_media(
    State(inner): State<Arc<Inner>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    check_auth(&inner, &headers)?;
    let media_url = body.get("media_url").and_then(|v| v.as_str()).unwrap_or_default();
    if media_url.contains("REJECT") {
        return Err((StatusCode::BAD_REQUEST, Json(json!({ "error": "content rejected" }))));
    }
    inner.create_calls.fetch_add(1, Ordering::SeqCst);
    let id = inner.next_id.fetch_add(1, Ordering::SeqCst);
    let id = format!("container-{id}");
    inner
        .containers
        .lock()
        .expect("containers mutex poisoned")
        .insert(id.clone(), 0);
    Ok(Json(json!({ "id": id })))
}

async fn container_status(
    State(inner): State<Arc<Inner>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    check_auth(&inner, &headers)?;
    let mut containers = inner.containers.lock().expect("containers mutex poisoned");
    let polls = containers
        .get_mut(&id)
        .ok_or((StatusCode::NOT_FOUND, Json(json!({ "error": "unknown container" }))))?;
    *polls += 1;
    let threshold = inner.polls_until_ready.load(Ordering::SeqCst);
    let status_code = if *polls >= threshold { "FINISHED" } else { "IN_PROGRESS" };
    Ok(Json(json!({ "status_code": status_code })))
}

async fn publish_media(
    State(inner): State<Arc<Inner>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    check_auth(&inner, &headers)?;
    let creation_id = body.get("creation_id").and_then(|v| v.as_str()).unwrap_or_default();
    inner.publish_calls.fetch_add(1, Ordering::SeqCst);
    let used = inner.publish_used.fetch_add(1, Ordering::SeqCst) + 1;
    let limit = inner.publish_limit.load(Ordering::SeqCst);
    if used > limit {
        return Err((StatusCode::TOO_MANY_REQUESTS, Json(json!({ "error": "rate limited" }))));
    }
    Ok(Json(json!({ "id": format!("media-{creation_id}") })))
}

async fn publishing_limit(
    State(inner): State<Arc<Inner>>,
    headers: HeaderMap,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    check_auth(&inner, &headers)?;
    Ok(Json(json!({
        "used": inner.publish_used.load(Ordering::SeqCst),
        "limit": inner.publish_limit.load(Ordering::SeqCst),
        "window_resets_in_secs": 86_400,
    })))
}

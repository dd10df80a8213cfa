use crate::{ContainerStatus, PlatformClient};
use async_trait::async_trait;
use domain::governor::PublishingLimit;
use domain::model::Account;
use domain::{CoreError, CoreResult};
use reqwest::{Client, StatusCode};
use std::time::{Duration, Instant};

/// Reqwest-backed `PlatformClient`, grounded on `IndexerClient`: a thin
/// typed wrapper holding its own `Client` with a fixed per-call timeout,
/// timing every request and classifying non-2xx responses rather than
/// retrying internally.
pub struct HttpPlatformClient {
    base_url: String,
    http: Client,
}

impl HttpPlatformClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into(),
            http,
        })
    }

    fn classify_status(status: StatusCode, body: &str) -> CoreError {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => CoreError::Terminal {
                code: "auth_revoked".into(),
                message: body.to_string(),
            },
            StatusCode::UNPROCESSABLE_ENTITY | StatusCode::BAD_REQUEST => CoreError::Terminal {
                code: "content_rejected".into(),
                message: body.to_string(),
            },
            StatusCode::TOO_MANY_REQUESTS => CoreError::RateLimited {
                retry_after: Duration::from_secs(30),
            },
            s if s.is_server_error() => CoreError::Transient(format!("platform {s}: {body}")),
            s => CoreError::Transient(format!("unexpected platform status {s}: {body}")),
        }
    }

    async fn call_json(
        &self,
        method: reqwest::Method,
        path: &str,
        account: &Account,
        body: Option<serde_json::Value>,
    ) -> CoreResult<serde_json::Value> {
        let started = Instant::now();
        let url = format!("{}{}", self.base_url, path);
        let mut req = self
            .http
            .request(method, &url)
            .bearer_auth(&account.access_token);
        if let Some(body) = &body {
            req = req.json(body);
        }
        let resp = req.send().await.map_err(|e| {
            if e.is_timeout() {
                CoreError::Transient(format!("platform call to {path} timed out"))
            } else {
                CoreError::Transient(format!("platform call to {path} failed: {e}"))
            }
        })?;
        let status = resp.status();
        let elapsed = started.elapsed();
        tracing::debug!(path, status = %status, elapsed_ms = elapsed.as_millis() as u64, "platform call");

        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(Self::classify_status(status, &text));
        }
        resp.json::<serde_json::Value>()
            .await
            .map_err(|e| CoreError::Transient(format!("decode platform response from {path}: {e}")))
    }
}

#[async_trait]
impl PlatformClient for HttpPlatformClient {
    async fn create_container(
        &self,
        account: &Account,
        media_url: &str,
        caption: Option<&str>,
    ) -> CoreResult<String> {
        let body = serde_json::json!({ "media_url": media_url, "caption": caption });
        let v = self
            .call_json(reqwest::Method::POST, "/media", account, Some(body))
            .await?;
        v.get("id")
            .and_then(|x| x.as_str())
            .map(str::to_string)
            .ok_or_else(|| CoreError::Transient("create_container response missing id".into()))
    }

    async fn container_status(&self, account: &Account, container_id: &str) -> CoreResult<ContainerStatus> {
        let path = format!("/{container_id}?fields=status_code");
        let v = self.call_json(reqwest::Method::GET, &path, account, None).await?;
        match v.get("status_code").and_then(|x| x.as_str()) {
            Some("IN_PROGRESS") => Ok(ContainerStatus::InProgress),
            Some("FINISHED") => Ok(ContainerStatus::Finished),
            Some("ERROR") => Ok(ContainerStatus::Error),
            Some("EXPIRED") => Ok(ContainerStatus::Expired),
            other => Err(CoreError::Transient(format!("unknown container status: {other:?}"))),
        }
    }

    async fn publish(&self, account: &Account, container_id: &str) -> CoreResult<String> {
        let body = serde_json::json!({ "creation_id": container_id });
        let v = self
            .call_json(reqwest::Method::POST, "/media_publish", account, Some(body))
            .await?;
        v.get("id")
            .and_then(|x| x.as_str())
            .map(str::to_string)
            .ok_or_else(|| CoreError::Transient("publish response missing id".into()))
    }

    async fn publishing_limit(&self, account: &Account) -> CoreResult<PublishingLimit> {
        let v = self
            .call_json(reqwest::Method::GET, "/content_publishing_limit", account, None)
            .await?;
        let used = v.get("used").and_then(|x| x.as_u64()).unwrap_or(0) as u32;
        let limit = v.get("limit").and_then(|x| x.as_u64()).unwrap_or(25) as u32;
        let resets_in_secs = v.get("window_resets_in_secs").and_then(|x| x.as_i64()).unwrap_or(86_400);
        Ok(PublishingLimit {
            used,
            limit,
            window_resets_at: chrono::Utc::now() + chrono::Duration::seconds(resets_in_secs),
        })
    }

    async fn create_carousel_child(&self, account: &Account, item_url: &str) -> CoreResult<String> {
        let body = serde_json::json!({ "media_url": item_url, "is_carousel_item": true });
        let v = self
            .call_json(reqwest::Method::POST, "/media", account, Some(body))
            .await?;
        v.get("id")
            .and_then(|x| x.as_str())
            .map(str::to_string)
            .ok_or_else(|| CoreError::Transient("create_carousel_child response missing id".into()))
    }

    async fn create_carousel_parent(
        &self,
        account: &Account,
        child_ids: &[String],
        caption: Option<&str>,
    ) -> CoreResult<String> {
        let body = serde_json::json!({
            "media_type": "CAROUSEL",
            "children": child_ids,
            "caption": caption,
        });
        let v = self
            .call_json(reqwest::Method::POST, "/media", account, Some(body))
            .await?;
        v.get("id")
            .and_then(|x| x.as_str())
            .map(str::to_string)
            .ok_or_else(|| CoreError::Transient("create_carousel_parent response missing id".into()))
    }
}

use crate::{ContainerStatus, PlatformClient};
use async_trait::async_trait;
use domain::governor::PublishingLimit;
use domain::model::Account;
use domain::{CoreError, CoreResult};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// In-memory `PlatformClient` for integration tests (`apps/e2e`) and local
/// development, grounded on `tron_backend::mock`'s idea of a deterministic
/// stand-in backend. Containers reach `Finished` after `polls_until_ready`
/// status checks, so tests can exercise the poll loop without sleeping for
/// the platform's real latency.
pub struct MockPlatformClient {
    next_id: AtomicU64,
    containers: Mutex<HashMap<String, u32>>,
    polls_until_ready: u32,
    limit: Mutex<PublishingLimit>,
}

impl MockPlatformClient {
    pub fn new(polls_until_ready: u32) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            containers: Mutex::new(HashMap::new()),
            polls_until_ready,
            limit: Mutex::new(PublishingLimit {
                used: 0,
                limit: 25,
                window_resets_at: chrono::Utc::now() + chrono::Duration::hours(24),
            }),
        }
    }

    pub fn set_limit(&self, limit: PublishingLimit) {
        *self.limit.lock().expect("mock limit mutex poisoned") = limit;
    }

    fn fresh_id(&self, prefix: &str) -> String {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        format!("{prefix}-{n}")
    }
}

#[async_trait]
impl PlatformClient for MockPlatformClient {
    async fn create_container(
        &self,
        account: &Account,
        _media_url: &str,
        _caption: Option<&str>,
    ) -> CoreResult<String> {
        if !account.active {
            return Err(CoreError::Terminal {
                code: "account_frozen".into(),
                message: "account is frozen".into(),
            });
        }
        let id = self.fresh_id("container");
        self.containers
            .lock()
            .expect("mock containers mutex poisoned")
            .insert(id.clone(), 0);
        Ok(id)
    }

    async fn container_status(&self, _account: &Account, container_id: &str) -> CoreResult<ContainerStatus> {
        let mut containers = self.containers.lock().expect("mock containers mutex poisoned");
        let polls = containers
            .get_mut(container_id)
            .ok_or_else(|| CoreError::NotFound(format!("unknown container {container_id}")))?;
        *polls += 1;
        if *polls >= self.polls_until_ready {
            Ok(ContainerStatus::Finished)
        } else {
            Ok(ContainerStatus::InProgress)
        }
    }

    async fn publish(&self, _account: &Account, container_id: &str) -> CoreResult<String> {
        let mut limit = self.limit.lock().expect("mock limit mutex poisoned");
        if limit.used >= limit.limit {
            return Err(CoreError::RateLimited {
                retry_after: (limit.window_resets_at - chrono::Utc::now())
                    .to_std()
                    .unwrap_or_default(),
            });
        }
        limit.used += 1;
        Ok(format!("media-{container_id}"))
    }

    async fn publishing_limit(&self, _account: &Account) -> CoreResult<PublishingLimit> {
        Ok(*self.limit.lock().expect("mock limit mutex poisoned"))
    }

    async fn create_carousel_child(&self, account: &Account, media_url: &str) -> CoreResult<String> {
        self.create_container(account, media_url, None).await
    }

    async fn create_carousel_parent(
        &self,
        account: &Account,
        child_ids: &[String],
        caption: Option<&str>,
    ) -> CoreResult<String> {
        let _ = child_ids;
        self.create_container(account, "carousel", caption).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::model::{Account, AccountId};

    fn account(active: bool) -> Account {
        Account {
            id: AccountId(1),
            platform_user_id: "pu1".into(),
            handle: "handle".into(),
            access_token: "token".into(),
            timezone: chrono_tz::UTC,
            active,
        }
    }

    #[tokio::test]
    async fn container_becomes_finished_after_configured_polls() {
        let client = MockPlatformClient::new(3);
        let acct = account(true);
        let id = client.create_container(&acct, "https://x/a.jpg", None).await.unwrap();
        assert_eq!(client.container_status(&acct, &id).await.unwrap(), ContainerStatus::InProgress);
        assert_eq!(client.container_status(&acct, &id).await.unwrap(), ContainerStatus::InProgress);
        assert_eq!(client.container_status(&acct, &id).await.unwrap(), ContainerStatus::Finished);
    }

    #[tokio::test]
    async fn frozen_account_cannot_create_a_container() {
        let client = MockPlatformClient::new(1);
        let err = client
            .create_container(&account(false), "https://x/a.jpg", None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Terminal { code, .. } if code == "account_frozen"));
    }

    #[tokio::test]
    async fn publish_fails_with_rate_limited_once_quota_is_exhausted() {
        let client = MockPlatformClient::new(1);
        client.set_limit(PublishingLimit {
            used: 1,
            limit: 1,
            window_resets_at: chrono::Utc::now() + chrono::Duration::seconds(30),
        });
        let err = client.publish(&account(true), "container-1").await.unwrap_err();
        assert!(matches!(err, CoreError::RateLimited { .. }));
    }
}

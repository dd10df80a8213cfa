use domain::governor::PublishingLimit;
use domain::model::{Account, AccountId};
use domain::CoreResult;
use platform::PlatformClient;
use std::collections::HashMap;
use std::sync::Mutex;

/// Caches the authoritative `PublishingLimit` per account, refreshed
/// opportunistically before the first publish of a batch and whenever the
/// platform returns a quota error. `domain::governor::reserve_remote` makes
/// the actual allow/deny decision over whatever snapshot this cache hands
/// back; this struct owns only the I/O and the cache, not the policy.
pub struct GovernorCache {
    cached: Mutex<HashMap<AccountId, PublishingLimit>>,
}

impl GovernorCache {
    pub fn new() -> Self {
        Self {
            cached: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached limit if present, otherwise fetches and caches it.
    pub async fn get_or_refresh(
        &self,
        platform: &dyn PlatformClient,
        account: &Account,
    ) -> CoreResult<PublishingLimit> {
        if let Some(limit) = self.cached.lock().expect("governor cache mutex poisoned").get(&account.id) {
            return Ok(*limit);
        }
        self.refresh(platform, account).await
    }

    /// Unconditionally refetches, for the "whenever the platform returns a
    /// quota error" refresh trigger.
    pub async fn refresh(&self, platform: &dyn PlatformClient, account: &Account) -> CoreResult<PublishingLimit> {
        let limit = platform.publishing_limit(account).await?;
        self.cached
            .lock()
            .expect("governor cache mutex poisoned")
            .insert(account.id, limit);
        Ok(limit)
    }
}

impl Default for GovernorCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::model::AccountId;
    use platform::MockPlatformClient;

    fn account() -> Account {
        Account {
            id: AccountId(1),
            platform_user_id: "pu1".into(),
            handle: "h".into(),
            access_token: "t".into(),
            timezone: chrono_tz::UTC,
            active: true,
        }
    }

    #[tokio::test]
    async fn caches_the_limit_across_repeated_gets() {
        let client = MockPlatformClient::new(1);
        let cache = GovernorCache::new();
        let a = account();
        let first = cache.get_or_refresh(&client, &a).await.unwrap();
        client.set_limit(PublishingLimit {
            used: 99,
            limit: 100,
            window_resets_at: chrono::Utc::now(),
        });
        let second = cache.get_or_refresh(&client, &a).await.unwrap();
        assert_eq!(first.used, second.used);
    }

    #[tokio::test]
    async fn refresh_bypasses_the_cache() {
        let client = MockPlatformClient::new(1);
        let cache = GovernorCache::new();
        let a = account();
        cache.get_or_refresh(&client, &a).await.unwrap();
        client.set_limit(PublishingLimit {
            used: 42,
            limit: 100,
            window_resets_at: chrono::Utc::now(),
        });
        let refreshed = cache.refresh(&client, &a).await.unwrap();
        assert_eq!(refreshed.used, 42);
    }
}

mod http;
mod mock;

pub use http::HttpPlatformClient;
pub use mock::MockPlatformClient;

use async_trait::async_trait;
use domain::governor::PublishingLimit;
use domain::model::Account;
use domain::CoreResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerStatus {
    InProgress,
    Finished,
    Error,
    Expired,
}

/// Typed wrapper over the external graph API. Pure I/O: no retries, no
/// policy decisions — those live in `apps/scheduler`'s FSM driver and in
/// `domain::governor`.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    async fn create_container(
        &self,
        account: &Account,
        media_url: &str,
        caption: Option<&str>,
    ) -> CoreResult<String>;

    async fn container_status(&self, account: &Account, container_id: &str) -> CoreResult<ContainerStatus>;

    async fn publish(&self, account: &Account, container_id: &str) -> CoreResult<String>;

    async fn publishing_limit(&self, account: &Account) -> CoreResult<PublishingLimit>;

    async fn create_carousel_child(&self, account: &Account, item_url: &str) -> CoreResult<String>;

    async fn create_carousel_parent(
        &self,
        account: &Account,
        child_ids: &[String],
        caption: Option<&str>,
    ) -> CoreResult<String>;
}

use super::account_gate::AccountGate;
use super::governor_cache::GovernorCache;
use crate::config::AppConfig;
use crate::metrics::SchedulerTelemetry;
use domain::clock::Clock;
use platform::PlatformClient;
use std::sync::Arc;
use store::Store;

/// Shared, cheaply-cloneable state handed to every per-post worker task: the
/// store, the external client, and cross-cutting concerns (telemetry,
/// concurrency gates) bundled into one struct rather than threading each
/// through every function signature.
#[derive(Clone)]
pub struct WorkerCtx {
    pub cfg: AppConfig,
    pub store: Store,
    pub platform: Arc<dyn PlatformClient>,
    pub governor: Arc<GovernorCache>,
    pub account_gate: Arc<AccountGate>,
    pub telemetry: SchedulerTelemetry,
    pub instance_id: String,
    pub clock: Arc<dyn Clock>,
}

use crate::metrics::SchedulerTelemetry;
use store::Store;

/// Spec §4.6/§5: "a lease watchdog resets rows where `status in (leased,
/// publishing) and locked_at < now - LeaseTTL` back to `scheduled`". Run on
/// the same cadence as the leaser tick, independent of it, so a crashed
/// worker's post becomes re-leasable within `2 x LeaseTTL` regardless of
/// how busy the current tick's dispatch is. The deadline itself was stamped
/// onto each row at lease time (`lease_due_posts`), so no TTL is threaded
/// through here.
pub async fn sweep(store: &Store, telemetry: &SchedulerTelemetry) -> anyhow::Result<()> {
    let n = store.reclaim_expired_leases().await?;
    if n > 0 {
        tracing::info!(reclaimed = n, "watchdog reclaimed expired leases");
        telemetry.leases_reclaimed(n);
    }
    Ok(())
}

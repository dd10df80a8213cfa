use opentelemetry::{
    global,
    metrics::{Counter, Histogram},
};
use std::sync::Arc;

/// One `Inner` behind an `Arc` so the handle is cheaply `Clone`-able into
/// every worker task, counters/histograms built once at startup via the
/// global `opentelemetry` meter.
#[derive(Clone)]
pub struct SchedulerTelemetry {
    inner: Arc<Inner>,
}

struct Inner {
    ticks_total: Counter<u64>,
    tick_errors_total: Counter<u64>,
    posts_leased_total: Counter<u64>,
    posts_posted_total: Counter<u64>,
    posts_failed_total: Counter<u64>,
    posts_retried_total: Counter<u64>,
    posts_cancelled_total: Counter<u64>,
    rate_limited_total: Counter<u64>,
    leases_reclaimed_total: Counter<u64>,

    tick_ms: Histogram<u64>,
    publish_ms: Histogram<u64>,
    platform_call_ms: Histogram<u64>,
}

impl SchedulerTelemetry {
    pub fn new() -> Self {
        let meter = global::meter("scheduler");

        let inner = Inner {
            ticks_total: meter
                .u64_counter("scheduler.ticks_total")
                .with_description("Total leaser ticks")
                .build(),
            tick_errors_total: meter
                .u64_counter("scheduler.tick_errors_total")
                .with_description("Total leaser ticks that errored")
                .build(),
            posts_leased_total: meter
                .u64_counter("scheduler.posts_leased_total")
                .with_description("Total posts leased for publishing")
                .build(),
            posts_posted_total: meter
                .u64_counter("scheduler.posts_posted_total")
                .with_description("Total posts successfully published")
                .build(),
            posts_failed_total: meter
                .u64_counter("scheduler.posts_failed_total")
                .with_description("Total posts that reached a terminal failure")
                .build(),
            posts_retried_total: meter
                .u64_counter("scheduler.posts_retried_total")
                .with_description("Total posts returned to scheduled for retry")
                .build(),
            posts_cancelled_total: meter
                .u64_counter("scheduler.posts_cancelled_total")
                .with_description("Total posts observed cancelled mid-flight")
                .build(),
            rate_limited_total: meter
                .u64_counter("scheduler.rate_limited_total")
                .with_description("Total publish attempts deferred by the rate governor")
                .build(),
            leases_reclaimed_total: meter
                .u64_counter("scheduler.leases_reclaimed_total")
                .with_description("Total leases reclaimed by the watchdog")
                .build(),
            tick_ms: meter
                .u64_histogram("scheduler.tick_ms")
                .with_description("Leaser tick duration in milliseconds")
                .build(),
            publish_ms: meter
                .u64_histogram("scheduler.publish_ms")
                .with_description("Per-post end-to-end publish duration in milliseconds")
                .build(),
            platform_call_ms: meter
                .u64_histogram("scheduler.platform_call_ms")
                .with_description("Individual platform call duration in milliseconds")
                .build(),
        };

        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn tick_ok(&self, ms: u64) {
        self.inner.ticks_total.add(1, &[]);
        self.inner.tick_ms.record(ms, &[]);
    }

    pub fn tick_err(&self, ms: u64) {
        self.inner.ticks_total.add(1, &[]);
        self.inner.tick_errors_total.add(1, &[]);
        self.inner.tick_ms.record(ms, &[]);
    }

    pub fn posts_leased(&self, n: u64) {
        self.inner.posts_leased_total.add(n, &[]);
    }

    pub fn post_posted(&self, ms: u64) {
        self.inner.posts_posted_total.add(1, &[]);
        self.inner.publish_ms.record(ms, &[]);
    }

    pub fn post_failed(&self) {
        self.inner.posts_failed_total.add(1, &[]);
    }

    pub fn post_retried(&self) {
        self.inner.posts_retried_total.add(1, &[]);
    }

    pub fn post_cancelled(&self) {
        self.inner.posts_cancelled_total.add(1, &[]);
    }

    pub fn rate_limited(&self) {
        self.inner.rate_limited_total.add(1, &[]);
    }

    pub fn leases_reclaimed(&self, n: u64) {
        self.inner.leases_reclaimed_total.add(n, &[]);
    }

    pub fn platform_call(&self, ms: u64) {
        self.inner.platform_call_ms.record(ms, &[]);
    }
}

impl Default for SchedulerTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

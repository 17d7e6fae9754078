//! Metrics collection using metrics-rs.

use metrics::{Unit, counter, gauge};
use std::sync::atomic::{AtomicBool, Ordering};

/// Whether metrics have been initialized.
static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

// Metric names as constants for consistency
const VALUES_PUSHED: &str = "tributary_values_pushed";
const PUSHES_REJECTED: &str = "tributary_pushes_rejected";
const FAILURES_DELIVERED: &str = "tributary_failures_delivered";
const RETRIES: &str = "tributary_retries";
const ACTIVE_SUBSCRIPTIONS: &str = "tributary_active_subscriptions";

/// Why a producer refused a push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Nothing was subscribed.
    Inactive,
    /// The producer had already ended.
    Closed,
}

impl RejectReason {
    /// Label value used for the `reason` label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::Closed => "closed",
        }
    }
}

/// Initialize metrics descriptions.
///
/// Call this once at application startup before using any metrics.
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init_metrics() {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    metrics::describe_counter!(
        VALUES_PUSHED,
        Unit::Count,
        "Total number of values accepted by producers"
    );
    metrics::describe_counter!(
        PUSHES_REJECTED,
        Unit::Count,
        "Pushes refused because the channel was inactive or closed"
    );
    metrics::describe_counter!(
        FAILURES_DELIVERED,
        Unit::Count,
        "Failures observed by terminal subscribers"
    );
    metrics::describe_counter!(RETRIES, Unit::Count, "Upstream re-creations by retry");
    metrics::describe_gauge!(
        ACTIVE_SUBSCRIPTIONS,
        Unit::Count,
        "Number of live terminal subscriptions"
    );
}

/// Record a value accepted by a producer.
#[inline]
pub fn record_value_pushed() {
    counter!(VALUES_PUSHED).increment(1);
}

/// Record a refused push.
#[inline]
pub fn record_push_rejected(reason: RejectReason) {
    counter!(PUSHES_REJECTED, "reason" => reason.as_str()).increment(1);
}

/// Record a failure reaching a terminal subscriber.
#[inline]
pub fn record_failure_delivered() {
    counter!(FAILURES_DELIVERED).increment(1);
}

/// Record one upstream re-creation.
#[inline]
pub fn record_retry() {
    counter!(RETRIES).increment(1);
}

/// Record a terminal subscription being opened.
#[inline]
pub fn record_subscription_opened() {
    gauge!(ACTIVE_SUBSCRIPTIONS).increment(1.0);
}

/// Record a terminal subscription being released.
#[inline]
pub fn record_subscription_closed() {
    gauge!(ACTIVE_SUBSCRIPTIONS).decrement(1.0);
}

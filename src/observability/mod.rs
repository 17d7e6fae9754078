//! Observability: metrics recorded by the engine.
//!
//! Tributary records through the `metrics` facade and logs through
//! `tracing`. Neither a recorder nor a subscriber is installed by the crate;
//! the application chooses its own exporter.
//!
//! ## Metrics
//!
//! | Metric | Type | Description |
//! |--------|------|-------------|
//! | `tributary_values_pushed` | Counter | Values accepted by producers |
//! | `tributary_pushes_rejected` | Counter | Pushes refused, labelled by `reason` |
//! | `tributary_failures_delivered` | Counter | Failures observed by terminal subscribers |
//! | `tributary_retries` | Counter | Upstream re-creations by `retry` |
//! | `tributary_active_subscriptions` | Gauge | Live terminal subscriptions |
//!
//! ## Tracing
//!
//! Channels, retries, timeouts and merged inputs log at `debug`; rejected
//! pushes log at `trace`.
//!
//! ## Example
//!
//! ```rust,ignore
//! use tributary::observability::init_metrics;
//!
//! // Describe the metrics once at startup, then install any exporter.
//! init_metrics();
//! ```

mod metrics;

pub use metrics::{
    RejectReason, init_metrics, record_failure_delivered, record_push_rejected, record_retry,
    record_subscription_closed, record_subscription_opened, record_value_pushed,
};

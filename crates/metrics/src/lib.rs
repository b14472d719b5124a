//! Metric names and recorder setup for outpost.
//!
//! The `metrics` facade macros are re-exported so callers only depend on this
//! crate. Without an installed recorder every macro is a no-op.
//!
//! Feature flags:
//! - `prometheus`: install a Prometheus recorder and render `/metrics`

#[cfg(feature = "prometheus")]
mod recorder;

pub use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

#[cfg(feature = "prometheus")]
pub use recorder::{MetricsHandle, init_metrics};

/// Per-request metrics of the `/fetch` endpoint.
pub mod fetch {
    /// Counter labelled by `method` and `status`.
    pub const REQUESTS_TOTAL: &str = "proxy_requests_total";
    /// Histogram of end-to-end handler latency.
    pub const REQUEST_DURATION_SECONDS: &str = "proxy_request_duration_seconds";
    /// Gauge of upstream fetches currently in flight.
    pub const ACTIVE_CONNECTIONS: &str = "proxy_active_connections";
    /// Counter of retry attempts after a transient failure.
    pub const UPSTREAM_RETRIES_TOTAL: &str = "proxy_upstream_retries_total";
}

pub mod cache {
    /// Counter labelled by `operation` (`hit`, `miss`, `store`).
    pub const OPERATIONS_TOTAL: &str = "proxy_cache_operations_total";
}

pub mod rate_limit {
    pub const REJECTED_TOTAL: &str = "proxy_rate_limited_total";
}

pub mod ssrf {
    /// Counter labelled by `reason`.
    pub const REJECTIONS_TOTAL: &str = "proxy_ssrf_rejections_total";
}

/// Latency buckets in seconds, tuned for upstream fetches.
pub const DURATION_BUCKETS: &[f64] = &[
    0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
];

/// Register help text for every metric.
pub fn describe_all() {
    describe_counter!(fetch::REQUESTS_TOTAL, "Fetch requests by method and status");
    describe_histogram!(
        fetch::REQUEST_DURATION_SECONDS,
        metrics::Unit::Seconds,
        "Fetch request duration"
    );
    describe_gauge!(fetch::ACTIVE_CONNECTIONS, "Upstream fetches in flight");
    describe_counter!(
        fetch::UPSTREAM_RETRIES_TOTAL,
        "Upstream attempts retried after a transient failure"
    );
    describe_counter!(cache::OPERATIONS_TOTAL, "Response cache operations");
    describe_counter!(rate_limit::REJECTED_TOTAL, "Requests rejected by the rate limiter");
    describe_counter!(ssrf::REJECTIONS_TOTAL, "Targets rejected by the SSRF guard");
}

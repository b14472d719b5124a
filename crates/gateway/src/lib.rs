//! Gateway: the `/fetch` HTTP surface and the pipeline behind it.
//!
//! A request is authenticated, validated against the SSRF guard, admitted by
//! the per-client rate limiter, answered from the response cache when
//! possible, and otherwise fetched upstream with retries and redirect
//! re-validation.
//!
//! Feature flags:
//! - `metrics`: counters, gauges and histograms via `outpost-metrics`
//! - `prometheus`: the `/metrics` endpoint

pub mod amp;
pub mod auth;
pub mod cache;
pub mod error;
pub mod executor;
pub mod headers;
pub mod pipeline;
pub mod rate_limit;
pub mod request;
pub mod retry;
pub mod server;
pub mod state;

pub use {
    error::{GatewayError, Result},
    executor::{FetchExecutor, FetchOutcome},
    pipeline::{Caller, FetchPipeline},
    request::{FetchMethod, FetchParams, FetchRequest, UaProfile},
    server::{build_gateway_app, start_gateway},
    state::GatewayState,
};

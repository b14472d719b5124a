use std::sync::Arc;

#[cfg(feature = "prometheus")]
use outpost_metrics::MetricsHandle;

use {
    outpost_config::GatewayConfig,
    outpost_network_filter::{GuardPolicy, HostList, Resolve, SsrfGuard},
};

use crate::{
    cache::{CacheSettings, ResponseCache},
    executor::{ExecutorOptions, FetchExecutor},
    pipeline::FetchPipeline,
    rate_limit::{RateLimiter, RateLimits},
    request::RequestDefaults,
    retry::RetryPolicy,
};

pub const APP_NAME: &str = "Outpost Fetch Gateway";

/// Everything the HTTP handlers share, built once from the loaded config.
pub struct GatewayState {
    pub version: &'static str,
    pub config: GatewayConfig,
    pub pipeline: FetchPipeline,
    pub defaults: RequestDefaults,
    #[cfg(feature = "prometheus")]
    pub metrics: Option<MetricsHandle>,
}

impl GatewayState {
    pub fn from_config(
        config: GatewayConfig,
        resolver: Arc<dyn Resolve>,
        #[cfg(feature = "prometheus")] metrics: Option<MetricsHandle>,
    ) -> Arc<Self> {
        let policy = GuardPolicy {
            allowed_hosts: config.allowed_hosts.as_ref().map(HostList::from_entries),
            blocked_hosts: HostList::from_entries(config.effective_blocked_hosts()),
            ssrf_allowlist: config.ssrf_allowlist.clone(),
        };
        let guard = Arc::new(SsrfGuard::new(policy, resolver));

        let limiter = Arc::new(RateLimiter::new(RateLimits {
            per_minute: config.rate_limit.max_requests_per_minute,
            per_hour: config.rate_limit.max_requests_per_hour,
        }));
        let cache = Arc::new(ResponseCache::new(CacheSettings {
            ttl: config.cache.ttl(),
            max_entries: config.cache.max_entries,
            max_entry_bytes: config.cache.max_entry_bytes,
        }));
        let executor = FetchExecutor::new(Arc::clone(&guard), ExecutorOptions {
            retry: RetryPolicy {
                max_attempts: config.fetch.max_attempts,
                backoff_step: config.fetch.backoff_step(),
            },
            connect_timeout: config.fetch.connect_timeout(),
            max_response_bytes: config.max_response_bytes(),
            custom_user_agent: config.custom_user_agent.clone(),
            default_language: config.default_accept_language.clone(),
        });
        let defaults = RequestDefaults {
            timeout: config.fetch.default_timeout(),
            max_redirects: config.fetch.default_max_redirects,
        };

        Arc::new(Self {
            version: env!("CARGO_PKG_VERSION"),
            pipeline: FetchPipeline::new(guard, limiter, cache, executor),
            defaults,
            config,
            #[cfg(feature = "prometheus")]
            metrics,
        })
    }

    pub fn api_key_required(&self) -> bool {
        self.config.api_key.is_some()
    }
}

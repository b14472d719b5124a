//! Request orchestration: guard, rate limit, cache, fetch.

use std::sync::Arc;

use {
    outpost_network_filter::SsrfGuard,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info},
};

use crate::{
    cache::{ResponseCache, fingerprint},
    error::{GatewayError, Result},
    executor::{FetchExecutor, FetchOutcome},
    rate_limit::RateLimiter,
    request::{FetchMethod, FetchRequest},
};

/// Who is asking.
#[derive(Debug, Clone)]
pub struct Caller {
    /// Rate-limit identity, the peer IP.
    pub identity: String,
    /// `Host` header the caller presented, for loop detection.
    pub host_header: Option<String>,
}

pub struct FetchPipeline {
    guard: Arc<SsrfGuard>,
    limiter: Arc<RateLimiter>,
    cache: Arc<ResponseCache>,
    executor: FetchExecutor,
}

impl FetchPipeline {
    pub fn new(
        guard: Arc<SsrfGuard>,
        limiter: Arc<RateLimiter>,
        cache: Arc<ResponseCache>,
        executor: FetchExecutor,
    ) -> Self {
        Self {
            guard,
            limiter,
            cache,
            executor,
        }
    }

    pub fn guard(&self) -> &SsrfGuard {
        &self.guard
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn executor(&self) -> &FetchExecutor {
        &self.executor
    }

    pub async fn run(
        &self,
        request: &FetchRequest,
        caller: &Caller,
        cancel: &CancellationToken,
    ) -> Result<FetchOutcome> {
        let caller_host = caller.host_header.as_deref();
        let target = self.guard.validate(request.url(), caller_host).await?;

        if !self.limiter.admit(&caller.identity) {
            let limits = self.limiter.limits();
            return Err(GatewayError::RateLimited {
                per_minute: limits.per_minute,
                per_hour: limits.per_hour,
            });
        }

        let key = (request.method() == FetchMethod::Get).then(|| {
            fingerprint(
                request,
                &target.url,
                &self.executor.options().default_language,
            )
        });

        if let Some(key) = &key
            && let Some(entry) = self.cache.get(key).await
        {
            debug!(url = %target.url, "serving from cache");
            return Ok(FetchOutcome {
                status: entry.status,
                headers: entry.headers.clone(),
                body: entry.body.clone(),
                from_cache: true,
            });
        }

        let outcome = self
            .executor
            .execute(&target, request, caller_host, cancel)
            .await?;
        info!(
            url = %target.url,
            status = outcome.status.as_u16(),
            bytes = outcome.body.len(),
            "fetched"
        );

        if let Some(key) = key {
            self.cache.store(key, &outcome).await;
        }
        Ok(outcome)
    }
}

//! Upstream fetches: pinned transport, manual redirects, retries, body limits
//! and the AMP fallback.

use std::{sync::Arc, time::Duration};

use {
    axum::http::{
        HeaderMap, StatusCode,
        header::{AUTHORIZATION, CONTENT_TYPE, COOKIE, LOCATION},
    },
    bytes::{Bytes, BytesMut},
    outpost_network_filter::{Error as FilterError, SsrfGuard, ValidatedTarget},
    reqwest::redirect::Policy,
    tokio_util::sync::CancellationToken,
    tracing::{Instrument, debug, debug_span, info},
    url::Url,
};

#[cfg(feature = "metrics")]
use outpost_metrics::{fetch as fetch_metrics, gauge};

use crate::{
    amp::amp_candidates,
    error::{GatewayError, Result},
    headers::{outbound_headers, sanitize_response_headers},
    request::{FetchMethod, FetchRequest},
    retry::{Attempt, RetryPolicy},
};

/// What the HTTP layer renders.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub from_cache: bool,
}

/// Raw upstream answer after redirects, before sanitization.
#[derive(Debug)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// URL that produced this response (last redirect hop).
    pub url: Url,
}

impl Attempt for Result<UpstreamResponse> {
    fn is_transient(&self) -> bool {
        match self {
            Ok(response) => response.status.is_server_error(),
            Err(err) => err.is_retryable(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    pub retry: RetryPolicy,
    pub connect_timeout: Duration,
    pub max_response_bytes: u64,
    pub custom_user_agent: Option<String>,
    pub default_language: String,
}

/// Everything an attempt needs besides the target.
struct FetchPlan<'a> {
    method: FetchMethod,
    headers: HeaderMap,
    body: Option<Bytes>,
    timeout: Duration,
    max_redirects: u8,
    caller_host: Option<&'a str>,
}

/// Keeps the in-flight gauge balanced even when the fetch future is dropped.
struct InFlight;

impl InFlight {
    fn enter() -> Self {
        #[cfg(feature = "metrics")]
        gauge!(fetch_metrics::ACTIVE_CONNECTIONS).increment(1.0);
        Self
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        #[cfg(feature = "metrics")]
        gauge!(fetch_metrics::ACTIVE_CONNECTIONS).decrement(1.0);
    }
}

pub struct FetchExecutor {
    guard: Arc<SsrfGuard>,
    options: ExecutorOptions,
}

impl FetchExecutor {
    pub fn new(guard: Arc<SsrfGuard>, options: ExecutorOptions) -> Self {
        Self { guard, options }
    }

    pub fn options(&self) -> &ExecutorOptions {
        &self.options
    }

    /// Fetch a validated target and return the sanitized outcome.
    pub async fn execute(
        &self,
        target: &ValidatedTarget,
        request: &FetchRequest,
        caller_host: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<FetchOutcome> {
        let plan = FetchPlan {
            method: request.method(),
            headers: outbound_headers(
                request,
                self.options.custom_user_agent.as_deref(),
                &self.options.default_language,
            )?,
            body: request.body().cloned(),
            timeout: request.timeout(),
            max_redirects: request.max_redirects(),
            caller_host,
        };

        let mut upstream = self.fetch_with_retries(target, &plan, cancel).await?;

        if request.try_amp()
            && request.method() == FetchMethod::Get
            && matches!(upstream.status, StatusCode::FORBIDDEN | StatusCode::NOT_FOUND)
        {
            for candidate in amp_candidates(&target.url) {
                match self.try_amp_variant(candidate.clone(), &plan, cancel).await {
                    Ok(variant) if variant.status.as_u16() < 400 => {
                        info!(url = %candidate, status = variant.status.as_u16(), "AMP variant found");
                        upstream = variant;
                        break;
                    },
                    Ok(variant) => {
                        debug!(url = %candidate, status = variant.status.as_u16(), "AMP variant unavailable");
                    },
                    Err(GatewayError::Cancelled) => return Err(GatewayError::Cancelled),
                    Err(err) => {
                        debug!(url = %candidate, error = %err, "AMP variant failed, keeping original response");
                    },
                }
            }
        }

        Ok(FetchOutcome {
            status: upstream.status,
            headers: sanitize_response_headers(&upstream.headers, target.url.path()),
            body: upstream.body,
            from_cache: false,
        })
    }

    /// One AMP candidate, re-validated and fetched with the full retry policy.
    async fn try_amp_variant(
        &self,
        url: Url,
        plan: &FetchPlan<'_>,
        cancel: &CancellationToken,
    ) -> Result<UpstreamResponse> {
        let target = self.guard.validate_url(url, plan.caller_host).await?;
        self.fetch_with_retries(&target, plan, cancel).await
    }

    async fn fetch_with_retries(
        &self,
        target: &ValidatedTarget,
        plan: &FetchPlan<'_>,
        cancel: &CancellationToken,
    ) -> Result<UpstreamResponse> {
        let _in_flight = InFlight::enter();
        self.options
            .retry
            .run(cancel, move |attempt| {
                self.fetch_following_redirects(target, plan)
                    .instrument(debug_span!("attempt", attempt, url = %target.url))
            })
            .await?
    }

    /// A single attempt: send, follow redirects, read the body.
    async fn fetch_following_redirects(
        &self,
        initial: &ValidatedTarget,
        plan: &FetchPlan<'_>,
    ) -> Result<UpstreamResponse> {
        let mut target = initial.clone();
        let mut method = plan.method;
        let mut headers = plan.headers.clone();
        let mut body = plan.body.clone();
        let mut hops: u8 = 0;

        loop {
            let response = self
                .send(&target, method, &headers, body.clone(), plan.timeout)
                .await?;
            let status = response.status();

            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let Some(location) = location.filter(|_| is_redirect(status)) else {
                debug!(status = status.as_u16(), url = %target.url, "upstream responded");
                return self.read_body(response, method, target.url).await;
            };

            if hops >= plan.max_redirects {
                return Err(GatewayError::TooManyRedirects {
                    max: plan.max_redirects,
                });
            }
            let next = target
                .url
                .join(&location)
                .map_err(|e| FilterError::invalid_url(location.as_str(), e.to_string()))?;
            let next = self.guard.validate_url(next, plan.caller_host).await?;

            if next.host != target.host {
                headers.remove(AUTHORIZATION);
                headers.remove(COOKIE);
            }
            if status == StatusCode::SEE_OTHER
                || (method == FetchMethod::Post
                    && matches!(status, StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND))
            {
                method = FetchMethod::Get;
                body = None;
                headers.remove(CONTENT_TYPE);
            }

            debug!(from = %target.url, to = %next.url, status = status.as_u16(), "following redirect");
            hops += 1;
            target = next;
        }
    }

    async fn send(
        &self,
        target: &ValidatedTarget,
        method: FetchMethod,
        headers: &HeaderMap,
        body: Option<Bytes>,
        timeout: Duration,
    ) -> Result<reqwest::Response> {
        let client = self.client_for(target, timeout)?;
        let mut request = client
            .request(method.as_http(), target.url.clone())
            .headers(headers.clone());
        if let Some(body) = body {
            request = request.body(body);
        }
        request
            .send()
            .await
            .map_err(|e| GatewayError::upstream(format!("{method} {}", target.url), e))
    }

    /// A client that never follows redirects and connects only to the
    /// addresses the guard vetted.
    fn client_for(&self, target: &ValidatedTarget, timeout: Duration) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder()
            .redirect(Policy::none())
            .no_proxy()
            .connect_timeout(self.options.connect_timeout)
            .timeout(timeout);
        if let Some(domain) = target.domain() {
            builder = builder.resolve_to_addrs(domain, &target.addrs);
        }
        builder
            .build()
            .map_err(|e| GatewayError::upstream("building HTTP client", e))
    }

    async fn read_body(
        &self,
        mut response: reqwest::Response,
        method: FetchMethod,
        url: Url,
    ) -> Result<UpstreamResponse> {
        let limit = self.options.max_response_bytes;
        if method != FetchMethod::Head
            && let Some(declared) = response.content_length()
            && declared > limit
        {
            return Err(GatewayError::ResponseTooLarge {
                size: declared,
                limit,
            });
        }

        let status = response.status();
        let headers = response.headers().clone();
        let mut body = BytesMut::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| GatewayError::upstream(format!("reading body from {url}"), e))?
        {
            let size = (body.len() + chunk.len()) as u64;
            if size > limit {
                return Err(GatewayError::ResponseTooLarge { size, limit });
            }
            body.extend_from_slice(&chunk);
        }

        Ok(UpstreamResponse {
            status,
            headers,
            body: body.freeze(),
            url,
        })
    }
}

fn is_redirect(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

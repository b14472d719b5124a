use std::{
    net::SocketAddr,
    sync::Arc,
    time::{Duration, Instant},
};

use {
    axum::{
        Json, Router,
        body::{Body, Bytes},
        extract::{ConnectInfo, Query, State, rejection::QueryRejection},
        http::{HeaderMap, HeaderValue, header},
        response::{Html, IntoResponse, Response},
        routing::get,
    },
    outpost_config::GatewayConfig,
    outpost_network_filter::SystemResolver,
    tokio_util::sync::CancellationToken,
    tower_http::{
        cors::{Any, CorsLayer},
        trace::TraceLayer,
    },
    tracing::{Instrument, info, info_span, warn},
    uuid::Uuid,
};

#[cfg(feature = "metrics")]
use outpost_metrics::{counter, fetch as fetch_metrics, histogram};

#[cfg(feature = "prometheus")]
use outpost_metrics::MetricsHandle;

use crate::{
    auth::{ApiKeyParam, check_api_key},
    error::GatewayError,
    executor::FetchOutcome,
    pipeline::Caller,
    request::FetchParams,
    state::{APP_NAME, GatewayState},
};

/// Idle rate-limit identities are swept on this interval.
const SWEEP_INTERVAL: Duration = Duration::from_secs(300);

pub const CACHE_STATUS_HEADER: &str = "x-cache";

// ── Server startup ───────────────────────────────────────────────────────────

/// Build the gateway router (shared between production startup and tests).
pub fn build_gateway_app(state: Arc<GatewayState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let router = Router::new()
        .route("/", get(index_handler))
        .route("/healthz", get(health_handler))
        .route("/security-info", get(security_info_handler))
        .route("/robots.txt", get(robots_handler))
        .route("/fetch", get(fetch_handler).post(fetch_handler));

    #[cfg(feature = "prometheus")]
    let router = router.route("/metrics", get(metrics_handler));

    router
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the gateway HTTP server and run until shutdown.
pub async fn start_gateway(
    config: GatewayConfig,
    #[cfg(feature = "prometheus")] metrics: Option<MetricsHandle>,
) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;
    let state = GatewayState::from_config(
        config,
        Arc::new(SystemResolver),
        #[cfg(feature = "prometheus")]
        metrics,
    );
    let app = build_gateway_app(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Startup banner.
    let limits = state.pipeline.limiter().limits();
    let lines = [
        format!("{APP_NAME} v{}", state.version),
        format!("listening on {addr}"),
        format!(
            "api key {}",
            if state.api_key_required() {
                "required"
            } else {
                "not required"
            }
        ),
        format!("rate limit {}/min, {}/hour", limits.per_minute, limits.per_hour),
    ];
    let width = lines.iter().map(|l| l.len()).max().unwrap_or(0) + 4;
    info!("┌{}┐", "─".repeat(width));
    for line in &lines {
        info!("│  {:<w$}│", line, w = width - 2);
    }
    info!("└{}┘", "─".repeat(width));
    if !state.api_key_required() {
        warn!("no API key configured, /fetch is open to anyone who can reach it");
    }

    let sweep_state = Arc::clone(&state);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            sweep_state.pipeline.limiter().sweep_idle(Instant::now());
        }
    });

    // Run the server with ConnectInfo for remote IP extraction.
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;
    info!("gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

// ── Fetch ────────────────────────────────────────────────────────────────────

async fn fetch_handler(
    State(state): State<Arc<GatewayState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(auth): Query<ApiKeyParam>,
    params: Result<Query<FetchParams>, QueryRejection>,
    body: Bytes,
) -> Response {
    let request_id: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();
    let span = info_span!("fetch", %request_id, client = %peer.ip());

    async move {
        if !check_api_key(state.config.api_key.as_ref(), &headers, auth.api_key.as_deref()) {
            warn!("rejected request with missing or invalid API key");
            return GatewayError::Unauthorized.into_response();
        }

        let Query(params) = match params {
            Ok(params) => params,
            Err(rejection) => {
                return GatewayError::invalid_request(rejection.body_text()).into_response();
            },
        };
        let method = params.method;
        let started = Instant::now();

        let request = match params.into_request(&state.defaults, &headers, body) {
            Ok(request) => request,
            Err(err) => return err.into_response(),
        };
        let caller = Caller {
            identity: peer.ip().to_string(),
            host_header: headers
                .get(header::HOST)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        };

        let cancel = CancellationToken::new();
        let _cancel_on_drop = cancel.clone().drop_guard();
        let result = state.pipeline.run(&request, &caller, &cancel).await;

        let status = match &result {
            Ok(outcome) => outcome.status,
            Err(err) => err.status(),
        };
        let elapsed = started.elapsed();
        #[cfg(feature = "metrics")]
        {
            counter!(
                fetch_metrics::REQUESTS_TOTAL,
                "method" => method.as_str(),
                "status" => status.as_u16().to_string()
            )
            .increment(1);
            histogram!(fetch_metrics::REQUEST_DURATION_SECONDS).record(elapsed.as_secs_f64());
        }

        match result {
            Ok(outcome) => {
                info!(
                    %method,
                    url = request.url(),
                    status = status.as_u16(),
                    cached = outcome.from_cache,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "fetch complete"
                );
                render_outcome(outcome)
            },
            Err(err) => {
                info!(
                    %method,
                    url = request.url(),
                    status = status.as_u16(),
                    error = %err,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "fetch failed"
                );
                err.into_response()
            },
        }
    }
    .instrument(span)
    .await
}

fn render_outcome(outcome: FetchOutcome) -> Response {
    let FetchOutcome {
        status,
        mut headers,
        body,
        from_cache,
    } = outcome;
    headers.insert(
        CACHE_STATUS_HEADER,
        HeaderValue::from_static(if from_cache { "HIT" } else { "MISS" }),
    );
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

// ── Informational endpoints ──────────────────────────────────────────────────

async fn health_handler() -> &'static str {
    "ok"
}

async fn robots_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        "User-agent: *\nAllow: /\n",
    )
}

async fn security_info_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    let config = &state.config;
    Json(serde_json::json!({
        "api_key_required": state.api_key_required(),
        "allowed_hosts": config.allowed_hosts,
        "blocked_hosts_count": state.pipeline.guard().policy().blocked_hosts.len(),
        "rate_limits": {
            "max_requests_per_minute": config.rate_limit.max_requests_per_minute,
            "max_requests_per_hour": config.rate_limit.max_requests_per_hour,
            "max_response_size_mb": config.max_response_size_mb,
        },
        "user_agent": config.custom_user_agent.as_deref().unwrap_or("rotating browser profiles"),
        "cache_size": state.pipeline.cache().entry_count(),
        "version": state.version,
    }))
}

async fn index_handler(State(state): State<Arc<GatewayState>>) -> Html<String> {
    let config = &state.config;
    let allowed = config
        .allowed_hosts
        .as_ref()
        .map_or_else(|| "any public host".to_string(), |hosts| hosts.join(", "));
    Html(format!(
        r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>{APP_NAME}</title></head>
<body>
<h1>{APP_NAME}</h1>
<p>Version {version}</p>
<h2>Usage</h2>
<pre>GET /fetch?url=https://example.com/</pre>
<ul>
<li><code>url</code>: absolute http(s) URL (required)</li>
<li><code>method</code>: GET, HEAD or POST (default GET)</li>
<li><code>ua</code>: desktop or mobile (default desktop)</li>
<li><code>timeout</code>: seconds, 1 to 60 (default {timeout})</li>
<li><code>max_redirects</code>: 0 to 10 (default {redirects})</li>
<li><code>try_amp</code>: retry 403/404 pages through their AMP variant</li>
<li><code>accept</code>, <code>lang</code>: override Accept and Accept-Language</li>
<li><code>forward_headers</code>: comma-separated caller headers to pass on</li>
<li><code>api_key</code>: or the <code>x-api-key</code> header</li>
</ul>
<h2>Security</h2>
<ul>
<li>API key: {api_key}</li>
<li>Allowed hosts: {allowed}</li>
<li>Blocked hosts: {blocked}</li>
<li>Rate limit: {per_minute}/min, {per_hour}/hour per client</li>
<li>Max response size: {max_mb} MB</li>
<li>Private, loopback and link-local targets are always refused.</li>
</ul>
</body>
</html>
"#,
        version = state.version,
        timeout = state.defaults.timeout.as_secs(),
        redirects = state.defaults.max_redirects,
        api_key = if state.api_key_required() {
            "required"
        } else {
            "not required"
        },
        blocked = state.pipeline.guard().policy().blocked_hosts.len(),
        per_minute = config.rate_limit.max_requests_per_minute,
        per_hour = config.rate_limit.max_requests_per_hour,
        max_mb = config.max_response_size_mb,
    ))
}

#[cfg(feature = "prometheus")]
async fn metrics_handler(State(state): State<Arc<GatewayState>>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (axum::http::StatusCode::NOT_FOUND, "metrics disabled").into_response(),
    }
}

use {
    axum::{
        Json,
        http::StatusCode,
        response::{IntoResponse, Response},
    },
    serde::Serialize,
    thiserror::Error,
};

use outpost_network_filter::Error as FilterError;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Rejected(#[from] FilterError),

    #[error("Rate limit exceeded. Max {per_minute}/min or {per_hour}/hour")]
    RateLimited { per_minute: u32, per_hour: u32 },

    #[error("upstream error: {context}: {source}")]
    Upstream {
        context: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("upstream error: too many redirects (max {max})")]
    TooManyRedirects { max: u8 },

    #[error("response too large: {size} bytes (max {limit} bytes)")]
    ResponseTooLarge { size: u64, limit: u64 },

    #[error("missing or invalid API key")]
    Unauthorized,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("request cancelled")]
    Cancelled,
}

impl GatewayError {
    #[must_use]
    pub fn upstream(context: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Upstream {
            context: context.into(),
            source,
        }
    }

    #[must_use]
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Rejected(err) => match err {
                FilterError::HostNotAllowed { .. } => StatusCode::FORBIDDEN,
                FilterError::DnsResolutionFailed { .. } => StatusCode::BAD_GATEWAY,
                FilterError::InvalidUrl { .. }
                | FilterError::LoopDetected { .. }
                | FilterError::PrivateIpBlocked { .. } => StatusCode::BAD_REQUEST,
            },
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Upstream { .. } | Self::TooManyRedirects { .. } => StatusCode::BAD_GATEWAY,
            Self::ResponseTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Machine-readable code used in error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Rejected(err) => err.kind(),
            Self::RateLimited { .. } => "rate_limited",
            Self::Upstream { .. } | Self::TooManyRedirects { .. } => "upstream_error",
            Self::ResponseTooLarge { .. } => "response_too_large",
            Self::Unauthorized => "unauthorized",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Cancelled => "cancelled",
        }
    }

    /// Transport failures worth another attempt. Validation failures never are.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Upstream { source, .. } => {
                source.is_connect()
                    || source.is_timeout()
                    || source.is_body()
                    || source.is_decode()
                    || source.is_request()
            },
            _ => false,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.code(),
            message: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;

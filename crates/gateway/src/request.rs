//! Inbound `/fetch` parameters and the validated [`FetchRequest`].

use std::time::Duration;

use {
    axum::http::{HeaderMap, HeaderValue, Method, header::CONTENT_TYPE},
    bytes::Bytes,
    serde::{Deserialize, Deserializer, de},
};

use crate::{
    error::{GatewayError, Result},
    headers::forwarded_headers,
};

pub const DESKTOP_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                              (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";
pub const MOBILE_UA: &str = "Mozilla/5.0 (Linux; Android 14; Pixel 8 Pro) AppleWebKit/537.36 \
                             (KHTML, like Gecko) Chrome/124.0.0.0 Mobile Safari/537.36";

pub const MIN_TIMEOUT_SECS: f64 = 1.0;
pub const MAX_TIMEOUT_SECS: f64 = 60.0;
pub const MAX_REDIRECTS: u8 = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FetchMethod {
    #[default]
    Get,
    Head,
    Post,
}

impl FetchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
        }
    }

    pub fn as_http(&self) -> Method {
        match self {
            Self::Get => Method::GET,
            Self::Head => Method::HEAD,
            Self::Post => Method::POST,
        }
    }
}

impl std::fmt::Display for FetchMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Browser profile whose user agent is presented upstream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UaProfile {
    #[default]
    Desktop,
    Mobile,
}

impl UaProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Desktop => "desktop",
            Self::Mobile => "mobile",
        }
    }

    pub fn template(&self) -> &'static str {
        match self {
            Self::Desktop => DESKTOP_UA,
            Self::Mobile => MOBILE_UA,
        }
    }
}

/// Raw query parameters of `/fetch`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FetchParams {
    pub url: String,
    #[serde(default)]
    pub method: FetchMethod,
    #[serde(default)]
    pub ua: UaProfile,
    /// Seconds.
    pub timeout: Option<f64>,
    pub max_redirects: Option<u32>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub try_amp: bool,
    pub accept: Option<String>,
    pub lang: Option<String>,
    /// Comma-separated header names to copy from the inbound request.
    pub forward_headers: Option<String>,
}

/// Defaults for parameters the caller left out.
#[derive(Debug, Clone, Copy)]
pub struct RequestDefaults {
    pub timeout: Duration,
    pub max_redirects: u8,
}

impl Default for RequestDefaults {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            max_redirects: 5,
        }
    }
}

impl FetchParams {
    /// Validate ranges and collect the forwarded headers and body.
    pub fn into_request(
        self,
        defaults: &RequestDefaults,
        inbound: &HeaderMap,
        body: Bytes,
    ) -> Result<FetchRequest> {
        let timeout_secs = self.timeout.unwrap_or(defaults.timeout.as_secs_f64());
        if !(MIN_TIMEOUT_SECS..=MAX_TIMEOUT_SECS).contains(&timeout_secs) {
            return Err(GatewayError::invalid_request(format!(
                "timeout must be between {MIN_TIMEOUT_SECS} and {MAX_TIMEOUT_SECS} seconds"
            )));
        }

        let max_redirects = match self.max_redirects {
            Some(n) => u8::try_from(n)
                .ok()
                .filter(|n| *n <= MAX_REDIRECTS)
                .ok_or_else(|| {
                    GatewayError::invalid_request(format!(
                        "max_redirects must be between 0 and {MAX_REDIRECTS}"
                    ))
                })?,
            None => defaults.max_redirects,
        };

        let accept = header_param("accept", self.accept)?;
        let language = header_param("lang", self.lang)?;

        let mut forwarded = match &self.forward_headers {
            Some(names) => forwarded_headers(names.split(','), inbound),
            None => HeaderMap::new(),
        };

        let body = match self.method {
            FetchMethod::Post => {
                if let Some(content_type) = inbound.get(CONTENT_TYPE) {
                    forwarded.insert(CONTENT_TYPE, content_type.clone());
                }
                Some(body)
            },
            FetchMethod::Get | FetchMethod::Head => None,
        };

        Ok(FetchRequest {
            url: self.url,
            method: self.method,
            ua: self.ua,
            timeout: Duration::from_secs_f64(timeout_secs),
            max_redirects,
            try_amp: self.try_amp,
            accept,
            language,
            forwarded_headers: forwarded,
            body,
        })
    }
}

fn header_param(name: &str, value: Option<String>) -> Result<Option<String>> {
    let Some(value) = value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    HeaderValue::from_str(&value)
        .map_err(|_| GatewayError::invalid_request(format!("{name} is not a valid header value")))?;
    Ok(Some(value))
}

fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<bool, D::Error> {
    let raw = String::deserialize(deserializer)?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" | "" => Ok(false),
        other => Err(de::Error::custom(format!("invalid boolean '{other}'"))),
    }
}

/// A validated fetch request. Only `POST` carries a body.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    url: String,
    method: FetchMethod,
    ua: UaProfile,
    timeout: Duration,
    max_redirects: u8,
    try_amp: bool,
    accept: Option<String>,
    language: Option<String>,
    forwarded_headers: HeaderMap,
    body: Option<Bytes>,
}

impl FetchRequest {
    /// A plain GET with default settings.
    pub fn new(url: impl Into<String>) -> Self {
        let defaults = RequestDefaults::default();
        Self {
            url: url.into(),
            method: FetchMethod::Get,
            ua: UaProfile::Desktop,
            timeout: defaults.timeout,
            max_redirects: defaults.max_redirects,
            try_amp: false,
            accept: None,
            language: None,
            forwarded_headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn method(&self) -> FetchMethod {
        self.method
    }

    pub fn ua(&self) -> UaProfile {
        self.ua
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn max_redirects(&self) -> u8 {
        self.max_redirects
    }

    pub fn try_amp(&self) -> bool {
        self.try_amp
    }

    pub fn accept(&self) -> Option<&str> {
        self.accept.as_deref()
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    pub fn forwarded_headers(&self) -> &HeaderMap {
        &self.forwarded_headers
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }
}

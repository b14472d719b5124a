use std::net::IpAddr;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("host not allowed: {host}")]
    HostNotAllowed { host: String },

    #[error("refusing to fetch {netloc}: target is this gateway")]
    LoopDetected { netloc: String },

    #[error("DNS resolution failed for {host}: {reason}")]
    DnsResolutionFailed { host: String, reason: String },

    #[error("SSRF blocked: {host} resolves to {ip} ({reason})")]
    PrivateIpBlocked {
        host: String,
        ip: IpAddr,
        reason: &'static str,
    },
}

impl Error {
    #[must_use]
    pub fn invalid_url(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn dns(host: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DnsResolutionFailed {
            host: host.into(),
            reason: reason.into(),
        }
    }

    /// Stable label used for logs and the rejection counter.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidUrl { .. } => "invalid_url",
            Self::HostNotAllowed { .. } => "host_not_allowed",
            Self::LoopDetected { .. } => "loop_detected",
            Self::DnsResolutionFailed { .. } => "dns_resolution_failed",
            Self::PrivateIpBlocked { .. } => "private_ip_blocked",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

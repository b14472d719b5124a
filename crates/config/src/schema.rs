use std::time::Duration;

use {
    ipnet::IpNet,
    secrecy::Secret,
    serde::Deserialize,
};

use crate::{Error, Result};

/// Hosts that are always denied, whatever the configuration says.
pub const DEFAULT_BLOCKED_HOSTS: &[&str] = &[
    "169.254.169.254",
    "metadata.google.internal",
    "metadata.azure.com",
    "localhost",
    "127.0.0.1",
    "::1",
    "0.0.0.0",
    "10.0.0.1",
    "192.168.1.1",
];

pub const DEFAULT_ACCEPT_LANGUAGE: &str = "es-ES,es;q=0.9,en;q=0.8";

/// Upper bound for the per-request timeout, in seconds.
pub const MAX_TIMEOUT_SECS: u64 = 60;
pub const MAX_REDIRECTS: u8 = 10;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub server: ServerConfig,
    /// When set, `/fetch` requires this key.
    pub api_key: Option<Secret<String>>,
    /// When set, only these host patterns may be fetched.
    pub allowed_hosts: Option<Vec<String>>,
    /// Extra denied host patterns, merged with [`DEFAULT_BLOCKED_HOSTS`].
    pub blocked_hosts: Vec<String>,
    /// Address ranges exempt from the private-address rules.
    pub ssrf_allowlist: Vec<IpNet>,
    pub rate_limit: RateLimitConfig,
    pub max_response_size_mb: u64,
    /// Prefix wrapped around the browser user agent templates.
    pub custom_user_agent: Option<String>,
    pub default_accept_language: String,
    pub cache: CacheConfig,
    pub fetch: FetchConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            api_key: None,
            allowed_hosts: None,
            blocked_hosts: Vec::new(),
            ssrf_allowlist: Vec::new(),
            rate_limit: RateLimitConfig::default(),
            max_response_size_mb: 10,
            custom_user_agent: None,
            default_accept_language: DEFAULT_ACCEPT_LANGUAGE.to_string(),
            cache: CacheConfig::default(),
            fetch: FetchConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_requests_per_minute: u32,
    pub max_requests_per_hour: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests_per_minute: 60,
            max_requests_per_hour: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub max_entries: u64,
    /// Bodies of this size or larger are never cached.
    pub max_entry_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 120,
            max_entries: 128,
            max_entry_bytes: 1024 * 1024,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub default_timeout_secs: u64,
    pub default_max_redirects: u8,
    pub max_attempts: u32,
    pub backoff_step_ms: u64,
    pub connect_timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: 15,
            default_max_redirects: 5,
            max_attempts: 3,
            backoff_step_ms: 500,
            connect_timeout_secs: 10,
        }
    }
}

impl FetchConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }

    pub fn backoff_step(&self) -> Duration {
        Duration::from_millis(self.backoff_step_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl GatewayConfig {
    /// Seed deny list plus configured entries, deduplicated case-insensitively.
    pub fn effective_blocked_hosts(&self) -> Vec<String> {
        let mut hosts: Vec<String> = Vec::new();
        let entries = DEFAULT_BLOCKED_HOSTS
            .iter()
            .copied()
            .chain(self.blocked_hosts.iter().map(String::as_str));
        for entry in entries {
            let entry = entry.trim().to_ascii_lowercase();
            if !entry.is_empty() && !hosts.contains(&entry) {
                hosts.push(entry);
            }
        }
        hosts
    }

    pub fn max_response_bytes(&self) -> u64 {
        self.max_response_size_mb.saturating_mul(1024 * 1024)
    }

    pub fn validate(&self) -> Result<()> {
        if self.rate_limit.max_requests_per_minute == 0 {
            return Err(Error::invalid("rate_limit.max_requests_per_minute must be > 0"));
        }
        if self.rate_limit.max_requests_per_hour == 0 {
            return Err(Error::invalid("rate_limit.max_requests_per_hour must be > 0"));
        }
        if self.max_response_size_mb == 0 {
            return Err(Error::invalid("max_response_size_mb must be > 0"));
        }
        if self.cache.max_entries == 0 || self.cache.max_entry_bytes == 0 {
            return Err(Error::invalid("cache.max_entries and cache.max_entry_bytes must be > 0"));
        }
        if self.cache.ttl_secs == 0 {
            return Err(Error::invalid("cache.ttl_secs must be > 0"));
        }
        if self.fetch.max_attempts == 0 {
            return Err(Error::invalid("fetch.max_attempts must be >= 1"));
        }
        if !(1..=MAX_TIMEOUT_SECS).contains(&self.fetch.default_timeout_secs) {
            return Err(Error::invalid(format!(
                "fetch.default_timeout_secs must be between 1 and {MAX_TIMEOUT_SECS}"
            )));
        }
        if self.fetch.default_max_redirects > MAX_REDIRECTS {
            return Err(Error::invalid(format!(
                "fetch.default_max_redirects must be at most {MAX_REDIRECTS}"
            )));
        }
        if self.fetch.connect_timeout_secs == 0 {
            return Err(Error::invalid("fetch.connect_timeout_secs must be > 0"));
        }
        if self.default_accept_language.trim().is_empty() {
            return Err(Error::invalid("default_accept_language must not be empty"));
        }
        Ok(())
    }
}

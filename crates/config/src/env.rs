//! Environment variable overrides.
//!
//! Variable names match the ones operators already deploy with
//! (`API_KEY`, `ALLOWED_HOSTS`, ...). Empty values are ignored.

use std::str::FromStr;

use {secrecy::Secret, tracing::debug};

use crate::{Error, GatewayConfig, Result};

pub const API_KEY: &str = "API_KEY";
pub const ALLOWED_HOSTS: &str = "ALLOWED_HOSTS";
pub const BLOCKED_HOSTS: &str = "BLOCKED_HOSTS";
pub const MAX_REQUESTS_PER_MINUTE: &str = "MAX_REQUESTS_PER_MINUTE";
pub const MAX_REQUESTS_PER_HOUR: &str = "MAX_REQUESTS_PER_HOUR";
pub const MAX_RESPONSE_SIZE_MB: &str = "MAX_RESPONSE_SIZE_MB";
pub const CUSTOM_USER_AGENT: &str = "CUSTOM_USER_AGENT";
pub const PORT: &str = "PORT";

/// Placeholder user agent that some deployments ship with; treated as unset.
const PLACEHOLDER_USER_AGENT: &str = "AzureProxyService/1.0";

impl GatewayConfig {
    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary lookup.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(key) = get(API_KEY) {
            debug!(var = API_KEY, "override from environment");
            self.api_key = Some(Secret::new(key.trim().to_string()));
        }
        if let Some(hosts) = get(ALLOWED_HOSTS) {
            debug!(var = ALLOWED_HOSTS, "override from environment");
            self.allowed_hosts = Some(split_list(&hosts));
        }
        if let Some(hosts) = get(BLOCKED_HOSTS) {
            debug!(var = BLOCKED_HOSTS, "merging from environment");
            for host in split_list(&hosts) {
                if !self.blocked_hosts.contains(&host) {
                    self.blocked_hosts.push(host);
                }
            }
        }
        if let Some(v) = get(MAX_REQUESTS_PER_MINUTE) {
            self.rate_limit.max_requests_per_minute = parse_var(MAX_REQUESTS_PER_MINUTE, &v)?;
        }
        if let Some(v) = get(MAX_REQUESTS_PER_HOUR) {
            self.rate_limit.max_requests_per_hour = parse_var(MAX_REQUESTS_PER_HOUR, &v)?;
        }
        if let Some(v) = get(MAX_RESPONSE_SIZE_MB) {
            self.max_response_size_mb = parse_var(MAX_RESPONSE_SIZE_MB, &v)?;
        }
        if let Some(ua) = get(CUSTOM_USER_AGENT) {
            let ua = ua.trim().to_string();
            self.custom_user_agent = (ua != PLACEHOLDER_USER_AGENT).then_some(ua);
        }
        if let Some(v) = get(PORT) {
            self.server.port = parse_var(PORT, &v)?;
        }
        Ok(())
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_var<T: FromStr>(var: &'static str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| Error::InvalidEnv {
        var,
        value: value.to_string(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use {super::*, secrecy::ExposeSecret, std::collections::HashMap};

    fn apply(vars: &[(&str, &str)]) -> Result<GatewayConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let mut cfg = GatewayConfig::default();
        cfg.apply_overrides_from(|name| vars.get(name).cloned())?;
        Ok(cfg)
    }

    #[test]
    fn no_vars_keeps_defaults() {
        let cfg = apply(&[]).unwrap();
        assert!(cfg.api_key.is_none());
        assert!(cfg.allowed_hosts.is_none());
        assert!(cfg.blocked_hosts.is_empty());
    }

    #[test]
    fn reads_all_variables() {
        let cfg = apply(&[
            (API_KEY, "abc123"),
            (ALLOWED_HOSTS, "example.com, *.example.org ,"),
            (BLOCKED_HOSTS, "evil.test"),
            (MAX_REQUESTS_PER_MINUTE, "10"),
            (MAX_REQUESTS_PER_HOUR, "100"),
            (MAX_RESPONSE_SIZE_MB, "2"),
            (CUSTOM_USER_AGENT, "MyBot/2.0"),
            (PORT, "8000"),
        ])
        .unwrap();
        assert_eq!(cfg.api_key.unwrap().expose_secret(), "abc123");
        assert_eq!(
            cfg.allowed_hosts.unwrap(),
            vec!["example.com".to_string(), "*.example.org".to_string()]
        );
        assert_eq!(cfg.blocked_hosts, vec!["evil.test".to_string()]);
        assert_eq!(cfg.rate_limit.max_requests_per_minute, 10);
        assert_eq!(cfg.rate_limit.max_requests_per_hour, 100);
        assert_eq!(cfg.max_response_size_mb, 2);
        assert_eq!(cfg.custom_user_agent.as_deref(), Some("MyBot/2.0"));
        assert_eq!(cfg.server.port, 8000);
    }

    #[test]
    fn blocked_hosts_merge_with_seed() {
        let cfg = apply(&[(BLOCKED_HOSTS, "evil.test,other.test")]).unwrap();
        let effective = cfg.effective_blocked_hosts();
        assert!(effective.contains(&"metadata.google.internal".to_string()));
        assert!(effective.contains(&"evil.test".to_string()));
        assert!(effective.contains(&"other.test".to_string()));
    }

    #[test]
    fn placeholder_user_agent_is_ignored() {
        let cfg = apply(&[(CUSTOM_USER_AGENT, "AzureProxyService/1.0")]).unwrap();
        assert!(cfg.custom_user_agent.is_none());
    }

    #[test]
    fn empty_values_are_ignored() {
        let cfg = apply(&[(API_KEY, ""), (ALLOWED_HOSTS, "  ")]).unwrap();
        assert!(cfg.api_key.is_none());
        assert!(cfg.allowed_hosts.is_none());
    }

    #[test]
    fn bad_number_names_variable() {
        let err = apply(&[(MAX_REQUESTS_PER_MINUTE, "lots")]).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidEnv {
                var: MAX_REQUESTS_PER_MINUTE,
                ..
            }
        ));
        assert!(err.to_string().contains("lots"));
    }
}

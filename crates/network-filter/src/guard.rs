//! SSRF guard: turns a caller-supplied URL into a [`ValidatedTarget`].
//!
//! Checks run cheapest-first: URL shape, host lists and loop protection are
//! pure string checks, DNS resolution and address classification come last.

use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

use {
    ipnet::IpNet,
    tracing::{debug, instrument},
    url::{Host, Url},
};

#[cfg(feature = "metrics")]
use outpost_metrics::{counter, ssrf as ssrf_metrics};

use crate::{
    Error, HostList, Result, ValidatedTarget,
    ip::classify_with_allowlist,
    resolve::Resolve,
    types::{netloc, normalize_host},
};

/// Host and address rules applied to every target.
#[derive(Debug, Clone, Default)]
pub struct GuardPolicy {
    /// When set, only matching hosts may be fetched.
    pub allowed_hosts: Option<HostList>,
    pub blocked_hosts: HostList,
    /// Address ranges exempt from the generic private-address rules.
    pub ssrf_allowlist: Vec<IpNet>,
}

pub struct SsrfGuard {
    policy: GuardPolicy,
    resolver: Arc<dyn Resolve>,
}

impl SsrfGuard {
    pub fn new(policy: GuardPolicy, resolver: Arc<dyn Resolve>) -> Self {
        Self { policy, resolver }
    }

    pub fn policy(&self) -> &GuardPolicy {
        &self.policy
    }

    /// Validate a raw target URL. `caller_host` is the `Host` header the
    /// caller used to reach this gateway.
    pub async fn validate(&self, raw: &str, caller_host: Option<&str>) -> Result<ValidatedTarget> {
        let url = match parse_target(raw) {
            Ok(url) => url,
            Err(err) => {
                record_rejection(&err);
                return Err(err);
            },
        };
        self.validate_url(url, caller_host).await
    }

    /// Validate an already parsed URL (redirect hops, AMP variants).
    #[instrument(level = "debug", skip(self, url), fields(url = %url))]
    pub async fn validate_url(&self, url: Url, caller_host: Option<&str>) -> Result<ValidatedTarget> {
        let result = self.check(url, caller_host).await;
        if let Err(err) = &result {
            record_rejection(err);
        }
        result
    }

    async fn check(&self, url: Url, caller_host: Option<&str>) -> Result<ValidatedTarget> {
        check_shape(&url)?;
        let host = normalize_host(url.host_str().unwrap_or_default());

        if let Some(pattern) = self.policy.blocked_hosts.find(&host) {
            debug!(%host, %pattern, "host matches deny list");
            return Err(Error::HostNotAllowed { host });
        }
        if let Some(allowed) = &self.policy.allowed_hosts
            && !allowed.matches(&host)
        {
            debug!(%host, "host not in allow list");
            return Err(Error::HostNotAllowed { host });
        }

        if let Some(caller) = caller_host
            && is_loop(&url, caller)
        {
            return Err(Error::LoopDetected {
                netloc: netloc(&url),
            });
        }

        let port = url
            .port_or_known_default()
            .ok_or_else(|| Error::invalid_url(url.as_str(), "missing port"))?;

        let ips: Vec<IpAddr> = match url.host() {
            Some(Host::Ipv4(v4)) => vec![IpAddr::V4(v4)],
            Some(Host::Ipv6(v6)) => vec![IpAddr::V6(v6)],
            Some(Host::Domain(domain)) => self
                .resolver
                .resolve(domain, port)
                .await
                .map_err(|e| Error::dns(&host, e.to_string()))?,
            None => return Err(Error::invalid_url(url.as_str(), "missing host")),
        };
        if ips.is_empty() {
            return Err(Error::dns(&host, "no addresses returned"));
        }

        for ip in &ips {
            if let Some(reason) = classify_with_allowlist(ip, &self.policy.ssrf_allowlist) {
                return Err(Error::PrivateIpBlocked {
                    host,
                    ip: *ip,
                    reason,
                });
            }
        }

        let addrs = ips.into_iter().map(|ip| SocketAddr::new(ip, port)).collect();
        debug!(%host, port, ?addrs, "target validated");
        Ok(ValidatedTarget {
            url,
            host,
            port,
            addrs,
        })
    }
}

/// Parse a caller-supplied URL and check its scheme, host and userinfo.
pub fn parse_target(raw: &str) -> Result<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::invalid_url(trimmed, "empty URL"));
    }
    let url = Url::parse(trimmed).map_err(|e| Error::invalid_url(trimmed, e.to_string()))?;
    check_shape(&url)?;
    Ok(url)
}

fn check_shape(url: &Url) -> Result<()> {
    match url.scheme() {
        "http" | "https" => {},
        other => {
            return Err(Error::invalid_url(
                url.as_str(),
                format!("unsupported scheme '{other}'"),
            ));
        },
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(Error::invalid_url(url.as_str(), "missing host"));
    }
    if !url.username().is_empty() || url.password().is_some() {
        return Err(Error::invalid_url(
            url.as_str(),
            "credentials in URL are not allowed",
        ));
    }
    Ok(())
}

fn is_loop(url: &Url, caller_host: &str) -> bool {
    let caller = caller_host.trim().to_ascii_lowercase();
    if caller.is_empty() {
        return false;
    }
    let target = netloc(url);
    if caller == target {
        return true;
    }
    // Default ports are dropped while parsing, so `host:80` never shows up
    // in the netloc.
    url.port().is_none()
        && url
            .port_or_known_default()
            .is_some_and(|port| caller == format!("{target}:{port}"))
}

fn record_rejection(err: &Error) {
    debug!(error = %err, kind = err.kind(), "target rejected");
    #[cfg(feature = "metrics")]
    counter!(ssrf_metrics::REJECTIONS_TOTAL, "reason" => err.kind()).increment(1);
}

//! Core types shared between the guard and the gateway: host patterns and
//! the validated fetch target.

use std::net::SocketAddr;

use url::{Host, Url};

// ── Host patterns ───────────────────────────────────────────────────────────

/// A pattern for matching host names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostPattern {
    /// Match exactly this host (e.g. `example.com`, `127.0.0.1`).
    Exact(String),
    /// Match the suffix and any subdomain (e.g. `*.example.com` matches
    /// `example.com` and `api.example.com`).
    WildcardSubdomain(String),
    /// Match everything (`*`).
    Wildcard,
}

impl HostPattern {
    /// Parse a pattern string into a `HostPattern`.
    pub fn parse(s: &str) -> Self {
        let s = normalize_host(s);
        if s == "*" {
            return Self::Wildcard;
        }
        if let Some(suffix) = s.strip_prefix("*.") {
            return Self::WildcardSubdomain(suffix.to_string());
        }
        Self::Exact(s)
    }

    /// Check whether a host matches this pattern.
    pub fn matches(&self, host: &str) -> bool {
        let host = normalize_host(host);
        match self {
            Self::Wildcard => true,
            Self::Exact(h) => host == *h,
            Self::WildcardSubdomain(suffix) => {
                host == *suffix || host.ends_with(&format!(".{suffix}"))
            },
        }
    }
}

impl std::fmt::Display for HostPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Exact(h) => write!(f, "{h}"),
            Self::WildcardSubdomain(suffix) => write!(f, "*.{suffix}"),
            Self::Wildcard => write!(f, "*"),
        }
    }
}

/// Lowercase, strip IPv6 brackets and a trailing dot.
pub fn normalize_host(host: &str) -> String {
    let host = host.trim();
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    host.strip_suffix('.').unwrap_or(host).to_ascii_lowercase()
}

/// An ordered set of host patterns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostList {
    patterns: Vec<HostPattern>,
}

impl HostList {
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = entries
            .into_iter()
            .map(|e| e.as_ref().trim().to_string())
            .filter(|e| !e.is_empty())
            .map(|e| HostPattern::parse(&e))
            .collect();
        Self { patterns }
    }

    /// First pattern matching `host`, if any.
    pub fn find(&self, host: &str) -> Option<&HostPattern> {
        self.patterns.iter().find(|p| p.matches(host))
    }

    pub fn matches(&self, host: &str) -> bool {
        self.find(host).is_some()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HostPattern> {
        self.patterns.iter()
    }
}

// ── Validated target ────────────────────────────────────────────────────────

/// A fetch target that passed every guard check.
///
/// `addrs` are the addresses the guard vetted; outbound connections must be
/// pinned to them so the transport never re-resolves the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedTarget {
    pub url: Url,
    /// Normalized host (lowercase, no brackets).
    pub host: String,
    pub port: u16,
    pub addrs: Vec<SocketAddr>,
}

impl ValidatedTarget {
    /// The domain name to pin, or `None` for IP-literal hosts.
    pub fn domain(&self) -> Option<&str> {
        match self.url.host() {
            Some(Host::Domain(domain)) => Some(domain),
            _ => None,
        }
    }

    /// `host[:port]` as written in the URL.
    pub fn netloc(&self) -> String {
        netloc(&self.url)
    }
}

/// `host[:port]` for a URL, keeping brackets around IPv6 literals.
pub fn netloc(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use {super::*, rstest::rstest};

    #[test]
    fn host_pattern_exact() {
        let p = HostPattern::parse("example.com");
        assert!(p.matches("example.com"));
        assert!(p.matches("Example.COM"));
        assert!(p.matches("example.com."));
        assert!(!p.matches("api.example.com"));
        assert!(!p.matches("notexample.com"));
    }

    #[test]
    fn host_pattern_wildcard_subdomain() {
        let p = HostPattern::parse("*.example.com");
        assert!(p.matches("api.example.com"));
        assert!(p.matches("a.b.example.com"));
        assert!(p.matches("example.com"));
        assert!(!p.matches("notexample.com"));
    }

    #[test]
    fn host_pattern_wildcard() {
        let p = HostPattern::parse("*");
        assert!(p.matches("anything.com"));
        assert!(p.matches("10.0.0.1"));
    }

    #[rstest]
    #[case("::1", "[::1]")]
    #[case("[::1]", "::1")]
    #[case("LOCALHOST", "localhost.")]
    fn host_pattern_normalizes(#[case] pattern: &str, #[case] host: &str) {
        assert!(HostPattern::parse(pattern).matches(host));
    }

    #[test]
    fn host_pattern_display() {
        assert_eq!(HostPattern::parse("*.Example.com").to_string(), "*.example.com");
        assert_eq!(HostPattern::parse("*").to_string(), "*");
    }

    #[test]
    fn host_list_skips_blank_entries() {
        let list = HostList::from_entries(["example.com", " ", "", "*.test"]);
        assert_eq!(list.len(), 2);
        assert!(list.matches("foo.test"));
        assert!(!list.matches("example.org"));
    }

    #[test]
    fn netloc_keeps_explicit_port() {
        let url = Url::parse("http://Example.com:8080/x").unwrap();
        assert_eq!(netloc(&url), "example.com:8080");
        let url = Url::parse("http://[::1]/x").unwrap();
        assert_eq!(netloc(&url), "[::1]");
    }

    #[test]
    fn domain_is_none_for_ip_literals() {
        let target = ValidatedTarget {
            url: Url::parse("http://93.184.216.34/").unwrap(),
            host: "93.184.216.34".into(),
            port: 80,
            addrs: vec!["93.184.216.34:80".parse().unwrap()],
        };
        assert_eq!(target.domain(), None);

        let target = ValidatedTarget {
            url: Url::parse("https://example.com/").unwrap(),
            host: "example.com".into(),
            port: 443,
            addrs: vec![],
        };
        assert_eq!(target.domain(), Some("example.com"));
    }
}

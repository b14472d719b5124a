//! DNS resolution seam used by the guard.

use std::{
    collections::HashMap,
    io,
    net::IpAddr,
    sync::atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;

/// Resolves a host name to the addresses the gateway may connect to.
#[async_trait]
pub trait Resolve: Send + Sync {
    async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<IpAddr>>;
}

/// Resolver backed by the operating system (`getaddrinfo` via tokio).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait]
impl Resolve for SystemResolver {
    async fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<IpAddr>> {
        let mut ips: Vec<IpAddr> = Vec::new();
        for addr in tokio::net::lookup_host((host, port)).await? {
            if !ips.contains(&addr.ip()) {
                ips.push(addr.ip());
            }
        }
        Ok(ips)
    }
}

/// Fixed host → addresses table. Unknown hosts resolve to nothing.
#[derive(Debug, Default)]
pub struct StaticResolver {
    entries: HashMap<String, Vec<IpAddr>>,
    lookups: AtomicUsize,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, host: &str, ips: &[IpAddr]) -> Self {
        self.entries
            .insert(host.to_ascii_lowercase(), ips.to_vec());
        self
    }

    /// Number of lookups served so far.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Resolve for StaticResolver {
    async fn resolve(&self, host: &str, _port: u16) -> io::Result<Vec<IpAddr>> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .entries
            .get(&host.to_ascii_lowercase())
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_resolver_returns_configured_addresses() {
        let ip: IpAddr = "93.184.216.34".parse().unwrap();
        let resolver = StaticResolver::new().with("Example.com", &[ip]);
        assert_eq!(resolver.resolve("example.com", 443).await.unwrap(), vec![ip]);
        assert!(resolver.resolve("unknown.test", 80).await.unwrap().is_empty());
        assert_eq!(resolver.lookups(), 2);
    }

    #[tokio::test]
    async fn system_resolver_handles_ip_strings() {
        let ips = SystemResolver.resolve("127.0.0.1", 80).await.unwrap();
        assert_eq!(ips, vec!["127.0.0.1".parse::<IpAddr>().unwrap()]);
    }
}

//! Bounded in-memory cache for small successful GET responses.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use {
    axum::http::{HeaderMap, StatusCode},
    bytes::Bytes,
    moka::{future::Cache, policy::EvictionPolicy},
    sha2::{Digest, Sha256},
    tracing::debug,
    url::Url,
};

#[cfg(feature = "metrics")]
use outpost_metrics::{cache as cache_metrics, counter};

use crate::{
    executor::FetchOutcome,
    headers::DEFAULT_ACCEPT,
    request::FetchRequest,
};

/// SHA-256 hex fingerprint of a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Fingerprint of `(method, url, ua profile, accept, language)` with defaults
/// applied. Forwarded headers and bodies never contribute.
pub fn fingerprint(request: &FetchRequest, url: &Url, default_language: &str) -> CacheKey {
    let material = format!(
        "{}:{}:{}:{}:{}",
        request.method(),
        url,
        request.ua().as_str(),
        request.accept().unwrap_or(DEFAULT_ACCEPT),
        request.language().unwrap_or(default_language),
    );
    CacheKey(format!("{:x}", Sha256::digest(material.as_bytes())))
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub inserted_at: Instant,
}

#[derive(Debug, Clone, Copy)]
pub struct CacheSettings {
    pub ttl: Duration,
    pub max_entries: u64,
    pub max_entry_bytes: usize,
}

pub struct ResponseCache {
    store: Cache<CacheKey, Arc<CacheEntry>>,
    max_entry_bytes: usize,
}

impl ResponseCache {
    pub fn new(settings: CacheSettings) -> Self {
        let store = Cache::builder()
            .max_capacity(settings.max_entries)
            .time_to_live(settings.ttl)
            .eviction_policy(EvictionPolicy::lru())
            .build();
        Self {
            store,
            max_entry_bytes: settings.max_entry_bytes,
        }
    }

    pub async fn get(&self, key: &CacheKey) -> Option<Arc<CacheEntry>> {
        let entry = self.store.get(key).await;
        record(if entry.is_some() { "hit" } else { "miss" });
        entry
    }

    pub async fn put(&self, key: CacheKey, entry: CacheEntry) {
        self.store.insert(key, Arc::new(entry)).await;
        record("store");
    }

    pub fn is_eligible(&self, status: StatusCode, body_len: usize) -> bool {
        matches!(status, StatusCode::OK | StatusCode::NOT_MODIFIED) && body_len < self.max_entry_bytes
    }

    /// Store `outcome` if it is cacheable. Returns whether it was stored.
    pub async fn store(&self, key: CacheKey, outcome: &FetchOutcome) -> bool {
        if !self.is_eligible(outcome.status, outcome.body.len()) {
            debug!(
                status = outcome.status.as_u16(),
                bytes = outcome.body.len(),
                "response not cacheable"
            );
            return false;
        }
        self.put(key, CacheEntry {
            status: outcome.status,
            headers: outcome.headers.clone(),
            body: outcome.body.clone(),
            inserted_at: Instant::now(),
        })
        .await;
        true
    }

    /// Approximate number of live entries.
    pub fn entry_count(&self) -> u64 {
        self.store.entry_count()
    }

    /// Apply pending evictions so `entry_count` is exact.
    pub async fn sync(&self) {
        self.store.run_pending_tasks().await;
    }
}

fn record(operation: &'static str) {
    #[cfg(feature = "metrics")]
    counter!(cache_metrics::OPERATIONS_TOTAL, "operation" => operation).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = operation;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use {
        super::*,
        crate::request::{FetchParams, RequestDefaults, UaProfile},
        axum::http::header::CONTENT_TYPE,
    };

    const LANG: &str = "es-ES,es;q=0.9,en;q=0.8";

    fn request(ua: UaProfile, accept: Option<&str>) -> FetchRequest {
        FetchParams {
            url: "https://example.com/a".into(),
            ua,
            accept: accept.map(str::to_string),
            ..FetchParams::default()
        }
        .into_request(&RequestDefaults::default(), &HeaderMap::new(), Bytes::new())
        .unwrap()
    }

    fn url() -> Url {
        Url::parse("https://example.com/a").unwrap()
    }

    fn settings(ttl: Duration, max_entries: u64) -> CacheSettings {
        CacheSettings {
            ttl,
            max_entries,
            max_entry_bytes: 16,
        }
    }

    fn outcome(status: StatusCode, body: &'static [u8]) -> FetchOutcome {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, "text/plain".parse().unwrap());
        FetchOutcome {
            status,
            headers,
            body: Bytes::from_static(body),
            from_cache: false,
        }
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let a = fingerprint(&request(UaProfile::Desktop, None), &url(), LANG);
        let b = fingerprint(&request(UaProfile::Desktop, None), &url(), LANG);
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn fingerprint_distinguishes_tuples() {
        let desktop = fingerprint(&request(UaProfile::Desktop, None), &url(), LANG);
        let mobile = fingerprint(&request(UaProfile::Mobile, None), &url(), LANG);
        let html = fingerprint(&request(UaProfile::Desktop, Some("text/html")), &url(), LANG);
        let other_lang = fingerprint(&request(UaProfile::Desktop, None), &url(), "en-US");
        let other_url = fingerprint(
            &request(UaProfile::Desktop, None),
            &Url::parse("https://example.com/b").unwrap(),
            LANG,
        );
        for other in [&mobile, &html, &other_lang, &other_url] {
            assert_ne!(&desktop, other);
        }
    }

    #[test]
    fn fingerprint_applies_defaults() {
        let implicit = fingerprint(&request(UaProfile::Desktop, None), &url(), LANG);
        let explicit = fingerprint(&request(UaProfile::Desktop, Some("*/*")), &url(), LANG);
        assert_eq!(implicit, explicit);
    }

    #[tokio::test]
    async fn store_then_get() {
        let cache = ResponseCache::new(settings(Duration::from_secs(60), 8));
        let key = fingerprint(&request(UaProfile::Desktop, None), &url(), LANG);
        assert!(cache.get(&key).await.is_none());

        assert!(cache.store(key.clone(), &outcome(StatusCode::OK, b"hello")).await);
        let entry = cache.get(&key).await.unwrap();
        assert_eq!(entry.status, StatusCode::OK);
        assert_eq!(entry.body, Bytes::from_static(b"hello"));
        assert_eq!(entry.headers.get(CONTENT_TYPE).unwrap(), "text/plain");
    }

    #[tokio::test]
    async fn skips_ineligible_responses() {
        let cache = ResponseCache::new(settings(Duration::from_secs(60), 8));
        let key = CacheKey("k".into());
        assert!(!cache.store(key.clone(), &outcome(StatusCode::NOT_FOUND, b"x")).await);
        assert!(
            !cache
                .store(key.clone(), &outcome(StatusCode::OK, b"0123456789abcdef"))
                .await
        );
        assert!(cache.store(key.clone(), &outcome(StatusCode::NOT_MODIFIED, b"")).await);
        assert_eq!(cache.get(&key).await.unwrap().status, StatusCode::NOT_MODIFIED);
    }

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let cache = ResponseCache::new(settings(Duration::from_millis(50), 8));
        let key = CacheKey("ttl".into());
        cache.store(key.clone(), &outcome(StatusCode::OK, b"a")).await;
        assert!(cache.get(&key).await.is_some());
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(cache.get(&key).await.is_none());
    }

    #[tokio::test]
    async fn capacity_is_bounded() {
        let cache = ResponseCache::new(settings(Duration::from_secs(60), 2));
        for i in 0..10 {
            cache
                .store(CacheKey(format!("k{i}")), &outcome(StatusCode::OK, b"a"))
                .await;
        }
        cache.sync().await;
        assert!(cache.entry_count() <= 2);
    }
}

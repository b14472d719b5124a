//! Per-client sliding-window rate limiting.
//!
//! Each client identity has a minute window and an hour window. Both must
//! have room for a request to be admitted; an admitted request is recorded in
//! both.

use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

use {dashmap::DashMap, tracing::debug};

#[cfg(feature = "metrics")]
use outpost_metrics::{counter, rate_limit as rate_limit_metrics};

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimits {
    pub per_minute: u32,
    pub per_hour: u32,
}

/// Ordered `(instant, count)` entries for one period.
#[derive(Debug, Default)]
struct Window {
    entries: VecDeque<(Instant, u32)>,
}

impl Window {
    /// Drop entries at or older than `now - period`.
    fn prune(&mut self, now: Instant, period: Duration) {
        let Some(cutoff) = now.checked_sub(period) else {
            return;
        };
        while let Some((ts, _)) = self.entries.front()
            && *ts <= cutoff
        {
            self.entries.pop_front();
        }
    }

    fn used(&self) -> u64 {
        self.entries.iter().map(|(_, n)| u64::from(*n)).sum()
    }

    fn record(&mut self, now: Instant) {
        if let Some((ts, n)) = self.entries.back_mut()
            && *ts == now
        {
            *n += 1;
            return;
        }
        self.entries.push_back((now, 1));
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Default)]
struct ClientWindows {
    minute: Window,
    hour: Window,
}

impl ClientWindows {
    fn prune(&mut self, now: Instant) {
        self.minute.prune(now, MINUTE);
        self.hour.prune(now, HOUR);
    }
}

pub struct RateLimiter {
    limits: RateLimits,
    clients: DashMap<String, ClientWindows>,
}

impl RateLimiter {
    pub fn new(limits: RateLimits) -> Self {
        Self {
            limits,
            clients: DashMap::new(),
        }
    }

    pub fn limits(&self) -> RateLimits {
        self.limits
    }

    pub fn admit(&self, identity: &str) -> bool {
        self.admit_at(identity, Instant::now())
    }

    pub fn admit_at(&self, identity: &str, now: Instant) -> bool {
        let mut windows = self.clients.entry(identity.to_string()).or_default();
        windows.prune(now);

        if windows.minute.used() >= u64::from(self.limits.per_minute) {
            debug!(client = identity, window = "minute", "rate limit reached");
            Self::record_rejection();
            return false;
        }
        if windows.hour.used() >= u64::from(self.limits.per_hour) {
            debug!(client = identity, window = "hour", "rate limit reached");
            Self::record_rejection();
            return false;
        }

        windows.minute.record(now);
        windows.hour.record(now);
        true
    }

    /// Forget identities with no live entries. Returns how many were dropped.
    pub fn sweep_idle(&self, now: Instant) -> usize {
        let before = self.clients.len();
        self.clients.retain(|_, windows| {
            windows.prune(now);
            !(windows.minute.is_empty() && windows.hour.is_empty())
        });
        let dropped = before.saturating_sub(self.clients.len());
        if dropped > 0 {
            debug!(dropped, "swept idle rate-limit entries");
        }
        dropped
    }

    pub fn tracked_clients(&self) -> usize {
        self.clients.len()
    }

    fn record_rejection() {
        #[cfg(feature = "metrics")]
        counter!(rate_limit_metrics::REJECTED_TOTAL).increment(1);
    }
}

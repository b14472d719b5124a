//! Bounded retries with linear backoff, driven as an explicit state machine.

use std::{future::Future, time::Duration};

use {tokio_util::sync::CancellationToken, tracing::debug};

#[cfg(feature = "metrics")]
use outpost_metrics::{counter, fetch as fetch_metrics};

use crate::error::{GatewayError, Result};

/// Result of one attempt, classified for the retry loop.
pub trait Attempt {
    /// Whether another attempt may produce a different result.
    fn is_transient(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_step: Duration::from_millis(500),
        }
    }
}

enum RetryState<T> {
    Attempting { attempt: u32 },
    Backoff { attempt: u32 },
    /// Settled on a result that must not be retried.
    Success(T),
    /// Out of attempts; carries the last transient result.
    Exhausted(T),
}

impl RetryPolicy {
    /// Delay after failed attempt `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff_step.saturating_mul(attempt)
    }

    /// Run `op` until it settles, attempts run out, or `cancel` fires.
    ///
    /// On exhaustion the last result is returned as-is; cancellation is the
    /// only error this adds.
    pub async fn run<T, F, Fut>(&self, cancel: &CancellationToken, mut op: F) -> Result<T>
    where
        T: Attempt,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = T>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut state = RetryState::Attempting { attempt: 1 };
        loop {
            if cancel.is_cancelled() {
                return Err(GatewayError::Cancelled);
            }
            state = match state {
                RetryState::Attempting { attempt } => {
                    let result = tokio::select! {
                        biased;
                        () = cancel.cancelled() => return Err(GatewayError::Cancelled),
                        result = op(attempt) => result,
                    };
                    if !result.is_transient() {
                        RetryState::Success(result)
                    } else if attempt >= max_attempts {
                        debug!(attempt, "retries exhausted");
                        RetryState::Exhausted(result)
                    } else {
                        RetryState::Backoff { attempt }
                    }
                },
                RetryState::Backoff { attempt } => {
                    let delay = self.backoff_for(attempt);
                    debug!(attempt, delay_ms = delay.as_millis() as u64, "transient failure, backing off");
                    #[cfg(feature = "metrics")]
                    counter!(fetch_metrics::UPSTREAM_RETRIES_TOTAL).increment(1);
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => return Err(GatewayError::Cancelled),
                        () = tokio::time::sleep(delay) => {},
                    }
                    RetryState::Attempting {
                        attempt: attempt + 1,
                    }
                },
                RetryState::Success(result) | RetryState::Exhausted(result) => return Ok(result),
            };
        }
    }
}

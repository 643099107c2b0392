//! Shared retry policy for dual-write paths.
//!
//! One abstraction owns the attempt count, backoff schedule, and
//! per-attempt timeout, instead of ad hoc loops at call sites. The Release
//! Coordinator uses it for the cache-write phase after a confirmed ledger
//! transaction; any future dual-write path should reuse it.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::timeout;
use tracing::warn;

/// Why the final attempt failed.
#[derive(Debug)]
pub enum LastFailure<E> {
    Error(E),
    TimedOut,
}

#[derive(Debug, Error)]
pub enum RetryError<E> {
    #[error("operation failed after {attempts} attempts")]
    Exhausted {
        attempts: u32,
        last: LastFailure<E>,
    },
}

/// Bounded retry with linearly increasing backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Backoff grows by one step per completed attempt.
    pub backoff_step: Duration,
    pub max_backoff: Duration,
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    /// The cache-write schedule: 5 attempts, 1s/2s/3s/4s backoff capped at
    /// 5s, each attempt bounded by 30 seconds.
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 5,
            backoff_step: Duration::from_secs(1),
            max_backoff: Duration::from_secs(5),
            attempt_timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Drive `op` until it succeeds or the policy is exhausted.
    pub async fn run<T, E, F, Fut>(&self, what: &str, mut op: F) -> Result<T, RetryError<E>>
    where
        E: std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut last = LastFailure::TimedOut;
        for attempt in 1..=self.max_attempts {
            match timeout(self.attempt_timeout, op()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => {
                    warn!("{what}: attempt {attempt}/{} failed: {e}", self.max_attempts);
                    last = LastFailure::Error(e);
                }
                Err(_) => {
                    warn!("{what}: attempt {attempt}/{} timed out", self.max_attempts);
                    last = LastFailure::TimedOut;
                }
            }
            if attempt < self.max_attempts {
                tokio::time::sleep(self.backoff_for(attempt)).await;
            }
        }
        Err(RetryError::Exhausted {
            attempts: self.max_attempts,
            last,
        })
    }

    fn backoff_for(&self, attempt: u32) -> Duration {
        (self.backoff_step * attempt).min(self.max_backoff)
    }
}

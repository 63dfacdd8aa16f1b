//! Bounded retry for per-file probes
//!
//! Probing a file opens a fresh replication connection, which a busy server
//! may refuse. A failed probe is retried a fixed number of times with a fixed
//! pause; once attempts run out the file is dropped from the run.
//!
//! # Example
//!
//! ```rust
//! use binwindow::common::RetryPolicy;
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::builder()
//!     .max_attempts(3)
//!     .backoff(Duration::from_millis(10))
//!     .build();
//!
//! assert!(policy.should_retry(1));
//! assert!(!policy.should_retry(3));
//! ```

use super::error::Result;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Fixed-backoff retry policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Zero behaves like one.
    max_attempts: u32,
    /// Pause between consecutive attempts.
    backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            backoff: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::default()
    }

    /// A policy that tries exactly once.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::ZERO,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    /// Whether another attempt is allowed after `attempt` (1-based) failed.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts()
    }

    /// Run `op` until it succeeds, fails with a non-retriable error, or the
    /// attempts are used up. The last error is returned.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retriable() && self.should_retry(attempt) => {
                    debug!(
                        "{} failed (attempt {}/{}): {}",
                        what,
                        attempt,
                        self.max_attempts(),
                        err
                    );
                    attempt += 1;
                    if !self.backoff.is_zero() {
                        tokio::time::sleep(self.backoff).await;
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Builder for [`RetryPolicy`].
#[derive(Debug, Clone, Default)]
pub struct RetryPolicyBuilder {
    max_attempts: Option<u32>,
    backoff: Option<Duration>,
}

impl RetryPolicyBuilder {
    pub fn max_attempts(mut self, value: u32) -> Self {
        self.max_attempts = Some(value);
        self
    }

    pub fn backoff(mut self, value: Duration) -> Self {
        self.backoff = Some(value);
        self
    }

    pub fn build(self) -> RetryPolicy {
        let defaults = RetryPolicy::default();
        RetryPolicy {
            max_attempts: self.max_attempts.unwrap_or(defaults.max_attempts),
            backoff: self.backoff.unwrap_or(defaults.backoff),
        }
    }
}

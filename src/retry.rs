//! Retry logic with linear backoff
//!
//! An execution unit retries transient invoicing failures itself: up to
//! `max_attempts` tries, waiting `base_delay * attempt` after try `attempt`
//! (300ms, then 600ms with the defaults). Requeueing a task through the
//! dispatcher is a separate, outer tier and does not go through this module.
//!
//! # Example
//!
//! ```no_run
//! use billing_dispatch::retry::{RetryPolicy, with_retry};
//! use billing_dispatch::error::Error;
//!
//! # async fn example() -> Result<(), Error> {
//! let policy = RetryPolicy::default();
//! let id = with_retry(&policy, |_attempt| async {
//!     Ok::<_, Error>("inv-1".to_string())
//! }).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::Error;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (timeouts, refused connections, unexpected responses) return `true`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            // Anything the invoicing collaborator does wrong is worth another try
            Error::Timeout { .. } => true,
            Error::UnexpectedStatus { .. } => true,
            Error::Network(_) => true,
            Error::Config { .. } => false,
            Error::InvalidBatch { .. } => false,
            Error::Io(_) => false,
            Error::Serialization(_) => false,
            Error::ShuttingDown => false,
            Error::DispatcherUnavailable => false,
            Error::ApiServerError(_) => false,
            Error::Other(_) => false,
        }
    }
}

/// What to do after a failed try
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryDecision {
    /// Whether another try is allowed
    pub should_retry: bool,
    /// How long to wait before it
    pub delay: Duration,
}

/// Linear-backoff retry policy
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total tries, including the first
    pub max_attempts: u32,
    /// Backoff step
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: config.base_delay,
        }
    }
}

impl RetryPolicy {
    /// Decide what follows failed try number `attempt` (1-based).
    pub fn next_attempt(&self, attempt: u32) -> RetryDecision {
        RetryDecision {
            should_retry: attempt < self.max_attempts,
            delay: self.base_delay.saturating_mul(attempt),
        }
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or the
/// policy runs out of tries.
///
/// The closure receives the 1-based try number. The last error is returned
/// when tries are exhausted.
pub async fn with_retry<F, Fut, T, E>(policy: &RetryPolicy, mut operation: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(attempts = attempt, "Operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() => {
                let decision = policy.next_attempt(attempt);
                if !decision.should_retry {
                    tracing::warn!(
                        error = %e,
                        attempts = attempt,
                        "Operation failed after all retry attempts exhausted"
                    );
                    return Err(e);
                }

                tracing::warn!(
                    error = %e,
                    attempt = attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = decision.delay.as_millis() as u64,
                    "Operation failed, retrying"
                );

                tokio::time::sleep(decision.delay).await;
                attempt += 1;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Operation failed with non-retryable error");
                return Err(e);
            }
        }
    }
}

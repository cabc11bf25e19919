//! Bounded retry with a constant backoff

use std::future::Future;
use std::time::Duration;

use backon::{BackoffBuilder, ConstantBuilder};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::Error;

/// Default pause between attempts
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(2);

/// Retry policy for a full authentication exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt (0 = no retry)
    pub max_retries: u32,
    /// Fixed pause before each retry
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            backoff: DEFAULT_BACKOFF,
        }
    }
}

impl RetryPolicy {
    /// Create a policy
    #[must_use]
    pub fn new(max_retries: u32, backoff: Duration) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }

    /// Policy that never retries
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Schedule of pauses; yields exactly `max_retries` items
    pub fn schedule(&self) -> impl Iterator<Item = Duration> {
        ConstantBuilder::default()
            .with_delay(self.backoff)
            .with_max_times(self.max_retries as usize)
            .build()
    }
}

/// Run `f` until it succeeds, fails with a non-retryable error, or the
/// policy's retry budget is spent. Each retry sleeps for the full backoff.
pub async fn with_retry<F, Fut, T>(policy: &RetryPolicy, name: &str, mut f: F) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    let mut schedule = policy.schedule();
    let mut attempts = 0u32;

    loop {
        attempts += 1;

        match f().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if !e.is_retryable() {
                    return Err(e);
                }

                let Some(delay) = schedule.next() else {
                    debug!(operation = name, attempts, "Retry budget exhausted");
                    return Err(e);
                };

                warn!(
                    operation = name,
                    attempt = attempts,
                    delay_ms = delay.as_millis(),
                    error = %e,
                    "Retrying after backoff"
                );
                sleep(delay).await;
            }
        }
    }
}

//! Bounded exponential-backoff retry controller.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use paperscan_core::defaults::{
    RETRY_BACKOFF_MULTIPLIER, RETRY_INITIAL_DELAY_MS, RETRY_MAX_DELAY_MS, UPLOAD_MAX_ATTEMPTS,
};
use paperscan_core::{Error, Result};

/// Retry schedule: attempt budget plus capped exponential delays.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: UPLOAD_MAX_ATTEMPTS,
            initial_delay: Duration::from_millis(RETRY_INITIAL_DELAY_MS),
            multiplier: RETRY_BACKOFF_MULTIPLIER,
            max_delay: Duration::from_millis(RETRY_MAX_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Delay before retry `n` (1-based): `initial * multiplier^(n-1)`,
    /// capped at `max_delay`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(secs.max(0.0))
        }
    }
}

/// Notice handed to the retry callback before the next attempt runs.
#[derive(Debug)]
pub struct RetryAttempt {
    /// The attempt about to run (2 for the first retry).
    pub attempt: u32,
    pub max_attempts: u32,
    pub delay: Duration,
    /// Failure of the previous attempt.
    pub error: Error,
}

impl RetryAttempt {
    /// Sleep for the backoff delay.
    pub async fn wait(&self) {
        tokio::time::sleep(self.delay).await;
    }
}

/// Run `operation` until it succeeds or the attempt budget is spent.
///
/// `on_retry` is awaited before every retry and owns the delay; call
/// [`RetryAttempt::wait`] inside it. On exhaustion the last error is
/// returned.
pub async fn retry_with_backoff<T, Op, Fut, OnRetry, RetryFut>(
    policy: &RetryPolicy,
    operation: Op,
    on_retry: OnRetry,
) -> Result<T>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    OnRetry: FnMut(RetryAttempt) -> RetryFut,
    RetryFut: Future<Output = ()>,
{
    retry_if(policy, operation, |_| true, on_retry).await
}

/// Like [`retry_with_backoff`], but errors failing `should_retry` are
/// returned immediately.
pub async fn retry_if<T, Op, Fut, Pred, OnRetry, RetryFut>(
    policy: &RetryPolicy,
    mut operation: Op,
    should_retry: Pred,
    mut on_retry: OnRetry,
) -> Result<T>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    Pred: Fn(&Error) -> bool,
    OnRetry: FnMut(RetryAttempt) -> RetryFut,
    RetryFut: Future<Output = ()>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(
                        subsystem = "jobs",
                        component = "retry",
                        attempt,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(error) if attempt < max_attempts && should_retry(&error) => {
                let delay = policy.delay_for(attempt);
                warn!(
                    subsystem = "jobs",
                    component = "retry",
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Attempt failed, retrying"
                );
                attempt += 1;
                on_retry(RetryAttempt {
                    attempt,
                    max_attempts,
                    delay,
                    error,
                })
                .await;
            }
            Err(error) => return Err(error),
        }
    }
}

//! Retry utilities for actor operations with exponential backoff.

use std::future::Future;
use std::time::Duration;

use crate::constants::{
    SYNC_BACKOFF_FACTOR, SYNC_INITIAL_DELAY_MS, SYNC_MAX_ATTEMPTS, SYNC_MAX_DELAY_MS,
};

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first one included
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Growth factor applied to the delay after every failed attempt
    pub factor: f64,
    /// Maximum delay between attempts
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: SYNC_MAX_ATTEMPTS,
            initial_delay: Duration::from_millis(SYNC_INITIAL_DELAY_MS),
            factor: SYNC_BACKOFF_FACTOR,
            max_delay: Duration::from_millis(SYNC_MAX_DELAY_MS),
        }
    }
}

impl RetryConfig {
    /// Create a new retry config with specified parameters
    pub fn new(max_attempts: u32, initial_delay: Duration, factor: f64, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            factor,
            max_delay,
        }
    }

    /// Delay to wait after the given failed attempt (1-based), capped at `max_delay`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let scaled = self.initial_delay.as_secs_f64() * self.factor.powi(exponent);
        if !scaled.is_finite() || scaled >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(scaled)
        }
    }
}

/// Execute an async operation with exponential backoff retry.
///
/// Returns the result of the first successful attempt, or the error of the
/// last attempt once `config.max_attempts` is reached.
///
/// # Example
/// ```ignore
/// let result = with_retry(&config, || async {
///     some_fallible_operation().await
/// }).await;
/// ```
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    with_retry_when(config, operation, |_| true).await
}

/// Like [`with_retry`], but gives up immediately when `should_retry` rejects
/// the error. The rejected error is returned unchanged.
pub async fn with_retry_when<F, Fut, T, E, P>(
    config: &RetryConfig,
    mut operation: F,
    should_retry: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if attempt >= max_attempts || !should_retry(&e) {
                    return Err(e);
                }

                let delay = config.delay_after(attempt);
                tracing::warn!(
                    "Operation failed (attempt {}/{}): {}. Retrying in {:?}...",
                    attempt,
                    max_attempts,
                    e,
                    delay
                );

                tokio::time::sleep(delay).await;
            }
        }
    }
}

//! Rate-limit retry wrapper
//!
//! Wraps a single outbound call. Only errors that report themselves as
//! retryable (HTTP 429) are retried; everything else surfaces at once.

use crate::config::RetryConfig;
use crate::error::RetryableError;
use crate::otel::Metrics;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Retry manager with exponential backoff on rate limits
#[derive(Clone)]
pub struct RetryManager {
    config: RetryConfig,
    metrics: Option<Arc<Metrics>>,
}

impl RetryManager {
    /// Create a new RetryManager with the given configuration
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            metrics: None,
        }
    }

    /// Create a RetryManager with default configuration
    pub fn with_defaults() -> Self {
        Self::new(RetryConfig::default())
    }

    /// Count every rate-limited attempt in `metrics`
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Execute an async operation, retrying while it is rate limited
    ///
    /// Attempts are numbered from 1. After a rate-limited attempt `n` the
    /// manager sleeps `retry_after * multiplier^(n-1)` and tries again, up to
    /// `max_attempts` calls in total. The last error is returned once attempts
    /// are exhausted.
    pub async fn execute<F, Fut, T, E>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RetryableError + std::fmt::Display,
    {
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let err = match operation().await {
                Ok(result) => return Ok(result),
                Err(err) => err,
            };

            if !err.is_retryable() {
                return Err(err);
            }

            if let Some(ref metrics) = self.metrics {
                metrics.record_rate_limited();
            }

            if attempt >= self.config.max_attempts {
                warn!(
                    attempts = attempt,
                    error = %err,
                    "Rate limit retries exhausted"
                );
                return Err(err);
            }

            let delay = self.calculate_backoff(err.retry_after_secs(), attempt);
            warn!(
                attempt,
                max_attempts = self.config.max_attempts,
                delay_secs = delay.as_secs_f64(),
                error = %err,
                "Rate limited, backing off"
            );

            tokio::time::sleep(delay).await;
        }
    }

    /// Backoff after the given (1-based) attempt, capped at `max_backoff_secs`
    pub fn calculate_backoff(&self, retry_after_secs: Option<u64>, attempt: u32) -> Duration {
        let base = retry_after_secs.unwrap_or(self.config.default_retry_after_secs) as f64;
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let max = Duration::from_secs(self.config.max_backoff_secs);

        // Out-of-range or NaN products fall back to the cap
        Duration::try_from_secs_f64(base * self.config.backoff_multiplier.powi(exponent))
            .map_or(max, |delay| delay.min(max))
    }

    /// Get the retry configuration
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}

//! Exponential-backoff retry for idempotent NodeODM calls.
//!
//! Only transient failures (connection errors, 5xx) are retried, and
//! only for requests that are safe to repeat (info, downloads). Task
//! creation is never retried here since a duplicate submission would
//! start a second remote job.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::NodeOdmError;

/// Tunable parameters for the exponential-backoff strategy.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
    /// Total attempts including the first one.
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            max_attempts: 4,
        }
    }
}

/// Calculate the next backoff delay from the current delay and config.
///
/// The result is clamped to [`RetryConfig::max_delay`].
pub fn next_delay(current: Duration, config: &RetryConfig) -> Duration {
    let next_ms = (current.as_millis() as f64 * config.multiplier) as u64;
    Duration::from_millis(next_ms).min(config.max_delay)
}

/// Run `op` until it succeeds, fails permanently, runs out of attempts,
/// or `cancel` is triggered (which yields [`NodeOdmError::Cancelled`]).
pub async fn with_backoff<T, F, Fut>(
    label: &str,
    config: &RetryConfig,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T, NodeOdmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, NodeOdmError>>,
{
    let mut delay = config.initial_delay;
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(NodeOdmError::Cancelled),
            result = op() => result,
        };

        match result {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < config.max_attempts => {
                tracing::warn!(
                    operation = label,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "NodeODM call failed, retrying",
                );
            }
            Err(e) => return Err(e),
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(NodeOdmError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }

        delay = next_delay(delay, config);
    }
}

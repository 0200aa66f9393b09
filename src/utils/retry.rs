use std::time::Duration;
use tokio::time::sleep;

// ============================================================================
// Exponential Backoff Retry
// ============================================================================
//
// The worker retries idempotent store operations (the load and the
// conditional commit) on transient failures. Permanent failures are
// returned immediately so a broken statement never burns retry budget.
//
// ============================================================================

#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for the backoff delay.
    pub max_delay: Duration,
    /// Backoff multiplier applied after each failed attempt.
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

/// Classifies an error as retryable or not.
pub trait IsTransient {
    fn is_transient(&self) -> bool;
}

#[derive(Debug)]
pub enum RetryResult<T, E> {
    Success(T),
    /// Transient failure that outlived the retry budget.
    Exhausted(E),
    /// Permanent failure; no retry was attempted.
    PermanentFailure(E),
}

/// Run `operation` until it succeeds, fails permanently, or the attempt
/// budget is spent. The delay grows exponentially up to `max_delay`.
pub async fn retry_on_transient<F, Fut, T, E>(
    config: &RetryConfig,
    mut operation: F,
) -> RetryResult<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display + IsTransient,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;

        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(attempt, "Operation succeeded after retry");
                }
                return RetryResult::Success(value);
            }
            Err(error) if !error.is_transient() => {
                tracing::error!(error = %error, "Permanent failure, not retrying");
                return RetryResult::PermanentFailure(error);
            }
            Err(error) => {
                if attempt >= config.max_attempts {
                    tracing::error!(
                        attempt,
                        error = %error,
                        "Operation failed after all retries"
                    );
                    return RetryResult::Exhausted(error);
                }

                tracing::warn!(
                    attempt,
                    error = %error,
                    delay_ms = delay.as_millis(),
                    "Transient failure, retrying after delay"
                );

                sleep(delay).await;

                delay = Duration::from_millis(
                    ((delay.as_millis() as f64) * config.multiplier) as u64,
                )
                .min(config.max_delay);
            }
        }
    }
}

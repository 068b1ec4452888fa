//! Bounded retries for optimistic catalog writes.
//!
//! Reconciliations are computed against a catalog revision and rejected by
//! the store with [`crate::RbacError::Conflict`] when another writer got
//! there first. [`with_retry_if`] recomputes and resubmits the write a
//! bounded number of times, backing off exponentially between attempts.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Backoff policy for retried writes.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    pub max_attempts: u32,

    /// Delay before the second attempt
    pub initial_delay: Duration,

    /// Upper bound for any single delay
    pub max_delay: Duration,

    /// Growth factor applied to the delay after each failed attempt
    pub exponential_base: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(1),
            exponential_base: 2.0,
        }
    }
}

impl RetryConfig {
    /// Policy with the given attempt budget and first delay.
    ///
    /// # Arguments
    ///
    /// * `max_attempts` - Total attempts; values below one are raised to one
    /// * `initial_delay` - Delay before the second attempt
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            ..Self::default()
        }
    }

    /// The default policy.
    pub fn standard() -> Self {
        Self::default()
    }

    /// Policy that gives up after the first failure.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            exponential_base: 1.0,
        }
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        Duration::from_secs_f64(
            (delay.as_secs_f64() * self.exponential_base).min(self.max_delay.as_secs_f64()),
        )
    }
}

/// Run `f` until it succeeds, fails with a non-retryable error, or the
/// attempt budget is spent.
///
/// # Arguments
///
/// * `config` - Backoff policy
/// * `f` - Operation to run; called once per attempt
/// * `is_retryable` - Decides whether an error warrants another attempt
///
/// # Returns
///
/// The first success, or the last error seen.
///
/// # Example
///
/// ```rust,no_run
/// use platform_rbac::retry::{with_retry_if, RetryConfig};
/// use platform_rbac::RbacError;
///
/// async fn example() -> Result<u32, RbacError> {
///     with_retry_if(
///         &RetryConfig::default(),
///         || async { Ok(7) },
///         RbacError::is_retryable,
///     )
///     .await
/// }
/// ```
pub async fn with_retry_if<F, Fut, T, E, P>(
    config: &RetryConfig,
    mut f: F,
    mut is_retryable: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Debug,
    P: FnMut(&E) -> bool,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;

        match f().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(attempts = attempt, "Write succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if !is_retryable(&e) => return Err(e),
            Err(e) if attempt >= config.max_attempts => {
                tracing::error!(attempts = attempt, error = ?e, "Retry budget exhausted");
                return Err(e);
            }
            Err(e) => {
                tracing::warn!(
                    attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = ?e,
                    "Write conflicted, retrying"
                );
                sleep(delay).await;
                delay = config.next_delay(delay);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RbacError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn quick(max_attempts: u32) -> RetryConfig {
        RetryConfig::new(max_attempts, Duration::from_millis(1))
    }

    #[test]
    fn test_backoff_is_capped() {
        let config = RetryConfig {
            max_attempts: 5,
            initial_delay: Duration::from_millis(400),
            max_delay: Duration::from_secs(1),
            exponential_base: 2.0,
        };
        assert_eq!(config.next_delay(Duration::from_millis(400)), Duration::from_millis(800));
        assert_eq!(config.next_delay(Duration::from_millis(800)), Duration::from_secs(1));
        assert_eq!(RetryConfig::new(0, Duration::ZERO).max_attempts, 1);
        assert_eq!(RetryConfig::standard(), RetryConfig::default());
        assert_eq!(RetryConfig::no_retry().max_attempts, 1);
    }

    #[tokio::test]
    async fn test_conflicts_are_retried() {
        let counter = Arc::new(AtomicU32::new(0));

        let result = with_retry_if(
            &quick(3),
            || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(RbacError::Conflict("stale revision".to_string()))
                    } else {
                        Ok("applied")
                    }
                }
            },
            RbacError::is_retryable,
        )
        .await;

        assert_eq!(result.unwrap(), "applied");
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_budget_is_respected() {
        let counter = Arc::new(AtomicU32::new(0));

        let result: Result<(), RbacError> = with_retry_if(
            &quick(2),
            || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(RbacError::Conflict("stale revision".to_string()))
                }
            },
            RbacError::is_retryable,
        )
        .await;

        assert!(matches!(result, Err(RbacError::Conflict(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_other_errors_return_immediately() {
        let counter = Arc::new(AtomicU32::new(0));

        let result: Result<(), RbacError> = with_retry_if(
            &quick(5),
            || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(RbacError::Validation("bad code".to_string()))
                }
            },
            RbacError::is_retryable,
        )
        .await;

        assert!(matches!(result, Err(RbacError::Validation(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}

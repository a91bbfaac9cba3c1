//! Retry with failure classification and exponential backoff

use std::future::Future;
use std::time::Duration;

use crate::{Error, Result};

/// Retry policy for backend calls
///
/// `max_attempts` counts every attempt, including the first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts
    pub max_attempts: u32,
    /// Base delay between retries (doubles each attempt)
    pub base_delay: Duration,
    /// Maximum delay cap
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Compute the delay after a failed `attempt` (1-based)
    ///
    /// An explicit `retry_after` wins, then the classification's fixed delay,
    /// then `base_delay * 2^(attempt - 1)`. The result is capped at `max_delay`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32, error: &Error) -> Duration {
        let delay = error
            .retry_after()
            .or_else(|| error.kind().suggested_delay())
            .unwrap_or_else(|| {
                self.base_delay
                    .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
            });
        delay.min(self.max_delay)
    }
}

/// Runs an async operation under a [`RetryPolicy`]
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    #[must_use]
    pub const fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or the attempt ceiling is reached
    ///
    /// `operation` receives the 1-based attempt number.
    ///
    /// # Errors
    ///
    /// Returns the last failure unmodified
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match operation(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(attempt, "backend call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) => {
                    let kind = error.kind();
                    if !error.is_retryable() {
                        tracing::debug!(attempt, %kind, error = %error, "non-retryable failure");
                        return Err(error);
                    }
                    if attempt >= max_attempts {
                        tracing::warn!(attempt, %kind, error = %error, "retry attempts exhausted");
                        return Err(error);
                    }

                    let delay = self.policy.delay_for(attempt, &error);
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        %kind,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %error,
                        "backend call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::ErrorKind;

    fn executor(max_attempts: u32) -> RetryExecutor {
        RetryExecutor::new(RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(120),
        })
    }

    #[test]
    fn exponential_backoff() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(100),
            ..RetryPolicy::default()
        };
        let err = Error::backend(ErrorKind::Network, "reset");

        assert_eq!(policy.delay_for(1, &err), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2, &err), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3, &err), Duration::from_millis(400));
    }

    #[test]
    fn class_delays() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.delay_for(1, &Error::backend(ErrorKind::RateLimit, "quota")),
            Duration::from_secs(60)
        );
        assert_eq!(
            policy.delay_for(3, &Error::backend(ErrorKind::ServiceUnavailable, "down")),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn explicit_retry_after_overrides() {
        let policy = RetryPolicy::default();
        let err = Error::Backend {
            kind: ErrorKind::RateLimit,
            message: "slow down".to_string(),
            retry_after: Some(Duration::from_secs(7)),
        };
        assert_eq!(policy.delay_for(1, &err), Duration::from_secs(7));
    }

    #[test]
    fn delay_capped_at_max() {
        let policy = RetryPolicy {
            base_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(15),
            ..RetryPolicy::default()
        };
        let err = Error::backend(ErrorKind::Unknown, "?");
        assert_eq!(policy.delay_for(4, &err), Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn network_failures_use_every_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<()> = executor(4)
            .run(|_| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(Error::backend(ErrorKind::Network, "connection reset"))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        match result {
            Err(Error::Backend { kind, message, .. }) => {
                assert_eq!(kind, ErrorKind::Network);
                assert_eq!(message, "connection reset");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_fails_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<()> = executor(5)
            .run(|_| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(Error::backend(ErrorKind::Authentication, "bad key"))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            result,
            Err(Error::Backend {
                kind: ErrorKind::Authentication,
                ..
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_failure() {
        let start = tokio::time::Instant::now();
        let result = executor(3)
            .run(|attempt| async move {
                if attempt < 3 {
                    Err(Error::Timeout(Duration::from_secs(1)))
                } else {
                    Ok(attempt)
                }
            })
            .await
            .unwrap();

        assert_eq!(result, 3);
        // 100ms after the first failure, 200ms after the second
        assert_eq!(start.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_waits_suggested_delay() {
        let start = tokio::time::Instant::now();
        let result = executor(2)
            .run(|attempt| async move {
                if attempt == 1 {
                    Err(Error::backend(ErrorKind::RateLimit, "quota"))
                } else {
                    Ok(())
                }
            })
            .await;

        assert!(result.is_ok());
        assert_eq!(start.elapsed(), Duration::from_secs(60));
    }
}

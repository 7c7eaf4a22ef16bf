//! Rate-limit retry policy.
//!
//! Only rate-limit errors are retried. Everything else is returned to the
//! caller on the first failure.

use std::future::Future;
use std::time::Duration;

use cybozu2gcal_core::SyncConfig;
use cybozu2gcal_providers::ProviderResult;
use tracing::warn;

/// How long to wait after a rate-limit response, and how often to try.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Cooldown before the first retry.
    pub delay: Duration,
    /// Factor applied to the cooldown after each retry.
    pub backoff_multiplier: f64,
    /// Upper bound for the cooldown.
    pub max_delay: Duration,
    /// Total attempts per call, including the first. `None` is unbounded.
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(10),
            backoff_multiplier: 1.0,
            max_delay: Duration::from_secs(300),
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    /// Creates a fixed-delay policy.
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            max_delay: delay.max(Self::default().max_delay),
            ..Default::default()
        }
    }

    /// Builds the policy from the run configuration.
    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.retry_delay).with_max_attempts(config.retry_max_attempts)
    }

    /// Builder: bound the number of attempts.
    pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Cooldown after the given number of rate-limited attempts.
    pub fn delay_for(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(failures - 1).unwrap_or(i32::MAX);
        let delay = self.delay.as_secs_f64() * self.backoff_multiplier.max(1.0).powi(exponent);
        Duration::try_from_secs_f64(delay)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Runs `op`, sleeping and trying again while it reports a rate limit.
    ///
    /// Returns the first result that is not a rate limit, or the last rate
    /// limit error once `max_attempts` is reached.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> ProviderResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ProviderResult<T>>,
    {
        let mut failures = 0u32;
        loop {
            match op().await {
                Err(e) if e.is_rate_limited() => {
                    failures += 1;
                    if self.max_attempts.is_some_and(|max| failures >= max) {
                        warn!(operation = what, attempts = failures, "rate limited, giving up");
                        return Err(e);
                    }

                    let delay = self.delay_for(failures);
                    warn!(
                        operation = what,
                        attempt = failures,
                        delay_secs = delay.as_secs_f64(),
                        "rate limited, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use cybozu2gcal_providers::{ProviderError, ProviderErrorCode};

    #[test]
    fn default_is_fixed_ten_seconds() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::ZERO);
        assert_eq!(policy.delay_for(1), Duration::from_secs(10));
        assert_eq!(policy.delay_for(7), Duration::from_secs(10));
        assert!(policy.max_attempts.is_none());
    }

    #[test]
    fn backoff_is_capped() {
        let policy = RetryPolicy {
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(60),
            ..RetryPolicy::new(Duration::from_secs(5))
        };
        assert_eq!(policy.delay_for(1), Duration::from_secs(5));
        assert_eq!(policy.delay_for(2), Duration::from_secs(10));
        assert_eq!(policy.delay_for(3), Duration::from_secs(20));
        assert_eq!(policy.delay_for(10), Duration::from_secs(60));
    }

    #[test]
    fn huge_delays_fall_back_to_the_cap() {
        let policy = RetryPolicy::new(Duration::from_secs(u64::MAX));
        assert_eq!(policy.delay_for(1), Duration::from_secs(u64::MAX));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(u64::MAX));

        let policy = RetryPolicy {
            backoff_multiplier: f64::MAX,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_for(3), Duration::from_secs(300));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_rate_limits_until_success() {
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();

        let result = RetryPolicy::default()
            .run("update", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ProviderError::rate_limited("slow down"))
                } else {
                    Ok("done")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() >= Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn other_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: ProviderResult<()> = RetryPolicy::default()
            .run("insert", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ProviderError::server("boom"))
            })
            .await;

        assert_eq!(result.unwrap_err().code(), ProviderErrorCode::Server);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: ProviderResult<()> = RetryPolicy::default()
            .with_max_attempts(Some(3))
            .run("delete", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ProviderError::rate_limited("slow down"))
            })
            .await;

        assert!(result.unwrap_err().is_rate_limited());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}

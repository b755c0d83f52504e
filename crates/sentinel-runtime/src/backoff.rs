//! Exponential backoff executor
//!
//! Runs an async operation under the Network recovery policy: retry on
//! failure with a doubling delay from 100 ms capped at 5 s, at most six
//! attempts. On exhaustion the last error is returned so the caller can
//! escalate the severity.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

/// Retry schedule parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub factor: u32,
    pub cap: Duration,
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(100),
            factor: 2,
            cap: Duration::from_secs(5),
            max_attempts: 6,
        }
    }
}

impl BackoffPolicy {
    /// Delay before attempt `n` (0-based; the first attempt has none).
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = self.factor.max(1).saturating_pow(attempt - 1);
        self.initial.saturating_mul(factor).min(self.cap)
    }

    /// Run `operation` until it succeeds or the attempt budget runs out.
    pub async fn run<T, E, F, Fut>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 0;
        loop {
            let delay = self.delay_before(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt + 1 < self.max_attempts => {
                    debug!(attempt, %err, "retrying after backoff");
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_schedule_doubles_and_caps() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_before(0), Duration::ZERO);
        assert_eq!(policy.delay_before(1), Duration::from_millis(100));
        assert_eq!(policy.delay_before(2), Duration::from_millis(200));
        assert_eq!(policy.delay_before(3), Duration::from_millis(400));
        assert_eq!(policy.delay_before(6), Duration::from_millis(3_200));
        assert_eq!(policy.delay_before(7), Duration::from_secs(5));
        assert_eq!(policy.delay_before(20), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let result: Result<u32, &str> = BackoffPolicy::default()
            .run(|| {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 3 {
                        Err("link down")
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;
        assert_eq!(result, Ok(7));
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_last_error() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        let result: Result<(), &str> = BackoffPolicy::default()
            .run(|| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err("still down")
                }
            })
            .await;
        assert_eq!(result, Err("still down"));
        assert_eq!(attempts.load(Ordering::SeqCst), 6);
    }
}

//! Retry with capped exponential backoff for transient store failures.

use crate::errors::{KenoError, KenoResult};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// `None` retries forever
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    pub fn fixed(delay: Duration, max_attempts: u32) -> Self {
        Self {
            initial_delay: delay,
            max_delay: delay,
            max_attempts: Some(max_attempts),
        }
    }

    pub fn exponential(initial_delay: Duration, max_delay: Duration, max_attempts: Option<u32>) -> Self {
        Self {
            initial_delay,
            max_delay,
            max_attempts,
        }
    }

    /// Delay before retry number `attempt` (1-based): doubles each time, capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1).min(16));
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }

    fn exhausted(&self, attempt: u32) -> bool {
        self.max_attempts.map_or(false, |max| attempt >= max)
    }
}

/// Run `op` until it succeeds, fails with a non-transient error, or the policy
/// runs out of attempts. Returns the last error together with the attempt count.
pub async fn retry_transient<T, F, Fut>(policy: RetryPolicy, op_name: &str, mut op: F) -> Result<T, (KenoError, u32)>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = KenoResult<T>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && !policy.exhausted(attempt) => {
                let delay = policy.delay_for(attempt);
                warn!(
                    op = op_name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient store error, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err((e, attempt)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{BetError, StorageError};
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = RetryPolicy::exponential(Duration::from_millis(100), Duration::from_millis(700), None);
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for(4), Duration::from_millis(700));
        assert_eq!(policy.delay_for(60), Duration::from_millis(700));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::fixed(Duration::from_secs(2), 5);
        let result = retry_transient(policy, "write", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(KenoError::from(StorageError::Unavailable("down".into())))
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(result.ok(), Some(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let policy = RetryPolicy::fixed(Duration::from_millis(10), 3);
        let result: Result<(), _> = retry_transient(policy, "write", || async {
            Err(KenoError::from(StorageError::WriteFailed("disk".into())))
        })
        .await;
        let (err, attempts) = result.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_fail_fast() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_transient(RetryPolicy::fixed(Duration::from_secs(60), 10), "bet", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(KenoError::from(BetError::NoActiveRound))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

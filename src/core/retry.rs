/*!
 * Whole-object retry with fixed or exponential backoff
 */

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::job::CopyJob;
use crate::error::{CopyError, CopyResult};

/// Largest doubling applied to the base delay
const MAX_BACKOFF_SHIFT: u32 = 16;

/// How the delay between attempts evolves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackoffStrategy {
    /// Same delay before every retry
    #[default]
    Fixed,
    /// Delay doubles after every failed attempt
    Exponential,
}

/// Bounded retry settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, first one included
    pub max_attempts: u32,
    pub delay: Duration,
    pub backoff: BackoffStrategy,
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            backoff: BackoffStrategy::Fixed,
        }
    }

    pub fn exponential(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            backoff: BackoffStrategy::Exponential,
        }
    }

    pub fn from_job(job: &CopyJob) -> Self {
        if job.exponential_backoff {
            Self::exponential(job.max_retry, job.retry_delay)
        } else {
            Self::fixed(job.max_retry, job.retry_delay)
        }
    }

    /// Delay to wait before `attempt` (2 for the first retry)
    pub fn delay_before(&self, attempt: u32) -> Duration {
        match self.backoff {
            BackoffStrategy::Fixed => self.delay,
            BackoffStrategy::Exponential => {
                let shift = attempt.saturating_sub(2).min(MAX_BACKOFF_SHIFT);
                self.delay.saturating_mul(1 << shift)
            }
        }
    }
}

/// Run `operation` until it succeeds, fails permanently or runs out of attempts
///
/// The closure receives the 1-based attempt number. Errors that are not
/// retryable are returned as-is; exhausting the attempts yields
/// [`CopyError::RetriesExhausted`] carrying the last error. Cancelling `cancel`
/// interrupts a pending delay and prevents further attempts.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut operation: F,
) -> CopyResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = CopyResult<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        if cancel.is_cancelled() {
            return Err(CopyError::Cancelled);
        }

        let error = match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => e,
        };

        if attempt >= max_attempts {
            return Err(CopyError::RetriesExhausted {
                attempts: attempt,
                last: Box::new(error),
            });
        }

        let delay = policy.delay_before(attempt + 1);
        warn!(
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "attempt failed, retrying"
        );

        tokio::select! {
            _ = cancel.cancelled() => return Err(CopyError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    fn transient(key: &str) -> CopyError {
        CopyError::ObjectReadFailure {
            key: key.to_string(),
            source: StorageError::Network("connection reset".to_string()),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_two_failures() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::fixed(5, Duration::from_secs(5));
        let start = Instant::now();

        let result = with_retry(&policy, &CancellationToken::new(), |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n <= 2 {
                    Err(transient("k"))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Slept exactly twice
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_attempts() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::fixed(3, Duration::from_secs(5));

        let result: CopyResult<()> = with_retry(&policy, &CancellationToken::new(), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(transient("k")) }
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(err, CopyError::RetriesExhausted { attempts: 3, .. }));
        assert!(err.to_string().contains("3 attempts"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_not_retried() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::fixed(5, Duration::from_secs(5));

        let result: CopyResult<()> = with_retry(&policy, &CancellationToken::new(), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(CopyError::InvalidLocator("bad".to_string())) }
        })
        .await;

        assert!(matches!(result, Err(CopyError::InvalidLocator(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_passes_attempt_number() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let policy = RetryPolicy::fixed(3, Duration::from_millis(10));

        let _: CopyResult<()> = with_retry(&policy, &CancellationToken::new(), |attempt| {
            seen.lock().unwrap().push(attempt);
            async { Err(transient("k")) }
        })
        .await;

        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_delay() {
        let cancel = CancellationToken::new();
        let policy = RetryPolicy::fixed(5, Duration::from_secs(60));
        let calls = AtomicU32::new(0);

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let result: CopyResult<()> = with_retry(&policy, &cancel, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(transient("k")) }
        })
        .await;

        assert!(matches!(result, Err(CopyError::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(start.elapsed() < Duration::from_secs(60));
    }

    #[test]
    fn test_exponential_delays() {
        let policy = RetryPolicy::exponential(5, Duration::from_secs(1));
        assert_eq!(policy.delay_before(2), Duration::from_secs(1));
        assert_eq!(policy.delay_before(3), Duration::from_secs(2));
        assert_eq!(policy.delay_before(4), Duration::from_secs(4));

        let fixed = RetryPolicy::fixed(5, Duration::from_secs(5));
        assert_eq!(fixed.delay_before(4), Duration::from_secs(5));
    }
}

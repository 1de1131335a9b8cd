//! Exponential backoff with jitter for broker calls.
//! Grounded on the original implementation's `kia/retry.py`.

use ktengine_core::{EngineError, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

pub const DEFAULT_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(200);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(2000);

fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let exp = base.as_secs_f64() * 2f64.powi((attempt - 1) as i32);
    let capped = exp.min(max.as_secs_f64());
    let jitter = rand::thread_rng().gen_range(0.0..0.1);
    Duration::from_secs_f64(capped + jitter)
}

/// Sleeps for the backoff duration of a given attempt. Exposed so callers
/// that can't thread their operation through a generic closure (the live
/// broker client's multi-branch retry handling) can still reuse the same
/// delay schedule as [`execute_with_retry`].
pub async fn sleep_with_backoff(attempt: u32, base: Duration, max: Duration) {
    tokio::time::sleep(backoff_delay(attempt, base, max)).await;
}

/// Runs `operation` up to `attempts` times, sleeping with exponential backoff
/// plus jitter between tries. `should_retry` decides whether a given error
/// on a given attempt number is worth retrying; the last attempt always
/// returns its error regardless.
pub async fn execute_with_retry<T, F, Fut, ShouldRetry>(
    mut operation: F,
    should_retry: ShouldRetry,
    attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
    ShouldRetry: Fn(&EngineError, u32) -> bool,
{
    let mut last_error = None;
    for attempt in 1..=attempts {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= attempts || !should_retry(&err, attempt) {
                    return Err(err);
                }
                last_error = Some(err);
                tokio::time::sleep(backoff_delay(attempt, base_delay, max_delay)).await;
            }
        }
    }
    Err(last_error.expect("loop always assigns last_error before exhausting attempts"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let result: Result<i32> = execute_with_retry(
            |_attempt| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(EngineError::KiaApiTimeout)
                    } else {
                        Ok(42)
                    }
                }
            },
            |_err, _attempt| true,
            DEFAULT_ATTEMPTS,
            Duration::from_millis(1),
            Duration::from_millis(5),
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stops_when_should_retry_returns_false() {
        let calls = AtomicU32::new(0);
        let result: Result<i32> = execute_with_retry(
            |_attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Err(EngineError::KiaAuthForbidden) }
            },
            |err, _attempt| err.retryable(),
            DEFAULT_ATTEMPTS,
            Duration::from_millis(1),
            Duration::from_millis(5),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_all_attempts_then_returns_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<i32> = execute_with_retry(
            |_attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Err(EngineError::KiaRateLimited) }
            },
            |_err, _attempt| true,
            DEFAULT_ATTEMPTS,
            Duration::from_millis(1),
            Duration::from_millis(5),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), DEFAULT_ATTEMPTS);
    }
}

//! Retry utility with exponential backoff
//!
//! Retrieval itself never retries; callers that want to ride out a briefly
//! unreachable agent wrap `Retriever::retrieve` with this.

use std::time::Duration;
use tracing::warn;

const MAX_DELAY: Duration = Duration::from_secs(30);

/// Retry an async operation with exponential backoff.
///
/// Runs `f` once plus up to `retries` more times while `should_retry` accepts
/// the error. Returns the first success, or the last error.
/// Delays: `initial_delay`, `2 * initial_delay`, `4 * initial_delay`, ... capped at 30s.
pub async fn retry_with_backoff<F, Fut, T, E, R>(
    operation_name: &str,
    retries: u32,
    initial_delay: Duration,
    should_retry: R,
    mut f: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    R: Fn(&E) -> bool,
{
    let attempts = retries.saturating_add(1);
    let mut delay = initial_delay;
    let mut attempt = 1;

    loop {
        match f().await {
            Ok(val) => return Ok(val),
            Err(e) if attempt < attempts && should_retry(&e) => {
                warn!(
                    "{} failed (attempt {}/{}): {}",
                    operation_name, attempt, attempts, e
                );
                tokio::time::sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_succeeds_first_try() {
        let result: Result<&str, String> = retry_with_backoff(
            "test",
            3,
            Duration::from_millis(1),
            |_| true,
            || async { Ok("done") },
        )
        .await;
        assert_eq!(result.unwrap(), "done");
    }

    #[tokio::test]
    async fn test_succeeds_after_retries() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();
        let result: Result<&str, String> = retry_with_backoff(
            "test",
            2,
            Duration::from_millis(1),
            |_| true,
            move || {
                let counter = counter_clone.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::Relaxed);
                    if n < 2 {
                        Err(format!("fail #{}", n))
                    } else {
                        Ok("done")
                    }
                }
            },
        )
        .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(counter.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn test_all_attempts_fail() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();
        let result: Result<(), String> = retry_with_backoff(
            "test",
            1,
            Duration::from_millis(1),
            |_| true,
            move || {
                counter_clone.fetch_add(1, Ordering::Relaxed);
                async { Err("always fails".to_string()) }
            },
        )
        .await;
        assert_eq!(result.unwrap_err(), "always fails");
        assert_eq!(counter.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();
        let result: Result<(), String> = retry_with_backoff(
            "test",
            5,
            Duration::from_millis(1),
            |e: &String| !e.starts_with("fatal"),
            move || {
                counter_clone.fetch_add(1, Ordering::Relaxed);
                async { Err("fatal: version mismatch".to_string()) }
            },
        )
        .await;
        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_zero_retries_runs_once() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();
        let result: Result<(), String> = retry_with_backoff(
            "test",
            0,
            Duration::from_millis(1),
            |_| true,
            move || {
                counter_clone.fetch_add(1, Ordering::Relaxed);
                async { Err("down".to_string()) }
            },
        )
        .await;
        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::Relaxed), 1);
    }
}

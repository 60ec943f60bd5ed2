//! Fixed-delay retry for reading finished outputs.
//!
//! The backend can report a prompt as finished a moment before its output
//! appears in `/history`. [`retry_fixed`] re-runs an attempt a bounded
//! number of times with a constant pause between attempts.

use std::future::Future;
use std::time::Duration;

/// Retry policy for output fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchRetryConfig {
    /// Total attempts, including the first. Zero is treated as one.
    pub attempts: u32,
    /// Pause between consecutive attempts.
    pub delay: Duration,
}

impl Default for FetchRetryConfig {
    fn default() -> Self {
        Self {
            attempts: 8,
            delay: Duration::from_secs(1),
        }
    }
}

/// Run `attempt` until it yields `Some`, at most `config.attempts` times.
///
/// The attempt number (starting at 1) is passed to the closure. Sleeps only
/// between attempts, never after the last one.
pub async fn retry_fixed<T, F, Fut>(config: &FetchRetryConfig, mut attempt: F) -> Option<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let attempts = config.attempts.max(1);
    for n in 1..=attempts {
        if let Some(value) = attempt(n).await {
            return Some(value);
        }
        if n < attempts {
            tokio::time::sleep(config.delay).await;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn defaults_are_eight_attempts_one_second_apart() {
        let config = FetchRetryConfig::default();
        assert_eq!(config.attempts, 8);
        assert_eq!(config.delay, Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_last_attempt() {
        let config = FetchRetryConfig::default();
        let started = tokio::time::Instant::now();
        let result = retry_fixed(&config, |n| async move { (n == 8).then_some(n) }).await;
        assert_eq!(result, Some(8));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(7) && elapsed < Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_all_attempts() {
        let calls = AtomicU32::new(0);
        let config = FetchRetryConfig::default();
        let started = tokio::time::Instant::now();
        let result: Option<()> = retry_fixed(&config, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { None }
        })
        .await;
        assert!(result.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 8);
        assert!(started.elapsed() < Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn first_success_does_not_sleep() {
        let config = FetchRetryConfig::default();
        let started = tokio::time::Instant::now();
        assert_eq!(retry_fixed(&config, |_| async { Some("ok") }).await, Some("ok"));
        assert!(started.elapsed() < Duration::from_millis(1));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_attempts_still_tries_once() {
        let config = FetchRetryConfig {
            attempts: 0,
            delay: Duration::from_millis(10),
        };
        assert_eq!(retry_fixed(&config, |n| async move { Some(n) }).await, Some(1));
    }
}

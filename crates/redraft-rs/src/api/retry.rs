//! Automatic retry with exponential backoff and jitter.
//!
//! Retries transient failures (429, 5xx, network timeouts) with configurable
//! exponential backoff. Blocked and empty responses are never retried.
//!
//! The retry loop is a bounded [`Backoff`] state driven by a [`RetryConfig`].
//! Sleeping goes through the [`Sleeper`] trait so the delay schedule can be
//! observed in tests without waiting on a real clock.

use super::completion::CompletionFailure;
use futures::future::BoxFuture;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt (0 = fail immediately).
    pub max_retries: u32,
    /// Initial delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Backoff multiplier (typically 2.0 for exponential backoff).
    pub multiplier: f64,
    /// Whether to add jitter to prevent thundering herd.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Create a config with the given number of retries. Uses sensible defaults.
    pub fn with_retries(retries: u32) -> Self {
        Self {
            max_retries: retries,
            ..Default::default()
        }
    }

    /// Calculate the delay for a given retry number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_secs_f64());

        if self.jitter {
            // Deterministic jitter keyed on the attempt number; no rand dependency.
            let jitter_factor = match attempt % 4 {
                0 => 0.75,
                1 => 0.90,
                2 => 0.60,
                3 => 0.85,
                _ => 0.80,
            };
            Duration::from_secs_f64(capped * jitter_factor)
        } else {
            Duration::from_secs_f64(capped)
        }
    }
}

/// Bounded attempt counter over a [`RetryConfig`].
///
/// Each call to [`next_delay`](Self::next_delay) consumes one retry and
/// returns how long to wait before it, or `None` once the budget is spent.
#[derive(Debug)]
pub struct Backoff<'a> {
    config: &'a RetryConfig,
    retries_used: u32,
}

impl<'a> Backoff<'a> {
    pub fn new(config: &'a RetryConfig) -> Self {
        Self {
            config,
            retries_used: 0,
        }
    }

    /// Number of attempts made so far, counting the first one.
    pub fn attempts(&self) -> u32 {
        self.retries_used + 1
    }

    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.retries_used >= self.config.max_retries {
            return None;
        }
        let delay = self.config.delay_for_attempt(self.retries_used);
        self.retries_used += 1;
        Some(delay)
    }
}

/// Suspends the retry loop between attempts.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, delay: Duration) -> BoxFuture<'_, ()>;
}

/// Real-clock sleeper backed by `tokio::time::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, delay: Duration) -> BoxFuture<'_, ()> {
        Box::pin(tokio::time::sleep(delay))
    }
}

/// HTTP statuses worth another attempt.
pub fn is_transient_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
}

/// Whether an API error message reads as rate limiting or a temporary outage.
pub fn is_transient_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    [
        "rate limit",
        "rate-limit",
        "rate_limit",
        "too many requests",
        "overloaded",
        "temporarily unavailable",
        "try again",
        "timeout",
        "timed out",
    ]
    .iter()
    .any(|p| lower.contains(p))
}

/// Whether an API error message reads as a content-policy rejection.
pub fn is_policy_rejection(message: &str) -> bool {
    let lower = message.to_lowercase();
    [
        "content_filter",
        "content filter",
        "moderation",
        "flagged",
        "policy",
        "safety",
        "blocked",
    ]
    .iter()
    .any(|p| lower.contains(p))
}

/// Run `call` until it succeeds, fails non-transiently, or the retry budget
/// runs out. The closure is expected to resend the same payload each time.
pub async fn retry_with_backoff<T, F, Fut>(
    config: &RetryConfig,
    sleeper: &dyn Sleeper,
    mut call: F,
) -> Result<T, CompletionFailure>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CompletionFailure>>,
{
    let mut backoff = Backoff::new(config);
    loop {
        match call().await {
            Ok(v) => return Ok(v),
            Err(CompletionFailure::Transient { detail, .. }) => match backoff.next_delay() {
                Some(delay) => {
                    warn!(
                        "Transient API error (attempt {}/{}): {detail}. Retrying in {delay:?}...",
                        backoff.attempts() - 1,
                        config.max_retries + 1,
                    );
                    sleeper.sleep(delay).await;
                }
                None => {
                    return Err(CompletionFailure::Transient {
                        detail,
                        attempts: backoff.attempts(),
                    });
                }
            },
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct RecordingSleeper {
        delays: Mutex<Vec<Duration>>,
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, delay: Duration) -> BoxFuture<'_, ()> {
            self.delays.lock().unwrap().push(delay);
            Box::pin(async {})
        }
    }

    fn fast_config(retries: u32) -> RetryConfig {
        RetryConfig {
            jitter: false,
            initial_delay: Duration::from_millis(100),
            ..RetryConfig::with_retries(retries)
        }
    }

    #[test]
    fn with_retries_sets_count() {
        let config = RetryConfig::with_retries(5);
        assert_eq!(config.max_retries, 5);
    }

    #[test]
    fn delay_increases_exponentially() {
        let config = RetryConfig {
            jitter: false,
            ..RetryConfig::with_retries(5)
        };
        let d0 = config.delay_for_attempt(0);
        let d1 = config.delay_for_attempt(1);
        let d2 = config.delay_for_attempt(2);

        assert!(d1 > d0, "d1={d1:?} should be > d0={d0:?}");
        assert!(d2 > d1, "d2={d2:?} should be > d1={d1:?}");
    }

    #[test]
    fn delay_capped_at_max() {
        let config = RetryConfig {
            jitter: false,
            max_delay: Duration::from_secs(2),
            ..RetryConfig::with_retries(10)
        };
        assert!(config.delay_for_attempt(10) <= Duration::from_secs(2));
    }

    #[test]
    fn jitter_reduces_delay() {
        let jittered = RetryConfig::with_retries(3);
        let plain = RetryConfig {
            jitter: false,
            ..RetryConfig::with_retries(3)
        };
        assert!(jittered.delay_for_attempt(2) <= plain.delay_for_attempt(2));
    }

    #[test]
    fn backoff_is_bounded() {
        let config = fast_config(2);
        let mut backoff = Backoff::new(&config);
        assert_eq!(backoff.attempts(), 1);
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(100)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(200)));
        assert_eq!(backoff.next_delay(), None);
        assert_eq!(backoff.attempts(), 3);
    }

    #[test]
    fn transient_statuses() {
        for status in [408, 429, 500, 502, 503, 504] {
            assert!(is_transient_status(status), "{status}");
        }
        for status in [400, 401, 403, 404, 422] {
            assert!(!is_transient_status(status), "{status}");
        }
    }

    #[test]
    fn policy_rejections_detected() {
        assert!(is_policy_rejection("Request flagged by moderation"));
        assert!(is_policy_rejection("finish_reason: content_filter"));
        assert!(!is_policy_rejection("model not found"));
    }

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let config = fast_config(3);
        let sleeper = RecordingSleeper::default();
        let calls = AtomicU32::new(0);

        let result = retry_with_backoff(&config, &sleeper, || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(CompletionFailure::transient("HTTP 503"))
            } else {
                Ok("done")
            }
        })
        .await;

        assert_eq!(result, Ok("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            *sleeper.delays.lock().unwrap(),
            vec![Duration::from_millis(100), Duration::from_millis(200)]
        );
    }

    #[tokio::test]
    async fn exhaustion_reports_attempt_count() {
        let config = fast_config(2);
        let sleeper = RecordingSleeper::default();
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = retry_with_backoff(&config, &sleeper, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(CompletionFailure::transient("HTTP 429"))
        })
        .await;

        assert_eq!(
            result,
            Err(CompletionFailure::Transient {
                detail: "HTTP 429".into(),
                attempts: 3,
            })
        );
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(sleeper.delays.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn blocked_is_not_retried() {
        let config = fast_config(5);
        let sleeper = RecordingSleeper::default();
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = retry_with_backoff(&config, &sleeper, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(CompletionFailure::blocked("SAFETY"))
        })
        .await;

        assert_eq!(result, Err(CompletionFailure::blocked("SAFETY")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sleeper.delays.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_is_not_retried() {
        let config = fast_config(5);
        let sleeper = RecordingSleeper::default();
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = retry_with_backoff(&config, &sleeper, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(CompletionFailure::empty("no parts"))
        })
        .await;

        assert!(matches!(result, Err(CompletionFailure::Empty { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn zero_retries_fails_immediately() {
        let config = fast_config(0);
        let sleeper = RecordingSleeper::default();

        let result: Result<(), _> = retry_with_backoff(&config, &sleeper, || async {
            Err(CompletionFailure::transient("timed out"))
        })
        .await;

        assert_eq!(
            result,
            Err(CompletionFailure::Transient {
                detail: "timed out".into(),
                attempts: 1,
            })
        );
        assert!(sleeper.delays.lock().unwrap().is_empty());
    }
}

//! Retry executor (C2): classification, backoff, and the retry loop
//! that wraps a single async operation.
//!
//! An operation fails in one of two ways: retryable (429, 5xx,
//! network/timeout) or not (4xx other than 429, parse errors, explicit
//! "not retryable" failures). [`RetryPolicy::should_retry`] turns a
//! [`FailureType`] plus an attempt count into a [`RetryDecision`];
//! [`retry`] drives the loop and reports the final failure with the
//! operation name and source identifier attached.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, instrument, warn};

use super::DownloadError;

/// Default maximum total attempts (including the first).
pub const DEFAULT_MAX_RETRIES: u32 = 3;

const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60);
const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;
const MAX_JITTER: Duration = Duration::from_millis(250);

/// Classification of a failure for retry purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Transient: network/timeout/5xx. May succeed on retry.
    Transient,
    /// Permanent: 4xx other than 429, invalid URL, decode errors.
    Permanent,
    /// Server rate limiting (HTTP 429); retries with backoff, honoring
    /// `Retry-After` when present.
    RateLimited {
        /// Server-advertised minimum wait, if parsed successfully.
        retry_after: Option<Duration>,
    },
}

/// Decision on whether to retry a failed operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the given delay; `attempt` is the next attempt number.
    Retry { delay: Duration, attempt: u32 },
    /// Stop retrying, with a human-readable reason.
    DoNotRetry { reason: String },
}

/// The final, non-retryable failure of an operation, carrying the
/// context the spec requires: operation name and source identifier.
#[derive(Debug, thiserror::Error)]
#[error("{operation} failed for source {source}: {cause}")]
pub struct RetryExhausted {
    /// Name of the operation that was retried (for logging/diagnostics).
    pub operation: String,
    /// Source identifier the operation was performed on behalf of.
    pub source: String,
    /// The last failure observed.
    #[source]
    pub cause: DownloadError,
    /// Total attempts made.
    pub attempts: u32,
}

/// Exponential backoff policy with an optional deterministic mode.
///
/// `delay = min(base_delay * multiplier^(attempt-1), max_delay) + jitter`.
/// Per spec §4.2, the default is deterministic (no jitter); callers that
/// want jitter (to avoid thundering herds across many concurrent
/// adapters) opt in explicitly via [`RetryPolicy::with_jitter`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    backoff_multiplier: f64,
    jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            jitter: false,
        }
    }
}

impl RetryPolicy {
    /// Creates a retry policy with explicit settings (deterministic, no jitter).
    #[must_use]
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
            backoff_multiplier,
            jitter: false,
        }
    }

    /// Returns a copy of this policy with jitter enabled.
    #[must_use]
    pub fn with_jitter(mut self) -> Self {
        self.jitter = true;
        self
    }

    /// Returns a policy with a custom max_attempts, defaults otherwise.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Maximum total attempts configured (`max_retries + 1`).
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Determines whether to retry, given the failure classification and
    /// the attempt number that just failed (1-indexed).
    #[instrument(skip(self), fields(max_attempts = self.max_attempts))]
    pub fn should_retry(&self, failure_type: FailureType, attempt: u32) -> RetryDecision {
        if failure_type == FailureType::Permanent {
            return RetryDecision::DoNotRetry {
                reason: "permanent failure - retry would not help".to_string(),
            };
        }

        if attempt >= self.max_attempts {
            debug!(attempt, max = self.max_attempts, "max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }

        let mut delay = self.calculate_delay(attempt);
        if let FailureType::RateLimited {
            retry_after: Some(hint),
        } = failure_type
        {
            delay = delay.max(hint);
        }

        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }

    fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as f64;
        let exponent = f64::from(attempt - 1);
        let delay_ms = base_ms * self.backoff_multiplier.powf(exponent);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);

        let mut delay = Duration::from_millis(capped_ms as u64);
        if self.jitter {
            delay += self.calculate_jitter();
        }
        delay
    }

    fn calculate_jitter(&self) -> Duration {
        let mut rng = rand::thread_rng();
        let jitter_ms = rng.gen_range(0..=MAX_JITTER.as_millis() as u64);
        Duration::from_millis(jitter_ms)
    }
}

/// Classifies a [`DownloadError`] into a [`FailureType`] for retry decisions.
#[instrument]
pub fn classify_error(error: &DownloadError) -> FailureType {
    match error {
        DownloadError::HttpStatus {
            status,
            retry_after,
            ..
        } => classify_http_status(*status, retry_after.as_deref()),
        DownloadError::Timeout { .. } | DownloadError::Network { .. } => FailureType::Transient,
        DownloadError::InvalidUrl { .. } | DownloadError::Decode { .. } => FailureType::Permanent,
    }
}

fn classify_http_status(status: u16, retry_after: Option<&str>) -> FailureType {
    match status {
        429 => FailureType::RateLimited {
            retry_after: retry_after.and_then(super::rate_limiter::parse_retry_after),
        },
        500..=599 => FailureType::Transient,
        _ => FailureType::Permanent,
    }
}

/// Runs `operation` to produce `T`, retrying on retryable [`DownloadError`]s
/// per `policy`, up to `max_attempts` total tries. On exhaustion or a
/// non-retryable failure, returns [`RetryExhausted`] wrapping the final cause.
pub async fn retry_with<T, F, Fut>(
    policy: &RetryPolicy,
    operation_name: &str,
    source: &str,
    mut operation: F,
) -> Result<T, RetryExhausted>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DownloadError>>,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                let failure_type = classify_error(&error);
                match policy.should_retry(failure_type, attempt) {
                    RetryDecision::Retry { delay, attempt: next } => {
                        warn!(
                            operation = operation_name,
                            source,
                            attempt,
                            next_attempt = next,
                            delay_ms = delay.as_millis(),
                            error = %error,
                            "retrying after failure"
                        );
                        tokio::time::sleep(delay).await;
                        attempt = next;
                    }
                    RetryDecision::DoNotRetry { reason } => {
                        debug!(operation = operation_name, source, reason, "not retrying");
                        return Err(RetryExhausted {
                            operation: operation_name.to_string(),
                            source: source.to_string(),
                            cause: error,
                            attempts: attempt,
                        });
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn classify_429_is_rate_limited() {
        let error = DownloadError::http_status("https://x", 429);
        assert!(matches!(
            classify_error(&error),
            FailureType::RateLimited { .. }
        ));
    }

    #[test]
    fn classify_5xx_is_transient() {
        for status in [500, 502, 503, 504] {
            let error = DownloadError::http_status("https://x", status);
            assert_eq!(classify_error(&error), FailureType::Transient);
        }
    }

    #[test]
    fn classify_4xx_other_than_429_is_permanent() {
        for status in [400, 401, 403, 404] {
            let error = DownloadError::http_status("https://x", status);
            assert_eq!(classify_error(&error), FailureType::Permanent);
        }
    }

    #[test]
    fn classify_timeout_is_transient() {
        assert_eq!(
            classify_error(&DownloadError::timeout("https://x")),
            FailureType::Transient
        );
    }

    #[test]
    fn classify_invalid_url_is_permanent() {
        assert_eq!(
            classify_error(&DownloadError::invalid_url("bad")),
            FailureType::Permanent
        );
    }

    #[test]
    fn should_retry_permanent_never_retries() {
        let policy = RetryPolicy::default();
        let decision = policy.should_retry(FailureType::Permanent, 1);
        assert!(matches!(decision, RetryDecision::DoNotRetry { .. }));
    }

    #[test]
    fn should_retry_respects_max_attempts() {
        let policy = RetryPolicy::with_max_attempts(3);
        assert!(matches!(
            policy.should_retry(FailureType::Transient, 1),
            RetryDecision::Retry { .. }
        ));
        assert!(matches!(
            policy.should_retry(FailureType::Transient, 2),
            RetryDecision::Retry { .. }
        ));
        assert!(matches!(
            policy.should_retry(FailureType::Transient, 3),
            RetryDecision::DoNotRetry { .. }
        ));
    }

    #[test]
    fn delay_doubles_without_jitter() {
        let policy = RetryPolicy::new(5, Duration::from_secs(1), Duration::from_secs(60), 2.0);
        let d1 = policy.calculate_delay(1);
        let d2 = policy.calculate_delay(2);
        let d3 = policy.calculate_delay(3);
        assert_eq!(d1, Duration::from_secs(1));
        assert_eq!(d2, Duration::from_secs(2));
        assert_eq!(d3, Duration::from_secs(4));
    }

    #[test]
    fn delay_respects_ceiling() {
        let policy = RetryPolicy::new(10, Duration::from_secs(1), Duration::from_secs(5), 2.0);
        let delay = policy.calculate_delay(6);
        assert_eq!(delay, Duration::from_secs(5));
    }

    #[test]
    fn rate_limited_retry_after_extends_backoff() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100), Duration::from_secs(60), 2.0);
        let decision = policy.should_retry(
            FailureType::RateLimited {
                retry_after: Some(Duration::from_secs(5)),
            },
            1,
        );
        match decision {
            RetryDecision::Retry { delay, .. } => assert!(delay >= Duration::from_secs(5)),
            RetryDecision::DoNotRetry { .. } => panic!("expected retry"),
        }
    }

    #[tokio::test]
    async fn retry_with_succeeds_after_transient_failures() {
        tokio::time::pause();
        let policy = RetryPolicy::with_max_attempts(3);
        let calls = AtomicU32::new(0);

        let result = retry_with(&policy, "fetch_one", "nhl_boxscore", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(DownloadError::http_status("https://x", 503))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_with_reports_exhausted_failure_with_context() {
        tokio::time::pause();
        let policy = RetryPolicy::with_max_attempts(2);

        let result: Result<(), RetryExhausted> =
            retry_with(&policy, "fetch_one", "nhl_boxscore", || async {
                Err(DownloadError::http_status("https://x", 503))
            })
            .await;

        let err = result.unwrap_err();
        assert_eq!(err.operation, "fetch_one");
        assert_eq!(err.source, "nhl_boxscore");
        assert_eq!(err.attempts, 2);
    }

    #[tokio::test]
    async fn retry_with_does_not_retry_permanent_failure() {
        let policy = RetryPolicy::with_max_attempts(3);
        let calls = AtomicU32::new(0);

        let result: Result<(), RetryExhausted> =
            retry_with(&policy, "fetch_one", "nhl_boxscore", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(DownloadError::http_status("https://x", 404)) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}

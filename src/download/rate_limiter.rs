//! Token-bucket rate limiting for a single source adapter (C1).
//!
//! Per spec, rate limiting is one bucket per adapter instance — an
//! adapter talks to exactly one domain, so there is no need for the
//! per-domain sharding a multi-domain downloader would want. The bucket
//! refills continuously rather than enforcing a fixed inter-request
//! delay, so bursts up to the configured capacity are allowed.
//!
//! # Example
//!
//! ```
//! use ingest_core::download::RateLimiter;
//!
//! # async fn example() {
//! let limiter = RateLimiter::new(5.0);
//! limiter.acquire().await;
//! limiter.acquire().await;
//! # }
//! ```

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument};

/// Maximum `Retry-After` value (1 hour) to prevent excessive delays.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Token-bucket rate limiter shared by all requests one source adapter
/// issues. `Send + Sync`; wrap in `Arc` to share across spawned tasks.
#[derive(Debug)]
pub struct RateLimiter {
    /// Requests per second the bucket refills at. `None` disables limiting.
    rate: Option<f64>,
    /// Bucket capacity in tokens (defaults to one second's worth of rate).
    capacity: f64,
    state: Mutex<BucketState>,
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    /// Creates a rate limiter allowing `requests_per_second`, with a
    /// one-second burst capacity.
    #[must_use]
    #[instrument]
    pub fn new(requests_per_second: f64) -> Self {
        debug!(requests_per_second, "creating rate limiter");
        Self {
            rate: Some(requests_per_second),
            capacity: requests_per_second.max(1.0),
            state: Mutex::new(BucketState {
                tokens: requests_per_second.max(1.0),
                last_refill: Instant::now(),
            }),
        }
    }

    /// Creates a disabled rate limiter that never delays callers.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            rate: None,
            capacity: 0.0,
            state: Mutex::new(BucketState {
                tokens: 0.0,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Returns whether this limiter is disabled.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.rate.is_none()
    }

    /// Waits, if necessary, until a token is available, then consumes one.
    #[instrument(skip(self))]
    pub async fn acquire(&self) {
        let Some(rate) = self.rate else {
            return;
        };

        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                let elapsed = now.duration_since(state.last_refill).as_secs_f64();
                state.tokens = (state.tokens + elapsed * rate).min(self.capacity);
                state.last_refill = now;

                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    None
                } else {
                    let deficit = 1.0 - state.tokens;
                    Some(Duration::from_secs_f64(deficit / rate))
                }
            };

            match wait {
                None => return,
                Some(delay) => {
                    debug!(delay_ms = delay.as_millis(), "rate limit: waiting for token");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// Parses a `Retry-After` header value into a [`Duration`].
///
/// Supports both RFC 7231 formats: integer seconds and HTTP-date.
/// Returns `None` if the value cannot be parsed; caps excessive values
/// at one hour.
#[must_use]
#[instrument]
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let header_value = header_value.trim();

    if let Ok(seconds) = header_value.parse::<i64>() {
        if seconds < 0 {
            return None;
        }
        #[allow(clippy::cast_sign_loss)]
        let duration = Duration::from_secs(seconds as u64);
        return Some(duration.min(MAX_RETRY_AFTER));
    }

    if let Ok(datetime) = httpdate::parse_http_date(header_value) {
        let now = std::time::SystemTime::now();
        return match datetime.duration_since(now) {
            Ok(duration) => Some(duration.min(MAX_RETRY_AFTER)),
            Err(_) => Some(Duration::ZERO),
        };
    }

    None
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn new_sets_capacity_to_rate() {
        let limiter = RateLimiter::new(5.0);
        assert!(!limiter.is_disabled());
        assert!((limiter.capacity - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn disabled_limiter_is_disabled() {
        let limiter = RateLimiter::disabled();
        assert!(limiter.is_disabled());
    }

    #[tokio::test]
    async fn disabled_limiter_never_waits() {
        tokio::time::pause();
        let limiter = RateLimiter::disabled();
        let start = Instant::now();
        for _ in 0..100 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test]
    async fn burst_up_to_capacity_is_immediate() {
        tokio::time::pause();
        let limiter = RateLimiter::new(5.0);
        let start = Instant::now();
        for _ in 0..5 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test]
    async fn exceeding_capacity_waits_for_refill() {
        tokio::time::pause();
        let limiter = RateLimiter::new(2.0);
        limiter.acquire().await;
        limiter.acquire().await;

        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(450));
    }

    #[test]
    fn parse_retry_after_seconds() {
        assert_eq!(parse_retry_after("120"), Some(Duration::from_secs(120)));
    }

    #[test]
    fn parse_retry_after_negative_is_none() {
        assert_eq!(parse_retry_after("-5"), None);
    }

    #[test]
    fn parse_retry_after_invalid_is_none() {
        assert_eq!(parse_retry_after("not-a-date"), None);
    }

    #[test]
    fn parse_retry_after_caps_at_one_hour() {
        assert_eq!(parse_retry_after("7200"), Some(Duration::from_secs(3600)));
    }

    #[test]
    fn parse_retry_after_http_date_past_is_zero() {
        assert_eq!(
            parse_retry_after("Wed, 01 Jan 2020 00:00:00 GMT"),
            Some(Duration::ZERO)
        );
    }

    #[test]
    fn parse_retry_after_http_date_future() {
        let future = std::time::SystemTime::now() + Duration::from_secs(30);
        let header = httpdate::fmt_http_date(future);
        let result = parse_retry_after(&header).unwrap();
        assert!(result >= Duration::from_secs(25) && result <= Duration::from_secs(35));
    }
}

//! HTTP transport layer: pooled client, per-source rate limiting, and
//! the retry executor that wraps both.
//!
//! # Example
//!
//! ```no_run
//! use ingest_core::config::HttpClientConfig;
//! use ingest_core::download::{HttpClient, RateLimiter};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpClient::new(&HttpClientConfig::default())?;
//! let limiter = RateLimiter::new(5.0);
//! limiter.acquire().await;
//! let body = client.get_text("https://example.com/report").await?;
//! # let _ = body;
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
pub mod rate_limiter;
pub mod retry;

pub use client::HttpClient;
pub use error::DownloadError;
pub use rate_limiter::{RateLimiter, parse_retry_after};
pub use retry::{
    DEFAULT_MAX_RETRIES, FailureType, RetryDecision, RetryExhausted, RetryPolicy, classify_error,
    retry_with,
};

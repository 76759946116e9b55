//! Structured configuration surfaces.
//!
//! Every configurable knob in the crate is a plain struct field, not a
//! string-keyed option bag — the only opaque payload anywhere is the
//! `metadata`/`config` JSON map on `Batch`/`ValidationRule` rows, and
//! that stays opaque to the core by design.

use std::time::Duration;

/// Configuration for the pooled HTTP client (C3).
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Per-request timeout.
    pub timeout: Duration,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// `User-Agent` header sent with every request.
    pub user_agent: String,
    /// Maximum pooled connections per host.
    pub max_connections_per_host: usize,
    /// Whether to accept and resend cookies (needed for HTML sources
    /// that issue session cookies).
    pub enable_cookies: bool,
    /// Whether to verify TLS certificates.
    pub verify_ssl: bool,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            user_agent: "hockey-ingest/0.1".to_string(),
            max_connections_per_host: 10,
            enable_cookies: false,
            verify_ssl: true,
        }
    }
}

/// Per-source configuration driving rate limiting, retry, and URL
/// templating for one `SourceAdapter`.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Stable source name matching the registry (C4).
    pub name: String,
    /// Base URL for API/HTML/mixed-scrape requests.
    pub base_url: String,
    /// Token-bucket rate: requests per second.
    pub requests_per_second: f64,
    /// Maximum total attempts (including the first) before giving up.
    pub max_retries: u32,
    /// Base delay for exponential backoff.
    pub retry_base_delay: Duration,
    /// Ceiling on backoff delay.
    pub retry_max_delay: Duration,
    /// HTTP client configuration for this source.
    pub http: HttpClientConfig,
}

impl SourceConfig {
    /// Creates a source configuration with sensible defaults beyond the
    /// required name/base_url.
    #[must_use]
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            requests_per_second: 5.0,
            max_retries: 3,
            retry_base_delay: Duration::from_secs(1),
            retry_max_delay: Duration::from_secs(60),
            http: HttpClientConfig::default(),
        }
    }
}

/// Configuration for the auto-validation worker (C12), sourced from
/// environment variables per spec §6.
#[derive(Debug, Clone)]
pub struct AutoValidationConfig {
    /// Whether completed batches automatically dispatch validation.
    pub enabled: bool,
    /// Coalescing delay applied before checking game completeness.
    pub delay: Duration,
}

impl Default for AutoValidationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            delay: Duration::from_secs_f64(2.0),
        }
    }
}

impl AutoValidationConfig {
    /// Reads `VALIDATION_AUTO_RUN` (bool, default true) and
    /// `VALIDATION_DELAY_SECONDS` (float seconds, default 2.0) from the
    /// environment, falling back to defaults on missing/unparsable values.
    #[must_use]
    pub fn from_env() -> Self {
        let enabled = std::env::var("VALIDATION_AUTO_RUN")
            .ok()
            .and_then(|v| v.trim().to_lowercase().parse::<bool>().ok())
            .unwrap_or(true);

        let delay_secs = std::env::var("VALIDATION_DELAY_SECONDS")
            .ok()
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .unwrap_or(2.0);

        Self {
            enabled,
            delay: Duration::from_secs_f64(delay_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_client_config_defaults() {
        let cfg = HttpClientConfig::default();
        assert_eq!(cfg.timeout, Duration::from_secs(30));
        assert!(cfg.verify_ssl);
        assert!(!cfg.enable_cookies);
    }

    #[test]
    fn source_config_new_has_defaults() {
        let cfg = SourceConfig::new("nhl_boxscore", "https://api.example.com");
        assert_eq!(cfg.name, "nhl_boxscore");
        assert_eq!(cfg.max_retries, 3);
        assert!((cfg.requests_per_second - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn auto_validation_config_default_matches_spec() {
        let cfg = AutoValidationConfig::default();
        assert!(cfg.enabled);
        assert_eq!(cfg.delay, Duration::from_secs_f64(2.0));
    }
}

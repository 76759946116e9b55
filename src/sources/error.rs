//! Parsing and per-item download errors raised by source adapters.

use thiserror::Error;

use crate::download::{DownloadError, RetryExhausted};

/// Errors raised while fetching or parsing a single item (C7/C8).
#[derive(Debug, Error)]
pub enum ParseError {
    /// A field required by the target shape was absent or malformed.
    #[error("required field '{field}' missing or invalid for item {item_key}")]
    MissingField { field: String, item_key: String },

    /// The HTML payload did not begin with a recognized HTML sentinel.
    #[error("response for {url} does not look like an HTML document")]
    InvalidHtml { url: String },

    /// Neither the embedded JSON branch nor the DOM fallback produced a
    /// usable payload for a mixed-scrape page.
    #[error("mixed-scrape page {url} yielded no structured data via JSON or DOM fallback")]
    NoExtractablePayload { url: String },

    /// Failed to deserialize a JSON body into the expected shape.
    #[error("failed to parse JSON body: {0}")]
    Json(#[from] serde_json::Error),

    /// The underlying HTTP request failed (non-retryable path).
    #[error(transparent)]
    Download(#[from] DownloadError),

    /// The retry executor exhausted all attempts.
    #[error(transparent)]
    RetryExhausted(#[from] RetryExhausted),

    /// Persisting the parsed entity to the store failed.
    #[error("failed to persist parsed entity: {0}")]
    Storage(#[from] sqlx::Error),
}

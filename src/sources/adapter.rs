//! The source adapter trait and the per-item/season drivers built on top
//! of it (C7).
//!
//! Grounded on the teacher's `Resolver` async-trait (`src/resolver/mod.rs`):
//! `async-trait` makes the trait object-safe for `Box<dyn SourceAdapter>`
//! dispatch, the same reason the teacher gives for its own trait.

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use sqlx::SqlitePool;
use tracing::{instrument, warn};

use crate::config::SourceConfig;
use crate::download::{DownloadError, HttpClient, RateLimiter, RetryExhausted, RetryPolicy, retry_with};
use crate::model::ParsedEntity;
use crate::progress::ProgressTracker;

use super::error::ParseError;

/// Backoff growth factor shared by every adapter (doubling, the
/// teacher's own default for the retry module it is ported from).
const BACKOFF_MULTIPLIER: f64 = 2.0;

/// A lazy, finite sequence of item keys (`game_id`, `player_id`, ...) for
/// one season. Restartable: calling `enumerate_items` again re-derives it.
pub type ItemStream = Pin<Box<dyn Stream<Item = String> + Send>>;

/// Capability set every data source (API-style, HTML-report-style,
/// mixed-scrape-style) implements uniformly (§4.6).
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Stable identifier matching the C4 registry entry.
    fn source_name(&self) -> &str;

    /// Enumerates every item key for `season_id`, driving one batch.
    fn enumerate_items(&self, season_id: i64) -> ItemStream;

    /// Fetches and parses one item. Composes C1 (rate limit) + C3 (HTTP) +
    /// C2 (retry) internally via [`get_with_retry`].
    ///
    /// # Errors
    /// Returns [`ParseError`] if the request, retries, or parsing fail.
    async fn fetch_one(&self, item_key: &str) -> Result<ParsedEntity, ParseError>;

    /// Idempotently upserts the parsed entity by its natural key, returning
    /// the number of rows affected.
    ///
    /// # Errors
    /// Returns [`ParseError::Storage`] if the write fails.
    async fn persist(&self, pool: &SqlitePool, parsed: &ParsedEntity) -> Result<u64, ParseError>;

    /// Liveness probe; defaults to `true` when the adapter has no
    /// dedicated health endpoint configured.
    async fn health_check(&self) -> bool {
        true
    }
}

/// Composes C1 (wait) then C3 (request) then C2 (retry loop): the
/// `_get`-equivalent internal contract every parser archetype shares.
/// A 429 or 5xx is retried per `policy`; other non-2xx and decode
/// failures propagate as [`RetryExhausted`] immediately (not retryable).
///
/// # Errors
/// Returns [`RetryExhausted`] once the retry budget is spent or the
/// failure is classified non-retryable.
pub async fn get_with_retry<T, F, Fut>(
    limiter: &RateLimiter,
    policy: &RetryPolicy,
    operation_name: &str,
    source_name: &str,
    mut operation: F,
) -> Result<T, RetryExhausted>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, DownloadError>>,
{
    retry_with(policy, operation_name, source_name, move || {
        let fut = operation();
        async move {
            limiter.acquire().await;
            fut.await
        }
    })
    .await
}

/// Convenience used by adapters that want the three collaborators
/// bundled (one rate limiter and one retry policy per adapter instance,
/// per the spec's single-bucket-per-adapter deviation from the teacher's
/// per-domain `DashMap`). The limiter is `Arc`-wrapped since
/// `enumerate_items` returns a `'static` stream that must own its share
/// of it independently of the adapter's own borrow.
#[derive(Clone)]
pub struct AdapterContext {
    pub client: HttpClient,
    pub limiter: std::sync::Arc<RateLimiter>,
    pub policy: RetryPolicy,
}

impl AdapterContext {
    #[must_use]
    pub fn new(client: HttpClient, limiter: RateLimiter, policy: RetryPolicy) -> Self {
        Self { client, limiter: std::sync::Arc::new(limiter), policy }
    }

    /// Builds the client/limiter/policy triple from a [`SourceConfig`] in
    /// one call, the shape every adapter constructor uses.
    ///
    /// # Errors
    /// Returns [`DownloadError`] if the underlying `reqwest` client fails
    /// to build.
    pub fn from_config(config: &SourceConfig) -> Result<Self, DownloadError> {
        let client = HttpClient::new(&config.http)?;
        let limiter = RateLimiter::new(config.requests_per_second);
        let policy = RetryPolicy::new(
            config.max_retries,
            config.retry_base_delay,
            config.retry_max_delay,
            BACKOFF_MULTIPLIER,
        );
        Ok(Self::new(client, limiter, policy))
    }
}

/// Outcome of processing one item in a season download (§4.6 "season
/// driver").
#[derive(Debug, Clone)]
pub enum DownloadOutcome {
    Success { item_key: String },
    Failed { item_key: String, error: String, critical: bool },
    Skipped { item_key: String, reason: String },
}

/// True for failures severe enough that the season stream should stop
/// issuing new work rather than continue past it (a "catastrophic auth
/// failure" per spec §4.6) — HTTP 401/403 after retries are exhausted.
fn is_critical(error: &ParseError) -> bool {
    let download_error = match error {
        ParseError::RetryExhausted(e) => Some(&e.cause),
        ParseError::Download(e) => Some(e),
        _ => None,
    };
    matches!(
        download_error,
        Some(DownloadError::HttpStatus { status: 401 | 403, .. })
    )
}

async fn process_one_item(
    adapter: &dyn SourceAdapter,
    tracker: &ProgressTracker,
    pool: &SqlitePool,
    item_key: String,
    force: bool,
) -> (DownloadOutcome, bool) {
    if !force && !tracker.should_download(&item_key) {
        return (
            DownloadOutcome::Skipped {
                item_key,
                reason: "already complete".to_string(),
            },
            false,
        );
    }

    if let Err(error) = tracker.start_item(&item_key).await {
        warn!(item_key, %error, "failed to record item start");
        return (
            DownloadOutcome::Failed { item_key, error: error.to_string(), critical: false },
            false,
        );
    }

    match adapter.fetch_one(&item_key).await {
        Ok(parsed) => match adapter.persist(pool, &parsed).await {
            Ok(_) => {
                if let Err(error) = tracker.complete_item(&item_key, None, None).await {
                    warn!(item_key, %error, "failed to record item completion");
                }
                (DownloadOutcome::Success { item_key }, false)
            }
            Err(error) => {
                let message = error.to_string();
                let _ = tracker.fail_item(&item_key, &message).await;
                let critical = is_critical(&error);
                (DownloadOutcome::Failed { item_key, error: message, critical }, critical)
            }
        },
        Err(error) => {
            let message = error.to_string();
            let _ = tracker.fail_item(&item_key, &message).await;
            let critical = is_critical(&error);
            (DownloadOutcome::Failed { item_key, error: message, critical }, critical)
        }
    }
}

/// Drives a whole season through `adapter`: enumerates items and, for
/// each, consults the tracker before running the single-item path
/// (tracker.start → fetch_one → persist → tracker.complete/fail). Items
/// are processed strictly in order (no `buffer_unordered`), matching the
/// concurrency model's per-batch-item ordering guarantee. A critical
/// failure (e.g. repeated 401/403) stops the stream after yielding its
/// failure marker.
#[instrument(skip(adapter, tracker, pool))]
pub fn download_season<'a>(
    adapter: &'a dyn SourceAdapter,
    tracker: &'a ProgressTracker,
    pool: &'a SqlitePool,
    season_id: i64,
    force: bool,
) -> Pin<Box<dyn Stream<Item = DownloadOutcome> + Send + 'a>> {
    let items = adapter.enumerate_items(season_id);
    let stream = items.scan(false, move |stopped, item_key| {
        let already_stopped = *stopped;
        async move {
            if already_stopped {
                return None;
            }
            let (outcome, critical) = process_one_item(adapter, tracker, pool, item_key, force).await;
            if critical {
                *stopped = true;
            }
            Some(outcome)
        }
    });
    Box::pin(stream)
}

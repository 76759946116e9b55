//! Batch coordinator (C9): drives one `(source, season)` ingestion run
//! to completion in a background task and exposes its progress through
//! an in-memory registry.
//!
//! Grounded on the teacher's `Queue`/`DownloadEngine` split (`src/queue`,
//! `src/download`): the teacher persists queue rows and lets a separate
//! engine drive them concurrently, polling a stats struct for progress.
//! This coordinator keeps that persisted-row-plus-live-registry shape
//! but drives exactly one `SourceAdapter` stream per batch (§4.6's
//! strictly-ordered per-item contract), since unlike the teacher's
//! generic URL queue, a season here is always one adapter's own item
//! enumeration.

mod error;

pub use error::BatchError;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use sqlx::SqlitePool;
use tracing::{info, instrument, warn};

use crate::progress::{ProgressStore, ProgressTracker};
use crate::sources::{self, SourceAdapter, SourceKind, download_season};

/// Invoked once per successfully-ingested game-scoped item when its
/// batch reaches a terminal state, so C12 can be wired up without this
/// module depending on `autovalidate`'s types directly. The `Vec<String>`
/// names which validator(s) the just-completed source's data feeds,
/// matching `ValidationJob::validator_types`.
pub type BatchCompletionHook = Arc<dyn Fn(i64, i64, Vec<String>) + Send + Sync>;

/// Validator-type names a completion hook passes through, one per
/// `StoreKind` the ingested source belongs to. Mixed-scrape sources
/// aren't game-scoped (their item keys don't parse as a game id) so the
/// hook never fires for them regardless of this mapping.
const VALIDATOR_JSON_CROSS_SOURCE: &str = "json_cross_source";
const VALIDATOR_JSON_VS_HTML: &str = "json_vs_html";

/// Terminal/running status of a batch, matching the `batch.status`
/// `CHECK` constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl BatchStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// A live snapshot of one running or recently-finished batch, as
/// returned by [`BatchCoordinator::list_active`].
#[derive(Debug, Clone)]
pub struct ActiveBatch {
    pub batch_id: i64,
    pub source_name: String,
    pub season_id: i64,
    pub status: BatchStatus,
    pub items_total: Option<i64>,
    pub items_success: i64,
    pub items_failed: i64,
    pub items_skipped: i64,
}

struct BatchHandle {
    snapshot: std::sync::Mutex<ActiveBatch>,
    cancel: Arc<AtomicBool>,
}

/// Drives `(source, season)` ingestions. One instance is constructed per
/// process and shared behind an `Arc`; per spec §9 the active-batch
/// registry it owns is intrinsically process-local singleton state with
/// an explicit lifecycle, but the struct itself takes no global state so
/// tests can construct independent instances.
pub struct BatchCoordinator {
    pool: SqlitePool,
    adapters: DashMap<&'static str, Arc<dyn SourceAdapter>>,
    active: DashMap<i64, BatchHandle>,
    on_terminal: Option<BatchCompletionHook>,
}

impl BatchCoordinator {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool, adapters: DashMap::new(), active: DashMap::new(), on_terminal: None }
    }

    /// Registers the hook C9 calls on every terminal transition (spec
    /// §4.8's "signals C12"), wired up by `main.rs` to the
    /// auto-validation worker's enqueue function.
    #[must_use]
    pub fn with_completion_hook(mut self, hook: BatchCompletionHook) -> Self {
        self.on_terminal = Some(hook);
        self
    }

    /// Registers the adapter that serves a given source kind. Idempotent;
    /// a later registration for the same kind replaces the earlier one.
    pub fn register_adapter(&self, kind: SourceKind, adapter: Arc<dyn SourceAdapter>) {
        self.adapters.insert(kind.name(), adapter);
    }

    /// Starts ingesting `source_name` for `season_id`, returning the new
    /// `batch_id` once the batch row is created and the work is
    /// dispatched to a background task. `force` re-downloads items the
    /// tracker would otherwise consider already complete.
    ///
    /// # Errors
    /// Returns [`BatchError::UnknownSource`] if `source_name` isn't
    /// registered, or a database error if the batch row can't be created.
    #[instrument(skip(self))]
    pub async fn start_batch(
        self: &Arc<Self>,
        source_name: &str,
        season_id: i64,
        force: bool,
    ) -> Result<i64, BatchError> {
        let kind = SourceKind::from_name(source_name)
            .ok_or_else(|| BatchError::UnknownSource(source_name.to_string()))?;
        let adapter = self
            .adapters
            .get(kind.name())
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| BatchError::UnknownSource(source_name.to_string()))?;

        let source_id = sources::resolve_source_id(&self.pool, kind).await?;

        let batch_id: i64 = sqlx::query_scalar(
            "INSERT INTO batch (source_id, season_id, status) VALUES (?, ?, 'running') RETURNING batch_id",
        )
        .bind(source_id)
        .bind(season_id)
        .fetch_one(&self.pool)
        .await?;

        let tracker = ProgressTracker::new(
            ProgressStore::new(self.pool.clone()),
            source_id,
            Some(season_id),
            Some(batch_id),
            None,
        );
        tracker.load_state().await?;

        let cancel = Arc::new(AtomicBool::new(false));
        let snapshot = ActiveBatch {
            batch_id,
            source_name: source_name.to_string(),
            season_id,
            status: BatchStatus::Running,
            items_total: None,
            items_success: 0,
            items_failed: 0,
            items_skipped: 0,
        };
        self.active.insert(
            batch_id,
            BatchHandle { snapshot: std::sync::Mutex::new(snapshot), cancel: Arc::clone(&cancel) },
        );

        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            coordinator.run_batch(batch_id, adapter, tracker, season_id, force, cancel, kind).await;
        });

        info!(batch_id, source = source_name, season_id, "batch started");
        Ok(batch_id)
    }

    async fn run_batch(
        self: Arc<Self>,
        batch_id: i64,
        adapter: Arc<dyn SourceAdapter>,
        tracker: ProgressTracker,
        season_id: i64,
        force: bool,
        cancel: Arc<AtomicBool>,
        kind: SourceKind,
    ) {
        use futures_util::StreamExt;

        let validator_types = match kind.store_kind() {
            sources::StoreKind::ApiJson => vec![VALIDATOR_JSON_CROSS_SOURCE.to_string()],
            sources::StoreKind::HtmlReport => vec![VALIDATOR_JSON_VS_HTML.to_string()],
            sources::StoreKind::MixedScrape => Vec::new(),
        };

        let mut stream = download_season(adapter.as_ref(), &tracker, &self.pool, season_id, force);
        let mut success = 0i64;
        let mut failed = 0i64;
        let mut skipped = 0i64;
        let mut cancelled = false;
        let mut critical_error: Option<String> = None;

        while let Some(outcome) = stream.next().await {
            match outcome {
                crate::sources::DownloadOutcome::Success { item_key } => {
                    success += 1;
                    self.notify_completion(&item_key, season_id, &validator_types);
                }
                crate::sources::DownloadOutcome::Failed { item_key, error, critical } => {
                    failed += 1;
                    warn!(batch_id, item_key, %error, critical, "item failed");
                    if critical && critical_error.is_none() {
                        critical_error = Some(format!("item {item_key} failed with a critical error: {error}"));
                    }
                }
                crate::sources::DownloadOutcome::Skipped { .. } => skipped += 1,
            }
            self.update_snapshot(batch_id, success, failed, skipped);

            if cancel.load(Ordering::SeqCst) {
                cancelled = true;
                break;
            }
        }
        drop(stream);

        // A critical auth failure (401/403 after retries) takes priority
        // over cooperative cancellation: the run stopped because it could
        // no longer make progress, not because the caller asked it to.
        let status = if critical_error.is_some() {
            BatchStatus::Failed
        } else if cancelled {
            BatchStatus::Cancelled
        } else {
            BatchStatus::Completed
        };
        self.finish_batch(batch_id, status, success, failed, skipped, critical_error).await;
    }

    fn notify_completion(&self, item_key: &str, season_id: i64, validator_types: &[String]) {
        if let (Some(hook), Ok(game_id)) = (&self.on_terminal, item_key.parse::<i64>()) {
            hook(game_id, season_id, validator_types.to_vec());
        }
    }

    fn update_snapshot(&self, batch_id: i64, success: i64, failed: i64, skipped: i64) {
        if let Some(handle) = self.active.get(&batch_id) {
            let mut snapshot = handle.snapshot.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            snapshot.items_success = success;
            snapshot.items_failed = failed;
            snapshot.items_skipped = skipped;
        }
    }

    async fn finish_batch(
        &self,
        batch_id: i64,
        status: BatchStatus,
        success: i64,
        failed: i64,
        skipped: i64,
        error_message: Option<String>,
    ) {
        let result = sqlx::query(
            "UPDATE batch SET status = ?, completed_at = datetime('now'),
                items_success = ?, items_failed = ?, items_skipped = ?, error_message = ?
             WHERE batch_id = ?",
        )
        .bind(status.as_str())
        .bind(success)
        .bind(failed)
        .bind(skipped)
        .bind(error_message)
        .bind(batch_id)
        .execute(&self.pool)
        .await;

        if let Err(error) = result {
            warn!(batch_id, %error, "failed to persist batch terminal status");
        }

        if let Some(handle) = self.active.get(&batch_id) {
            let mut snapshot = handle.snapshot.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            snapshot.status = status;
            snapshot.items_success = success;
            snapshot.items_failed = failed;
            snapshot.items_skipped = skipped;
        }

        info!(batch_id, status = status.as_str(), success, failed, skipped, "batch finished");
    }

    /// Flips the batch's status to `cancelled` and requests cooperative
    /// cancellation of its background task. Returns `false` if the batch
    /// isn't currently tracked as active (already finished, or never
    /// started by this coordinator instance).
    pub fn cancel_batch(&self, batch_id: i64) -> bool {
        let Some(handle) = self.active.get(&batch_id) else {
            return false;
        };
        handle.cancel.store(true, Ordering::SeqCst);
        true
    }

    /// Snapshots every batch this coordinator has started, in whatever
    /// state (running or terminal) it last observed.
    #[must_use]
    pub fn list_active(&self) -> Vec<ActiveBatch> {
        self.active
            .iter()
            .map(|entry| entry.snapshot.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone())
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    use async_trait::async_trait;

    use super::*;
    use crate::db::Database;
    use crate::model::{ParsedEntity, ScheduleEntry};
    use crate::sources::{ItemStream, ParseError};

    struct StubAdapter {
        items: Vec<&'static str>,
    }

    #[async_trait]
    impl SourceAdapter for StubAdapter {
        fn source_name(&self) -> &str {
            "nhl_json_schedule"
        }

        fn enumerate_items(&self, _season_id: i64) -> ItemStream {
            Box::pin(futures_util::stream::iter(self.items.iter().map(|s| s.to_string())))
        }

        async fn fetch_one(&self, item_key: &str) -> Result<ParsedEntity, ParseError> {
            let game_id: i64 = item_key.parse().unwrap_or_default();
            Ok(ParsedEntity::Schedule(ScheduleEntry {
                game_id,
                season_id: 2024_2025,
                home_team_id: 1,
                away_team_id: 2,
                home_score: None,
                away_score: None,
            }))
        }

        async fn persist(&self, _pool: &SqlitePool, _parsed: &ParsedEntity) -> Result<u64, ParseError> {
            Ok(1)
        }
    }

    async fn coordinator_with_stub(items: Vec<&'static str>) -> Arc<BatchCoordinator> {
        let db = Database::new_in_memory().await.expect("db");
        let coordinator = Arc::new(BatchCoordinator::new(db.pool().clone()));
        coordinator.register_adapter(SourceKind::NhlJsonSchedule, Arc::new(StubAdapter { items }));
        coordinator
    }

    #[tokio::test]
    async fn start_batch_rejects_unknown_source() {
        let coordinator = coordinator_with_stub(vec![]).await;
        let result = coordinator.start_batch("not_a_source", 2024_2025, false).await;
        assert!(matches!(result, Err(BatchError::UnknownSource(_))));
    }

    #[tokio::test]
    async fn start_batch_runs_to_completion() {
        let coordinator = coordinator_with_stub(vec!["2024020001", "2024020002"]).await;
        let batch_id = coordinator.start_batch("nhl_json_schedule", 2024_2025, false).await.unwrap();

        for _ in 0..100 {
            let active = coordinator.list_active();
            let batch = active.iter().find(|b| b.batch_id == batch_id).unwrap();
            if batch.status != BatchStatus::Running {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        let active = coordinator.list_active();
        let batch = active.iter().find(|b| b.batch_id == batch_id).unwrap();
        assert_eq!(batch.status, BatchStatus::Completed);
        assert_eq!(batch.items_success, 2);

        let row_status: String =
            sqlx::query_scalar("SELECT status FROM batch WHERE batch_id = ?")
                .bind(batch_id)
                .fetch_one(&coordinator.pool)
                .await
                .unwrap();
        assert_eq!(row_status, "completed");
    }

    #[tokio::test]
    async fn cancel_batch_returns_false_for_unknown_id() {
        let coordinator = coordinator_with_stub(vec![]).await;
        assert!(!coordinator.cancel_batch(999_999));
    }

    #[tokio::test]
    async fn completion_hook_fires_for_game_scoped_items() {
        let db = Database::new_in_memory().await.expect("db");
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        let coordinator = Arc::new(
            BatchCoordinator::new(db.pool().clone())
                .with_completion_hook(Arc::new(move |_game_id, _season_id, _validator_types| {
                    calls_clone.fetch_add(1, AtomicOrdering::SeqCst);
                })),
        );
        coordinator.register_adapter(
            SourceKind::NhlJsonSchedule,
            Arc::new(StubAdapter { items: vec!["2024020001"] }),
        );

        let batch_id = coordinator.start_batch("nhl_json_schedule", 2024_2025, false).await.unwrap();
        for _ in 0..100 {
            let active = coordinator.list_active();
            if active.iter().any(|b| b.batch_id == batch_id && b.status != BatchStatus::Running) {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        assert_eq!(calls.load(AtomicOrdering::SeqCst), 1);
    }
}

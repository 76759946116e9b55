//! In-memory progress tracker (C6).
//!
//! Mirrors [`super::store::ProgressStore`] in memory for fast
//! `should_download` decisions during a run, and persists every state
//! transition back to the store. Ported from the original Python
//! `ProgressTracker`/`ProgressEvent`/`ProgressStats` (same field names,
//! same `should_download`/`load_state`/`reset_failed` semantics).

use std::panic::AssertUnwindSafe;
use std::sync::Mutex;

use dashmap::DashMap;
use tracing::{debug, instrument, warn};

use super::error::ProgressError;
use super::store::{ProgressStatus, ProgressStore};

/// In-memory state of one tracked item, mirroring [`ProgressStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressState {
    Pending,
    InProgress,
    Success,
    Failed,
    Skipped,
}

/// Aggregated statistics over every item registered with a tracker.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ProgressStats {
    pub total: Option<i64>,
    pub pending: i64,
    pub in_progress: i64,
    pub success: i64,
    pub failed: i64,
    pub skipped: i64,
}

impl ProgressStats {
    #[must_use]
    pub fn completed(&self) -> i64 {
        self.success + self.failed + self.skipped
    }

    #[must_use]
    pub fn processed(&self) -> i64 {
        self.completed() + self.in_progress
    }

    #[must_use]
    pub fn success_rate(&self) -> f64 {
        let completed = self.completed();
        if completed == 0 {
            0.0
        } else {
            (self.success as f64 / completed as f64) * 100.0
        }
    }

    #[must_use]
    pub fn progress_percent(&self) -> f64 {
        match self.total {
            Some(total) if total > 0 => (self.completed() as f64 / total as f64) * 100.0,
            _ => 0.0,
        }
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        match self.total {
            Some(total) => self.completed() >= total,
            None => false,
        }
    }
}

/// Emitted on every item state transition.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub source_id: i64,
    pub season_id: Option<i64>,
    pub item_key: String,
    pub state: ProgressState,
    pub stats: ProgressStats,
    pub message: Option<String>,
}

/// Boxed progress callback. Invoked under [`std::panic::catch_unwind`] so a
/// panicking callback cannot take down the tracker or its caller.
pub type ProgressCallback = Box<dyn Fn(ProgressEvent) + Send + Sync>;

#[derive(Debug, Clone)]
struct ItemState {
    state: ProgressState,
    progress_id: Option<i64>,
    attempts: i64,
}

/// Per-run progress tracker backed by a [`ProgressStore`].
pub struct ProgressTracker {
    store: ProgressStore,
    source_id: i64,
    season_id: Option<i64>,
    batch_id: Option<i64>,
    on_progress: Option<ProgressCallback>,
    items: DashMap<String, ItemState>,
    stats: Mutex<ProgressStats>,
}

impl ProgressTracker {
    #[must_use]
    pub fn new(
        store: ProgressStore,
        source_id: i64,
        season_id: Option<i64>,
        batch_id: Option<i64>,
        on_progress: Option<ProgressCallback>,
    ) -> Self {
        Self {
            store,
            source_id,
            season_id,
            batch_id,
            on_progress,
            items: DashMap::new(),
            stats: Mutex::new(ProgressStats::default()),
        }
    }

    #[must_use]
    pub fn stats(&self) -> ProgressStats {
        *self.stats.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.stats().is_complete()
    }

    pub fn set_total(&self, total: i64) {
        self.stats.lock().unwrap_or_else(std::sync::PoisonError::into_inner).total = Some(total);
    }

    /// Loads incomplete entries from the store for `(source_id, season_id)`
    /// and seeds in-memory state, enabling resume. Returns the count loaded.
    ///
    /// # Errors
    /// Returns [`ProgressError`] if the store query fails.
    #[instrument(skip(self))]
    pub async fn load_state(&self) -> Result<usize, ProgressError> {
        let entries = self.store.get_incomplete(self.source_id, self.season_id).await?;
        let count = entries.len();

        for entry in entries {
            let state = if entry.status() == ProgressStatus::Failed {
                ProgressState::Failed
            } else {
                ProgressState::Pending
            };
            self.items.insert(
                entry.item_key.clone(),
                ItemState {
                    state,
                    progress_id: Some(entry.progress_id),
                    attempts: entry.attempts,
                },
            );
        }

        let mut stats = self.stats.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        stats.pending = self
            .items
            .iter()
            .filter(|e| e.state == ProgressState::Pending)
            .count() as i64;
        stats.failed = self
            .items
            .iter()
            .filter(|e| e.state == ProgressState::Failed)
            .count() as i64;
        drop(stats);

        debug!(loaded = count, "loaded incomplete progress entries");
        Ok(count)
    }

    /// Creates a pending entry if the item isn't already tracked, returning
    /// its `progress_id`.
    ///
    /// # Errors
    /// Returns [`ProgressError`] if the store mutation fails.
    #[instrument(skip(self))]
    pub async fn register_item(&self, item_key: &str) -> Result<i64, ProgressError> {
        if let Some(existing) = self.items.get(item_key) {
            if let Some(progress_id) = existing.progress_id {
                return Ok(progress_id);
            }
        }

        let progress_id = self
            .store
            .upsert_progress(
                self.source_id,
                item_key,
                self.season_id,
                self.batch_id,
                Some(ProgressStatus::Pending),
            )
            .await?;

        let mut inserted = false;
        self.items
            .entry(item_key.to_string())
            .and_modify(|e| e.progress_id = Some(progress_id))
            .or_insert_with(|| {
                inserted = true;
                ItemState {
                    state: ProgressState::Pending,
                    progress_id: Some(progress_id),
                    attempts: 0,
                }
            });
        if inserted {
            self.stats.lock().unwrap_or_else(std::sync::PoisonError::into_inner).pending += 1;
        }

        Ok(progress_id)
    }

    /// # Errors
    /// Returns [`ProgressError`] if any individual registration fails.
    pub async fn register_items(&self, item_keys: &[String]) -> Result<(), ProgressError> {
        for key in item_keys {
            self.register_item(key).await?;
        }
        let mut stats = self.stats.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if stats.total.is_none() {
            stats.total = Some(self.items.len() as i64);
        }
        Ok(())
    }

    /// True iff `item_key` is pending, failed, or not yet tracked.
    #[must_use]
    pub fn should_download(&self, item_key: &str) -> bool {
        match self.items.get(item_key) {
            None => true,
            Some(item) => matches!(item.state, ProgressState::Pending | ProgressState::Failed),
        }
    }

    #[must_use]
    pub fn get_pending_items(&self) -> Vec<String> {
        self.items
            .iter()
            .filter(|e| e.state == ProgressState::Pending)
            .map(|e| e.key().clone())
            .collect()
    }

    #[must_use]
    pub fn get_failed_items(&self) -> Vec<String> {
        self.items
            .iter()
            .filter(|e| e.state == ProgressState::Failed)
            .map(|e| e.key().clone())
            .collect()
    }

    #[must_use]
    pub fn get_item_state(&self, item_key: &str) -> Option<ProgressState> {
        self.items.get(item_key).map(|e| e.state)
    }

    #[must_use]
    pub fn get_item_attempts(&self, item_key: &str) -> i64 {
        self.items.get(item_key).map_or(0, |e| e.attempts)
    }

    /// # Errors
    /// Returns [`ProgressError`] if the store mutation fails.
    #[instrument(skip(self))]
    pub async fn start_item(&self, item_key: &str) -> Result<(), ProgressError> {
        if self.items.get(item_key).is_none() {
            self.register_item(item_key).await?;
        }

        let (progress_id, old_state, attempts) = {
            let mut item = self
                .items
                .get_mut(item_key)
                .expect("just registered above");
            let old_state = item.state;
            item.state = ProgressState::InProgress;
            item.attempts += 1;
            (item.progress_id, old_state, item.attempts)
        };

        {
            let mut stats = self.stats.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            match old_state {
                ProgressState::Pending => stats.pending -= 1,
                ProgressState::Failed => stats.failed -= 1,
                _ => {}
            }
            stats.in_progress += 1;
        }

        if let Some(progress_id) = progress_id {
            self.store.increment_attempts(progress_id).await?;
        }

        self.notify(item_key, ProgressState::InProgress, None);
        debug!(item_key, attempts, "started item");
        Ok(())
    }

    /// # Errors
    /// Returns [`ProgressError`] if the store mutation fails.
    #[instrument(skip(self))]
    pub async fn complete_item(
        &self,
        item_key: &str,
        response_size_bytes: Option<i64>,
        response_time_ms: Option<i64>,
    ) -> Result<(), ProgressError> {
        let Some(progress_id) = self.items.get(item_key).and_then(|i| i.progress_id) else {
            warn!(item_key, "completing unknown item");
            return Ok(());
        };

        if let Some(mut item) = self.items.get_mut(item_key) {
            item.state = ProgressState::Success;
        }
        {
            let mut stats = self.stats.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            stats.in_progress = (stats.in_progress - 1).max(0);
            stats.success += 1;
        }

        self.store
            .mark_success(progress_id, response_size_bytes, response_time_ms)
            .await?;
        self.notify(item_key, ProgressState::Success, None);
        Ok(())
    }

    /// # Errors
    /// Returns [`ProgressError`] if the store mutation fails.
    #[instrument(skip(self))]
    pub async fn fail_item(&self, item_key: &str, error_message: &str) -> Result<(), ProgressError> {
        let Some(progress_id) = self.items.get(item_key).and_then(|i| i.progress_id) else {
            warn!(item_key, "failing unknown item");
            return Ok(());
        };

        if let Some(mut item) = self.items.get_mut(item_key) {
            item.state = ProgressState::Failed;
        }
        {
            let mut stats = self.stats.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            stats.in_progress = (stats.in_progress - 1).max(0);
            stats.failed += 1;
        }

        self.store.mark_failed(progress_id, error_message).await?;
        self.notify(item_key, ProgressState::Failed, Some(error_message.to_string()));
        Ok(())
    }

    /// # Errors
    /// Returns [`ProgressError`] if the store mutation fails.
    #[instrument(skip(self))]
    pub async fn skip_item(&self, item_key: &str, reason: Option<&str>) -> Result<(), ProgressError> {
        if self.items.get(item_key).is_none() {
            self.register_item(item_key).await?;
        }

        let (progress_id, old_state) = {
            let mut item = self
                .items
                .get_mut(item_key)
                .expect("just registered above");
            let old_state = item.state;
            item.state = ProgressState::Skipped;
            (item.progress_id, old_state)
        };

        {
            let mut stats = self.stats.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            match old_state {
                ProgressState::Pending => stats.pending -= 1,
                ProgressState::InProgress => stats.in_progress -= 1,
                ProgressState::Failed => stats.failed -= 1,
                _ => {}
            }
            stats.skipped += 1;
        }

        if let Some(progress_id) = progress_id {
            self.store.mark_skipped(progress_id, reason).await?;
        }
        self.notify(item_key, ProgressState::Skipped, reason.map(str::to_string));
        Ok(())
    }

    /// Resets all failed items to pending, in the store and in memory.
    ///
    /// # Errors
    /// Returns [`ProgressError`] if the store mutation fails.
    #[instrument(skip(self))]
    pub async fn reset_failed(&self) -> Result<u64, ProgressError> {
        let count = self.store.reset_failed(self.source_id, self.season_id).await?;

        for mut item in self.items.iter_mut() {
            if item.state == ProgressState::Failed {
                item.state = ProgressState::Pending;
            }
        }

        let mut stats = self.stats.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        stats.pending += stats.failed;
        stats.failed = 0;

        Ok(count)
    }

    fn notify(&self, item_key: &str, state: ProgressState, message: Option<String>) {
        let Some(callback) = &self.on_progress else {
            return;
        };

        let event = ProgressEvent {
            source_id: self.source_id,
            season_id: self.season_id,
            item_key: item_key.to_string(),
            state,
            stats: self.stats(),
            message,
        };

        let callback = AssertUnwindSafe(callback);
        let event = AssertUnwindSafe(event);
        if std::panic::catch_unwind(move || (callback.0)(event.0)).is_err() {
            warn!(item_key, "progress callback panicked");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::db::Database;

    async fn tracker() -> ProgressTracker {
        let db = Database::new_in_memory().await.unwrap();
        sqlx::query("INSERT INTO data_source (name, kind) VALUES ('nhl_boxscore', 'api_json')")
            .execute(db.pool())
            .await
            .unwrap();
        let store = ProgressStore::new(db.pool().clone());
        ProgressTracker::new(store, 1, Some(2024_2025), None, None)
    }

    #[tokio::test]
    async fn unknown_item_should_download() {
        let t = tracker().await;
        assert!(t.should_download("2024020500"));
    }

    #[tokio::test]
    async fn in_progress_item_should_not_download() {
        let t = tracker().await;
        t.start_item("2024020500").await.unwrap();
        assert!(!t.should_download("2024020500"));
    }

    #[tokio::test]
    async fn success_item_should_not_download() {
        let t = tracker().await;
        t.start_item("2024020500").await.unwrap();
        t.complete_item("2024020500", Some(100), Some(10)).await.unwrap();
        assert!(!t.should_download("2024020500"));
        assert_eq!(t.stats().success, 1);
        assert_eq!(t.stats().in_progress, 0);
    }

    #[tokio::test]
    async fn failed_item_should_download_again() {
        let t = tracker().await;
        t.start_item("2024020500").await.unwrap();
        t.fail_item("2024020500", "boom").await.unwrap();
        assert!(t.should_download("2024020500"));
        assert_eq!(t.stats().failed, 1);
    }

    #[tokio::test]
    async fn reset_failed_moves_items_back_to_pending() {
        let t = tracker().await;
        t.start_item("A").await.unwrap();
        t.fail_item("A", "boom").await.unwrap();
        let count = t.reset_failed().await.unwrap();
        assert_eq!(count, 1);
        assert_eq!(t.get_item_state("A"), Some(ProgressState::Pending));
        assert!(t.should_download("A"));
    }

    #[tokio::test]
    async fn load_state_resumes_incomplete_entries() {
        let db = Database::new_in_memory().await.unwrap();
        sqlx::query("INSERT INTO data_source (name, kind) VALUES ('nhl_boxscore', 'api_json')")
            .execute(db.pool())
            .await
            .unwrap();
        let store = ProgressStore::new(db.pool().clone());
        store
            .upsert_progress(1, "A", Some(2024_2025), None, None)
            .await
            .unwrap();
        let failed_id = store
            .upsert_progress(1, "B", Some(2024_2025), None, None)
            .await
            .unwrap();
        store.mark_failed(failed_id, "boom").await.unwrap();
        let success_id = store
            .upsert_progress(1, "C", Some(2024_2025), None, None)
            .await
            .unwrap();
        store.mark_success(success_id, None, None).await.unwrap();

        let t = ProgressTracker::new(store, 1, Some(2024_2025), None, None);
        let loaded = t.load_state().await.unwrap();
        assert_eq!(loaded, 2);
        assert!(t.should_download("A"));
        assert!(t.should_download("B"));
        assert!(!t.items.contains_key("C"));
    }

    #[tokio::test]
    async fn panicking_callback_is_caught_and_does_not_crash() {
        let db = Database::new_in_memory().await.unwrap();
        sqlx::query("INSERT INTO data_source (name, kind) VALUES ('nhl_boxscore', 'api_json')")
            .execute(db.pool())
            .await
            .unwrap();
        let store = ProgressStore::new(db.pool().clone());
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);
        let callback: ProgressCallback = Box::new(move |_event| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            panic!("callback exploded");
        });
        let t = ProgressTracker::new(store, 1, Some(2024_2025), None, Some(callback));

        t.start_item("A").await.unwrap();
        t.complete_item("A", None, None).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(t.stats().success, 1);
    }
}

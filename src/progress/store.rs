//! Persistent progress store (C5).
//!
//! Every mutation is a single-statement atomic update or upsert against
//! `progress_entry`'s `(source_id, season_id, item_key)` uniqueness key.
//! `SQLite` never matches two rows with a `NULL` `season_id` as
//! conflicting (`NULL = NULL` is unknown, not true), so a plain
//! `INSERT ... ON CONFLICT` would silently duplicate rows whenever
//! `season_id` is absent. [`ProgressStore::upsert_progress`] instead
//! looks the row up explicitly with `season_id IS NULL` in that case.

use sqlx::{FromRow, Row, SqlitePool};
use tracing::instrument;

use super::error::ProgressError;

/// Lifecycle state of one `ProgressEntry` (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStatus {
    Pending,
    InProgress,
    Success,
    Failed,
    Skipped,
}

impl ProgressStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl std::str::FromStr for ProgressStatus {
    type Err = ProgressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            "skipped" => Ok(Self::Skipped),
            other => Err(ProgressError::Database(sqlx::Error::Decode(
                format!("unknown progress status '{other}'").into(),
            ))),
        }
    }
}

/// One `progress_entry` row.
#[derive(Debug, Clone, FromRow)]
pub struct ProgressEntry {
    pub progress_id: i64,
    pub source_id: i64,
    pub season_id: Option<i64>,
    pub item_key: String,
    status_raw: String,
    pub attempts: i64,
    pub batch_id: Option<i64>,
    pub last_attempt_at: Option<String>,
    pub completed_at: Option<String>,
    pub error_message: Option<String>,
    pub response_size_bytes: Option<i64>,
    pub response_time_ms: Option<i64>,
    pub created_at: String,
}

impl ProgressEntry {
    /// Parsed status; falls back to `Pending` for an unrecognized value
    /// (defensive: the CHECK constraint should make this unreachable).
    #[must_use]
    pub fn status(&self) -> ProgressStatus {
        self.status_raw.parse().unwrap_or(ProgressStatus::Pending)
    }
}

/// Per-batch item counters returned by `get_batch_stats`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchStats {
    pub pending: i64,
    pub in_progress: i64,
    pub success: i64,
    pub failed: i64,
    pub skipped: i64,
    pub total: i64,
}

/// Persistent, `SQLite`-backed progress store.
#[derive(Debug, Clone)]
pub struct ProgressStore {
    pool: SqlitePool,
}

impl ProgressStore {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Creates the row if missing, or associates the existing row with
    /// `batch_id`/`status` if given. Returns the `progress_id`. Idempotent:
    /// repeated calls with the same keys return the same id.
    ///
    /// # Errors
    ///
    /// Returns [`ProgressError::Database`] on query failure.
    #[instrument(skip(self))]
    pub async fn upsert_progress(
        &self,
        source_id: i64,
        item_key: &str,
        season_id: Option<i64>,
        batch_id: Option<i64>,
        status: Option<ProgressStatus>,
    ) -> Result<i64, ProgressError> {
        let existing = self.find_id(source_id, season_id, item_key).await?;

        if let Some(progress_id) = existing {
            if batch_id.is_some() || status.is_some() {
                let status_str = status.map(ProgressStatus::as_str);
                sqlx::query(
                    "UPDATE progress_entry
                     SET batch_id = COALESCE(?, batch_id),
                         status = COALESCE(?, status)
                     WHERE progress_id = ?",
                )
                .bind(batch_id)
                .bind(status_str)
                .bind(progress_id)
                .execute(&self.pool)
                .await?;
            }
            return Ok(progress_id);
        }

        let status = status.unwrap_or(ProgressStatus::Pending);
        let row = sqlx::query(
            "INSERT INTO progress_entry (source_id, season_id, item_key, status, batch_id)
             VALUES (?, ?, ?, ?, ?)
             RETURNING progress_id",
        )
        .bind(source_id)
        .bind(season_id)
        .bind(item_key)
        .bind(status.as_str())
        .bind(batch_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("progress_id"))
    }

    async fn find_id(
        &self,
        source_id: i64,
        season_id: Option<i64>,
        item_key: &str,
    ) -> Result<Option<i64>, ProgressError> {
        let row = if let Some(season_id) = season_id {
            sqlx::query(
                "SELECT progress_id FROM progress_entry
                 WHERE source_id = ? AND season_id = ? AND item_key = ?",
            )
            .bind(source_id)
            .bind(season_id)
            .bind(item_key)
            .fetch_optional(&self.pool)
            .await?
        } else {
            sqlx::query(
                "SELECT progress_id FROM progress_entry
                 WHERE source_id = ? AND season_id IS NULL AND item_key = ?",
            )
            .bind(source_id)
            .bind(item_key)
            .fetch_optional(&self.pool)
            .await?
        };
        Ok(row.map(|r| r.get("progress_id")))
    }

    /// # Errors
    /// Returns [`ProgressError::Database`] on query failure.
    #[instrument(skip(self))]
    pub async fn get_by_id(&self, progress_id: i64) -> Result<Option<ProgressEntry>, ProgressError> {
        let entry = sqlx::query_as::<_, ProgressEntry>(
            "SELECT progress_id, source_id, season_id, item_key, status AS status_raw,
                    attempts, batch_id, last_attempt_at, completed_at, error_message,
                    response_size_bytes, response_time_ms, created_at
             FROM progress_entry WHERE progress_id = ?",
        )
        .bind(progress_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(entry)
    }

    /// # Errors
    /// Returns [`ProgressError::Database`] on query failure.
    #[instrument(skip(self))]
    pub async fn get_by_key(
        &self,
        source_id: i64,
        season_id: Option<i64>,
        item_key: &str,
    ) -> Result<Option<ProgressEntry>, ProgressError> {
        let Some(progress_id) = self.find_id(source_id, season_id, item_key).await? else {
            return Ok(None);
        };
        self.get_by_id(progress_id).await
    }

    /// Entries with `status = pending`, most recently created first, capped
    /// at `limit`.
    ///
    /// # Errors
    /// Returns [`ProgressError::Database`] on query failure.
    #[instrument(skip(self))]
    pub async fn get_pending(
        &self,
        source_id: i64,
        season_id: Option<i64>,
        limit: i64,
    ) -> Result<Vec<ProgressEntry>, ProgressError> {
        self.get_by_statuses(source_id, season_id, &["pending"], Some(limit))
            .await
    }

    /// Entries with `status` in {pending, failed}.
    ///
    /// # Errors
    /// Returns [`ProgressError::Database`] on query failure.
    #[instrument(skip(self))]
    pub async fn get_incomplete(
        &self,
        source_id: i64,
        season_id: Option<i64>,
    ) -> Result<Vec<ProgressEntry>, ProgressError> {
        self.get_by_statuses(source_id, season_id, &["pending", "failed"], None)
            .await
    }

    async fn get_by_statuses(
        &self,
        source_id: i64,
        season_id: Option<i64>,
        statuses: &[&str],
        limit: Option<i64>,
    ) -> Result<Vec<ProgressEntry>, ProgressError> {
        let placeholders = statuses.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
        let season_clause = if season_id.is_some() {
            "season_id = ?"
        } else {
            "season_id IS NULL"
        };
        let limit_clause = if limit.is_some() { " LIMIT ?" } else { "" };
        let sql = format!(
            "SELECT progress_id, source_id, season_id, item_key, status AS status_raw,
                    attempts, batch_id, last_attempt_at, completed_at, error_message,
                    response_size_bytes, response_time_ms, created_at
             FROM progress_entry
             WHERE source_id = ? AND {season_clause} AND status IN ({placeholders})
             ORDER BY created_at ASC{limit_clause}"
        );

        let mut query = sqlx::query_as::<_, ProgressEntry>(&sql).bind(source_id);
        if let Some(season_id) = season_id {
            query = query.bind(season_id);
        }
        for status in statuses {
            query = query.bind(*status);
        }
        if let Some(limit) = limit {
            query = query.bind(limit);
        }

        Ok(query.fetch_all(&self.pool).await?)
    }

    /// # Errors
    /// Returns [`ProgressError::Database`] on query failure, or
    /// [`ProgressError::NotFound`] if no such entry exists.
    #[instrument(skip(self))]
    pub async fn mark_success(
        &self,
        progress_id: i64,
        response_size_bytes: Option<i64>,
        response_time_ms: Option<i64>,
    ) -> Result<(), ProgressError> {
        let result = sqlx::query(
            "UPDATE progress_entry
             SET status = 'success',
                 completed_at = datetime('now'),
                 error_message = NULL,
                 response_size_bytes = ?,
                 response_time_ms = ?
             WHERE progress_id = ?",
        )
        .bind(response_size_bytes)
        .bind(response_time_ms)
        .bind(progress_id)
        .execute(&self.pool)
        .await?;
        require_affected(progress_id, result.rows_affected())
    }

    /// # Errors
    /// Returns [`ProgressError::MissingErrorMessage`] if `error_message` is
    /// empty, [`ProgressError::NotFound`] if no such entry exists, or
    /// [`ProgressError::Database`] on query failure.
    #[instrument(skip(self))]
    pub async fn mark_failed(
        &self,
        progress_id: i64,
        error_message: &str,
    ) -> Result<(), ProgressError> {
        if error_message.is_empty() {
            return Err(ProgressError::MissingErrorMessage);
        }
        let result = sqlx::query(
            "UPDATE progress_entry
             SET status = 'failed', error_message = ?
             WHERE progress_id = ?",
        )
        .bind(error_message)
        .bind(progress_id)
        .execute(&self.pool)
        .await?;
        require_affected(progress_id, result.rows_affected())
    }

    /// # Errors
    /// Returns [`ProgressError::NotFound`] if no such entry exists, or
    /// [`ProgressError::Database`] on query failure.
    #[instrument(skip(self))]
    pub async fn mark_skipped(
        &self,
        progress_id: i64,
        reason: Option<&str>,
    ) -> Result<(), ProgressError> {
        let result = sqlx::query(
            "UPDATE progress_entry
             SET status = 'skipped', completed_at = datetime('now'), error_message = ?
             WHERE progress_id = ?",
        )
        .bind(reason)
        .bind(progress_id)
        .execute(&self.pool)
        .await?;
        require_affected(progress_id, result.rows_affected())
    }

    /// Atomically increments `attempts` and sets `last_attempt_at`,
    /// returning the new attempt count.
    ///
    /// # Errors
    /// Returns [`ProgressError::NotFound`] if no such entry exists, or
    /// [`ProgressError::Database`] on query failure.
    #[instrument(skip(self))]
    pub async fn increment_attempts(&self, progress_id: i64) -> Result<i64, ProgressError> {
        let row = sqlx::query(
            "UPDATE progress_entry
             SET attempts = attempts + 1,
                 status = 'in_progress',
                 last_attempt_at = datetime('now')
             WHERE progress_id = ?
             RETURNING attempts",
        )
        .bind(progress_id)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Ok(row.get("attempts")),
            None => Err(ProgressError::NotFound(progress_id)),
        }
    }

    /// Transitions all `failed` entries for `(source_id, season_id)` back
    /// to `pending`, clearing `error_message`. Returns the count moved.
    ///
    /// # Errors
    /// Returns [`ProgressError::Database`] on query failure.
    #[instrument(skip(self))]
    pub async fn reset_failed(
        &self,
        source_id: i64,
        season_id: Option<i64>,
    ) -> Result<u64, ProgressError> {
        let season_clause = if season_id.is_some() {
            "season_id = ?"
        } else {
            "season_id IS NULL"
        };
        let sql = format!(
            "UPDATE progress_entry
             SET status = 'pending', error_message = NULL
             WHERE source_id = ? AND {season_clause} AND status = 'failed'"
        );
        let mut query = sqlx::query(&sql).bind(source_id);
        if let Some(season_id) = season_id {
            query = query.bind(season_id);
        }
        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    /// # Errors
    /// Returns [`ProgressError::Database`] on query failure.
    #[instrument(skip(self))]
    pub async fn get_batch_stats(&self, batch_id: i64) -> Result<BatchStats, ProgressError> {
        let rows = sqlx::query(
            "SELECT status, COUNT(*) AS n FROM progress_entry
             WHERE batch_id = ? GROUP BY status",
        )
        .bind(batch_id)
        .fetch_all(&self.pool)
        .await?;

        let mut stats = BatchStats::default();
        for row in rows {
            let status: String = row.get("status");
            let count: i64 = row.get("n");
            match status.as_str() {
                "pending" => stats.pending = count,
                "in_progress" => stats.in_progress = count,
                "success" => stats.success = count,
                "failed" => stats.failed = count,
                "skipped" => stats.skipped = count,
                _ => {}
            }
            stats.total += count;
        }
        Ok(stats)
    }
}

fn require_affected(progress_id: i64, rows_affected: u64) -> Result<(), ProgressError> {
    if rows_affected == 0 {
        Err(ProgressError::NotFound(progress_id))
    } else {
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::db::Database;

    async fn store() -> ProgressStore {
        let db = Database::new_in_memory().await.unwrap();
        sqlx::query("INSERT INTO data_source (name, kind) VALUES ('nhl_boxscore', 'api_json')")
            .execute(db.pool())
            .await
            .unwrap();
        ProgressStore::new(db.pool().clone())
    }

    #[tokio::test]
    async fn upsert_is_idempotent_with_season() {
        let store = store().await;
        let id1 = store
            .upsert_progress(1, "2024020500", Some(2024_2025), None, None)
            .await
            .unwrap();
        let id2 = store
            .upsert_progress(1, "2024020500", Some(2024_2025), None, None)
            .await
            .unwrap();
        assert_eq!(id1, id2);
    }

    #[tokio::test]
    async fn upsert_is_idempotent_with_null_season() {
        let store = store().await;
        let id1 = store
            .upsert_progress(1, "player:123", None, None, None)
            .await
            .unwrap();
        let id2 = store
            .upsert_progress(1, "player:123", None, None, None)
            .await
            .unwrap();
        assert_eq!(id1, id2);
    }

    #[tokio::test]
    async fn null_season_rows_are_distinct_per_item_key() {
        let store = store().await;
        let id_a = store
            .upsert_progress(1, "A", None, None, None)
            .await
            .unwrap();
        let id_b = store
            .upsert_progress(1, "B", None, None, None)
            .await
            .unwrap();
        assert_ne!(id_a, id_b);
    }

    #[tokio::test]
    async fn mark_success_sets_completed_at_and_clears_error() {
        let store = store().await;
        let id = store
            .upsert_progress(1, "2024020500", Some(2024_2025), None, None)
            .await
            .unwrap();
        store.mark_failed(id, "boom").await.unwrap();
        store.mark_success(id, Some(1024), Some(50)).await.unwrap();

        let entry = store.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(entry.status(), ProgressStatus::Success);
        assert!(entry.completed_at.is_some());
        assert!(entry.error_message.is_none());
    }

    #[tokio::test]
    async fn mark_failed_requires_error_message() {
        let store = store().await;
        let id = store
            .upsert_progress(1, "2024020500", Some(2024_2025), None, None)
            .await
            .unwrap();
        let result = store.mark_failed(id, "").await;
        assert!(matches!(result, Err(ProgressError::MissingErrorMessage)));
    }

    #[tokio::test]
    async fn increment_attempts_monotonically_increases() {
        let store = store().await;
        let id = store
            .upsert_progress(1, "2024020500", Some(2024_2025), None, None)
            .await
            .unwrap();
        assert_eq!(store.increment_attempts(id).await.unwrap(), 1);
        assert_eq!(store.increment_attempts(id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn reset_failed_moves_only_failed_entries() {
        let store = store().await;
        let failed_id = store
            .upsert_progress(1, "A", Some(2024_2025), None, None)
            .await
            .unwrap();
        let success_id = store
            .upsert_progress(1, "B", Some(2024_2025), None, None)
            .await
            .unwrap();
        store.mark_failed(failed_id, "boom").await.unwrap();
        store.mark_success(success_id, None, None).await.unwrap();

        let moved = store.reset_failed(1, Some(2024_2025)).await.unwrap();
        assert_eq!(moved, 1);

        let entry = store.get_by_id(failed_id).await.unwrap().unwrap();
        assert_eq!(entry.status(), ProgressStatus::Pending);
        assert!(entry.error_message.is_none());
    }

    #[tokio::test]
    async fn get_incomplete_returns_pending_and_failed_only() {
        let store = store().await;
        let pending_id = store
            .upsert_progress(1, "A", Some(2024_2025), None, None)
            .await
            .unwrap();
        let failed_id = store
            .upsert_progress(1, "B", Some(2024_2025), None, None)
            .await
            .unwrap();
        let success_id = store
            .upsert_progress(1, "C", Some(2024_2025), None, None)
            .await
            .unwrap();
        store.mark_failed(failed_id, "boom").await.unwrap();
        store.mark_success(success_id, None, None).await.unwrap();

        let incomplete = store.get_incomplete(1, Some(2024_2025)).await.unwrap();
        let ids: Vec<i64> = incomplete.iter().map(|e| e.progress_id).collect();
        assert!(ids.contains(&pending_id));
        assert!(ids.contains(&failed_id));
        assert!(!ids.contains(&success_id));
    }

    #[tokio::test]
    async fn get_batch_stats_counts_each_status() {
        let store = store().await;
        let db = Database::new_in_memory().await.unwrap();
        let _ = db;
        let batch_id = 1i64;
        let pending = store
            .upsert_progress(1, "A", Some(2024_2025), Some(batch_id), None)
            .await
            .unwrap();
        let failed = store
            .upsert_progress(1, "B", Some(2024_2025), Some(batch_id), None)
            .await
            .unwrap();
        store.mark_failed(failed, "boom").await.unwrap();
        let _ = pending;

        let stats = store.get_batch_stats(batch_id).await.unwrap();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.total, 2);
    }
}

//! Error types for the progress store and tracker (C5/C6).

use thiserror::Error;

/// Errors raised by [`super::store::ProgressStore`] and
/// [`super::tracker::ProgressTracker`].
#[derive(Debug, Error)]
pub enum ProgressError {
    /// Underlying `SQLite` operation failed.
    #[error("progress store database error: {0}")]
    Database(#[from] sqlx::Error),

    /// No `ProgressEntry` exists with the given id.
    #[error("progress entry not found: {0}")]
    NotFound(i64),

    /// `error_message` was required (mark_failed) but empty.
    #[error("error message is required when marking an item failed")]
    MissingErrorMessage,
}

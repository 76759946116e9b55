//! Error types for validation rules and the reconciliation engine (C10/C11).

use thiserror::Error;

/// Errors raised by [`super::engine::ReconciliationEngine`].
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Underlying `SQLite` operation failed.
    #[error("validation store database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A `payload_json` column failed to deserialize into its model type.
    #[error("failed to decode parsed entity for game {game_id}: {source}")]
    Decode {
        game_id: i64,
        #[source]
        source: serde_json::Error,
    },

    /// No `ValidationRun` exists with the given id.
    #[error("validation run not found: {0}")]
    RunNotFound(i64),
}

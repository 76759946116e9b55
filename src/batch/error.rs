//! Error types for the batch coordinator (C9).

use thiserror::Error;

use crate::progress::ProgressError;
use crate::sources::{ParseError, RegistryError};

/// Errors raised by [`super::BatchCoordinator`].
#[derive(Debug, Error)]
pub enum BatchError {
    /// Underlying `SQLite` operation failed.
    #[error("batch store database error: {0}")]
    Database(#[from] sqlx::Error),

    /// `source_name` isn't a registered [`crate::sources::SourceKind`].
    #[error("unknown source: {0}")]
    UnknownSource(String),

    /// Resolving or creating the `data_source` row failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Progress store/tracker failure.
    #[error(transparent)]
    Progress(#[from] ProgressError),

    /// No `batch` row exists with the given id.
    #[error("batch not found: {0}")]
    NotFound(i64),

    /// A single item's fetch/parse/persist failed in a way the adapter
    /// did not itself recover from.
    #[error(transparent)]
    Parse(#[from] ParseError),
}

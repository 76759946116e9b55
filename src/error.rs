//! Crate-wide error aggregation.
//!
//! Individual modules define their own leaf error enums with full
//! context (a download error carries the URL, a progress error carries
//! the item key); this module aggregates them behind one `#[from]`-based
//! enum for callers — `BatchCoordinator::start_batch`,
//! `ReconciliationEngine::run` — that want simple `?` propagation rather
//! than per-module detail. `main.rs` converts everything to `anyhow`.

use thiserror::Error;

use crate::batch::BatchError;
use crate::db::DbError;
use crate::download::DownloadError;
use crate::progress::ProgressError;
use crate::sources::ParseError;
use crate::validation::ValidationError;

/// Top-level error type returned by the crate's public control surface.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Database connection or migration failure.
    #[error(transparent)]
    Db(#[from] DbError),

    /// HTTP download failure.
    #[error(transparent)]
    Download(#[from] DownloadError),

    /// Progress store/tracker failure.
    #[error(transparent)]
    Progress(#[from] ProgressError),

    /// Source parsing failure.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Batch coordinator failure.
    #[error(transparent)]
    Batch(#[from] BatchError),

    /// Validation/reconciliation failure.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The requested source name is not in the registry.
    #[error("unknown source: {0}")]
    UnknownSource(String),
}

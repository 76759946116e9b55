//! Resumable progress tracking (C5/C6): a `SQLite`-backed store plus an
//! in-memory tracker that drives `should_download` decisions during a run.

mod error;
mod store;
mod tracker;

pub use error::ProgressError;
pub use store::{BatchStats, ProgressEntry, ProgressStatus, ProgressStore};
pub use tracker::{ProgressCallback, ProgressEvent, ProgressState, ProgressStats, ProgressTracker};

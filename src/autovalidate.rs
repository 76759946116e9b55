//! Auto-validation worker (C12): a long-running task that consumes
//! completed-game notifications from the batch coordinator, waits out a
//! short coalescing delay, checks the game has enough parsed data to
//! reconcile, and dispatches the reconciliation engine.
//!
//! Grounded on the teacher's `DownloadEngine` start/stop lifecycle
//! (`AtomicBool` flag plus a stored `JoinHandle`, both idempotent) and
//! its retry loop shape (`src/download/retry.rs`), adapted here to a
//! queue consumer instead of a single request.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use sqlx::SqlitePool;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::AutoValidationConfig;
use crate::validation::ReconciliationEngine;

/// One unit of work: a game whose ingestion just completed, and which
/// completeness check governs whether it's ready for reconciliation.
#[derive(Debug, Clone)]
pub struct ValidationJob {
    pub game_id: i64,
    pub season_id: i64,
    pub validator_types: Vec<String>,
}

/// JSON-API sources (boxscore/play-by-play/shift chart) are complete
/// enough to run the cross-source JSON checks.
pub const VALIDATOR_JSON_CROSS_SOURCE: &str = "json_cross_source";
/// An HTML report source completed; completeness instead means a boxscore
/// plus at least one parsed HTML report, since shift charts never come
/// from that archetype.
pub const VALIDATOR_JSON_VS_HTML: &str = "json_vs_html";

const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_UNIT_SECS: u64 = 5;

/// Consumes [`ValidationJob`]s dispatched by the batch coordinator and
/// runs reconciliation for games with enough parsed data on hand.
pub struct AutoValidationWorker {
    pool: SqlitePool,
    config: AutoValidationConfig,
    sender: mpsc::Sender<ValidationJob>,
    receiver: Mutex<Option<mpsc::Receiver<ValidationJob>>>,
    running: AtomicBool,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl AutoValidationWorker {
    #[must_use]
    pub fn new(pool: SqlitePool, config: AutoValidationConfig) -> Self {
        let (sender, receiver) = mpsc::channel(256);
        Self {
            pool,
            config,
            sender,
            receiver: Mutex::new(Some(receiver)),
            running: AtomicBool::new(false),
            handle: Mutex::new(None),
        }
    }

    /// Enqueues a job. Intended as the callback passed to
    /// `BatchCoordinator::with_completion_hook`; drops the job silently
    /// if the queue is full or the worker isn't running, matching the
    /// "at most a best-effort nudge" nature of the auto-validation path.
    pub fn enqueue(&self, game_id: i64, season_id: i64, validator_types: Vec<String>) {
        if !self.config.enabled {
            return;
        }
        let job = ValidationJob { game_id, season_id, validator_types };
        if let Err(error) = self.sender.try_send(job) {
            warn!(game_id, season_id, %error, "auto-validation queue full or closed, dropping job");
        }
    }

    /// Starts the worker task. Idempotent: a second call while already
    /// running is a no-op.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(mut receiver) = self.receiver.lock().unwrap_or_else(std::sync::PoisonError::into_inner).take() else {
            return;
        };

        let worker = Arc::clone(self);
        let task = tokio::spawn(async move {
            while worker.running.load(Ordering::SeqCst) {
                let Some(job) = receiver.recv().await else { break };
                worker.dispatch_with_retry(job).await;
            }
        });
        *self.handle.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = Some(task);
        info!("auto-validation worker started");
    }

    /// Stops the worker. Idempotent; waits for the in-flight job (if any)
    /// to finish draining before returning.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let handle = self.handle.lock().unwrap_or_else(std::sync::PoisonError::into_inner).take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        info!("auto-validation worker stopped");
    }

    async fn dispatch_with_retry(&self, job: ValidationJob) {
        tokio::time::sleep(self.config.delay).await;

        let sufficient = if job.validator_types.iter().any(|v| v == VALIDATOR_JSON_VS_HTML) {
            self.has_sufficient_html_data(job.game_id, job.season_id).await
        } else {
            self.has_sufficient_data(job.game_id, job.season_id).await
        };
        if !sufficient {
            info!(game_id = job.game_id, "insufficient data for auto-validation, dropping");
            return;
        }

        let engine = ReconciliationEngine::new(self.pool.clone());
        for attempt in 1..=MAX_ATTEMPTS {
            match engine.run(job.season_id, Some(job.game_id)).await {
                Ok(run_id) => {
                    info!(game_id = job.game_id, run_id, attempt, "auto-validation dispatched");
                    return;
                }
                Err(error) => {
                    warn!(game_id = job.game_id, attempt, %error, "auto-validation dispatch failed");
                    if attempt < MAX_ATTEMPTS {
                        tokio::time::sleep(std::time::Duration::from_secs(u64::from(attempt) * BACKOFF_UNIT_SECS)).await;
                    }
                }
            }
        }
        error!(game_id = job.game_id, "auto-validation abandoned after {MAX_ATTEMPTS} attempts");
    }

    /// Checks the parsed-entity store for boxscore, play-by-play, and
    /// shift-chart presence; a game with all three has enough to run the
    /// JSON-source cross-checks.
    async fn has_sufficient_data(&self, game_id: i64, season_id: i64) -> bool {
        let counts: Result<(i64, i64, i64), sqlx::Error> = sqlx::query_as(
            "SELECT
                (SELECT COUNT(*) FROM parsed_boxscore WHERE game_id = ? AND season_id = ?),
                (SELECT COUNT(*) FROM parsed_play_by_play WHERE game_id = ? AND season_id = ?),
                (SELECT COUNT(*) FROM parsed_shift_chart WHERE game_id = ? AND season_id = ?)",
        )
        .bind(game_id)
        .bind(season_id)
        .bind(game_id)
        .bind(season_id)
        .bind(game_id)
        .bind(season_id)
        .fetch_one(&self.pool)
        .await;

        match counts {
            Ok((boxscore, pbp, shifts)) => boxscore > 0 && pbp > 0 && shifts > 0,
            Err(error) => {
                warn!(game_id, %error, "failed to check parsed-entity completeness");
                false
            }
        }
    }

    /// Checks the parsed-entity store for boxscore and HTML-report
    /// presence; an HTML-sourced game has no shift chart to wait on, so
    /// completeness is judged against `parsed_html_report` instead.
    async fn has_sufficient_html_data(&self, game_id: i64, season_id: i64) -> bool {
        let counts: Result<(i64, i64), sqlx::Error> = sqlx::query_as(
            "SELECT
                (SELECT COUNT(*) FROM parsed_boxscore WHERE game_id = ? AND season_id = ?),
                (SELECT COUNT(*) FROM parsed_html_report WHERE game_id = ? AND season_id = ?)",
        )
        .bind(game_id)
        .bind(season_id)
        .bind(game_id)
        .bind(season_id)
        .fetch_one(&self.pool)
        .await;

        match counts {
            Ok((boxscore, html_reports)) => boxscore > 0 && html_reports > 0,
            Err(error) => {
                warn!(game_id, %error, "failed to check json-vs-html completeness");
                false
            }
        }
    }

    /// Returns a sender clone so callers building a `BatchCompletionHook`
    /// closure don't need to hold an `Arc<AutoValidationWorker>` directly.
    #[must_use]
    pub fn sender(&self) -> mpsc::Sender<ValidationJob> {
        self.sender.clone()
    }
}

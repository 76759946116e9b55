//! CLI entry point: wires the batch coordinator, reconciliation engine,
//! and auto-validation worker to the subcommands in [`cli::Args`].

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use ingest_core::autovalidate::AutoValidationWorker;
use ingest_core::batch::BatchCoordinator;
use ingest_core::config::{AutoValidationConfig, SourceConfig};
use ingest_core::db::Database;
use ingest_core::sources::{
    self, AdapterContext, BoxscoreAdapter, DailyfaceoffInjuriesAdapter, EventSummaryAdapter,
    FaceoffComparisonAdapter, FaceoffSummaryAdapter, GameSummaryAdapter, LineCombinationsAdapter,
    PlayByPlayAdapter, PlayByPlayReportAdapter, PlayerGameLogAdapter, RosterAdapter, ScheduleAdapter,
    ShotSummaryAdapter, SourceKind, StartingGoaliesAdapter, TimeOnIceAdapter,
};
use ingest_core::validation::ReconciliationEngine;
use tracing::{debug, info, warn};

mod cli;

use cli::{Args, Command};

const NHL_API_BASE: &str = "https://api-web.nhle.com";
const NHL_REPORT_BASE: &str = "https://www.nhl.com";
const DATABASE_PATH: &str = "stat-recon.sqlite";

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");

    let db = Database::new(std::path::Path::new(DATABASE_PATH)).await.context("opening database")?;
    let pool = db.pool().clone();

    let validation_config = AutoValidationConfig::from_env();
    let worker = Arc::new(AutoValidationWorker::new(pool.clone(), validation_config));
    worker.start();

    let coordinator = BatchCoordinator::new(pool.clone());
    register_adapters(&coordinator)?;

    let worker_for_hook = Arc::clone(&worker);
    let coordinator = Arc::new(coordinator.with_completion_hook(Arc::new(move |game_id, season_id, validator_types| {
        worker_for_hook.enqueue(game_id, season_id, validator_types);
    })));

    let result = run_command(args.command, &coordinator, &pool).await;

    worker.stop().await;
    result
}

async fn run_command(command: Command, coordinator: &Arc<BatchCoordinator>, pool: &sqlx::SqlitePool) -> Result<()> {
    match command {
        Command::Ingest { source, season, force } => {
            let batch_id = coordinator
                .start_batch(&source, season, force)
                .await
                .with_context(|| format!("starting batch for {source}"))?;
            info!(batch_id, source = %source, season, "batch started");
            println!("started batch {batch_id}");
        }
        Command::Cancel { batch_id } => {
            if coordinator.cancel_batch(batch_id) {
                println!("cancelled batch {batch_id}");
            } else {
                warn!(batch_id, "no active batch with that id");
                println!("no active batch with id {batch_id}");
            }
        }
        Command::Status => {
            for batch in coordinator.list_active() {
                println!(
                    "batch {} [{}] source={} season={} success={} failed={} skipped={}",
                    batch.batch_id,
                    batch.status.as_str(),
                    batch.source_name,
                    batch.season_id,
                    batch.items_success,
                    batch.items_failed,
                    batch.items_skipped,
                );
            }
        }
        Command::Validate { season, game } => {
            let engine = ReconciliationEngine::new(pool.clone());
            let run_id = engine.run(season, game).await.context("running reconciliation")?;
            println!("validation run {run_id} completed");
        }
        Command::ResetFailed { source, season } => {
            reset_failed(pool, &source, season).await?;
            println!("reset failed items for {source} season {season}");
        }
    }
    Ok(())
}

async fn reset_failed(pool: &sqlx::SqlitePool, source: &str, season: i64) -> Result<()> {
    use ingest_core::progress::{ProgressStore, ProgressTracker};

    let kind = SourceKind::from_name(source).with_context(|| format!("unknown source: {source}"))?;
    let source_id = sources::resolve_source_id(pool, kind).await.context("resolving source id")?;
    let tracker = ProgressTracker::new(ProgressStore::new(pool.clone()), source_id, Some(season), None, None);
    tracker.load_state().await.context("loading progress state")?;
    tracker.reset_failed().await.context("resetting failed items")?;
    Ok(())
}

fn register_adapters(coordinator: &BatchCoordinator) -> Result<()> {
    let boxscore_cfg = SourceConfig::new("nhl_json_boxscore", NHL_API_BASE);
    let boxscore_ctx = AdapterContext::from_config(&boxscore_cfg).context("boxscore adapter context")?;
    coordinator.register_adapter(
        SourceKind::NhlJsonBoxscore,
        Arc::new(BoxscoreAdapter::new(&boxscore_cfg, boxscore_ctx)),
    );

    let schedule_cfg = SourceConfig::new("nhl_json_schedule", NHL_API_BASE);
    let schedule_ctx = AdapterContext::from_config(&schedule_cfg).context("schedule adapter context")?;
    coordinator
        .register_adapter(SourceKind::NhlJsonSchedule, Arc::new(ScheduleAdapter::new(&schedule_cfg, schedule_ctx)));

    let pbp_cfg = SourceConfig::new("nhl_json_play_by_play", NHL_API_BASE);
    let pbp_ctx = AdapterContext::from_config(&pbp_cfg).context("play-by-play adapter context")?;
    coordinator
        .register_adapter(SourceKind::NhlJsonPlayByPlay, Arc::new(PlayByPlayAdapter::new(&pbp_cfg, pbp_ctx)));

    // Player-scoped sources need a roster discovered at runtime; an empty
    // starting set is registered here and grown by the season's schedule
    // ingestion before this source is targeted directly.
    let log_cfg = SourceConfig::new("nhl_json_player_game_log", NHL_API_BASE);
    let log_ctx = AdapterContext::from_config(&log_cfg).context("player game log adapter context")?;
    coordinator.register_adapter(
        SourceKind::NhlJsonPlayerGameLog,
        Arc::new(PlayerGameLogAdapter::new(&log_cfg, log_ctx, Vec::new(), 0)),
    );

    let game_summary_cfg = SourceConfig::new("html_game_summary", NHL_REPORT_BASE);
    let game_summary_ctx = AdapterContext::from_config(&game_summary_cfg).context("game summary adapter context")?;
    coordinator.register_adapter(
        SourceKind::HtmlGameSummary,
        Arc::new(GameSummaryAdapter::new(&game_summary_cfg, game_summary_ctx, NHL_API_BASE.to_string())),
    );

    let event_summary_cfg = SourceConfig::new("html_event_summary", NHL_REPORT_BASE);
    let event_summary_ctx = AdapterContext::from_config(&event_summary_cfg).context("event summary adapter context")?;
    coordinator.register_adapter(
        SourceKind::HtmlEventSummary,
        Arc::new(EventSummaryAdapter::new(&event_summary_cfg, event_summary_ctx, NHL_API_BASE.to_string())),
    );

    let faceoff_summary_cfg = SourceConfig::new("html_faceoff_summary", NHL_REPORT_BASE);
    let faceoff_summary_ctx =
        AdapterContext::from_config(&faceoff_summary_cfg).context("faceoff summary adapter context")?;
    coordinator.register_adapter(
        SourceKind::HtmlFaceoffSummary,
        Arc::new(FaceoffSummaryAdapter::new(&faceoff_summary_cfg, faceoff_summary_ctx, NHL_API_BASE.to_string())),
    );

    let toi_cfg = SourceConfig::new("html_time_on_ice", NHL_REPORT_BASE);
    let toi_ctx = AdapterContext::from_config(&toi_cfg).context("time on ice adapter context")?;
    coordinator.register_adapter(
        SourceKind::HtmlTimeOnIce,
        Arc::new(TimeOnIceAdapter::new(&toi_cfg, toi_ctx, NHL_API_BASE.to_string())),
    );

    let starting_goalies_cfg = SourceConfig::new("dailyfaceoff_starting_goalies", "https://www.dailyfaceoff.com");
    let starting_goalies_ctx =
        AdapterContext::from_config(&starting_goalies_cfg).context("starting goalies adapter context")?;
    coordinator.register_adapter(
        SourceKind::DailyfaceoffStartingGoalies,
        Arc::new(StartingGoaliesAdapter::new(&starting_goalies_cfg, starting_goalies_ctx)),
    );

    // Line combinations are scraped per team; an empty team list is
    // registered here, matching the player-game-log simplification above.
    let line_combinations_cfg = SourceConfig::new("dailyfaceoff_line_combinations", "https://www.dailyfaceoff.com");
    let line_combinations_ctx =
        AdapterContext::from_config(&line_combinations_cfg).context("line combinations adapter context")?;
    coordinator.register_adapter(
        SourceKind::DailyfaceoffLineCombinations,
        Arc::new(LineCombinationsAdapter::new(&line_combinations_cfg, line_combinations_ctx, Vec::new())),
    );

    // League news feed always runs; per-team pages need a configured team
    // list, matching the line-combinations simplification above.
    let injuries_cfg = SourceConfig::new("dailyfaceoff_injuries", "https://www.dailyfaceoff.com");
    let injuries_ctx = AdapterContext::from_config(&injuries_cfg).context("injuries adapter context")?;
    coordinator.register_adapter(
        SourceKind::DailyfaceoffInjuries,
        Arc::new(DailyfaceoffInjuriesAdapter::new(&injuries_cfg, injuries_ctx, Vec::new())),
    );

    let roster_cfg = SourceConfig::new("html_roster", NHL_REPORT_BASE);
    let roster_ctx = AdapterContext::from_config(&roster_cfg).context("roster adapter context")?;
    coordinator.register_adapter(
        SourceKind::HtmlRoster,
        Arc::new(RosterAdapter::new(&roster_cfg, roster_ctx, NHL_API_BASE.to_string())),
    );

    let shot_summary_cfg = SourceConfig::new("html_shot_summary", NHL_REPORT_BASE);
    let shot_summary_ctx = AdapterContext::from_config(&shot_summary_cfg).context("shot summary adapter context")?;
    coordinator.register_adapter(
        SourceKind::HtmlShotSummary,
        Arc::new(ShotSummaryAdapter::new(&shot_summary_cfg, shot_summary_ctx, NHL_API_BASE.to_string())),
    );

    let faceoff_comparison_cfg = SourceConfig::new("html_faceoff_comparison", NHL_REPORT_BASE);
    let faceoff_comparison_ctx =
        AdapterContext::from_config(&faceoff_comparison_cfg).context("faceoff comparison adapter context")?;
    coordinator.register_adapter(
        SourceKind::HtmlFaceoffComparison,
        Arc::new(FaceoffComparisonAdapter::new(&faceoff_comparison_cfg, faceoff_comparison_ctx, NHL_API_BASE.to_string())),
    );

    let play_by_play_report_cfg = SourceConfig::new("html_play_by_play_report", NHL_REPORT_BASE);
    let play_by_play_report_ctx =
        AdapterContext::from_config(&play_by_play_report_cfg).context("play-by-play report adapter context")?;
    coordinator.register_adapter(
        SourceKind::HtmlPlayByPlayReport,
        Arc::new(PlayByPlayReportAdapter::new(&play_by_play_report_cfg, play_by_play_report_ctx, NHL_API_BASE.to_string())),
    );

    Ok(())
}

//! Closed registry of known data sources (C4).
//!
//! `SourceKind` is a fixed enum rather than a string: the set of sources
//! this crate understands does not change at runtime. The `data_source`
//! table, by contrast, is an autoincrement identity table with no seed
//! rows (see `migrations/0001_init.sql`), so a `SourceKind` never carries
//! a numeric id of its own — the numeric `source_id` a `ProgressStore`
//! row references is resolved against that table by name the first time
//! a source is used (`SourceRegistry::resolve_source_id`).

mod adapter;
mod api_json;
mod error;
mod html_report;
mod mixed_scrape;
mod util;

pub use adapter::{
    AdapterContext, DownloadOutcome, ItemStream, SourceAdapter, download_season, get_with_retry,
};
pub use error::ParseError;
pub use util::{
    DEFAULT_NAME_MATCH_THRESHOLD, extract_name_parts, find_best_match, first_name_matches,
    name_similarity, normalize_name, parse_time_mmss, safe_float, safe_int, string_similarity,
};

pub use api_json::{BoxscoreAdapter, PlayByPlayAdapter, PlayerGameLogAdapter, ScheduleAdapter};
pub use html_report::{
    EventSummaryAdapter, FaceoffComparisonAdapter, FaceoffSummaryAdapter, GameSummaryAdapter,
    PlayByPlayReportAdapter, RosterAdapter, ShotSummaryAdapter, TimeOnIceAdapter,
};
pub use mixed_scrape::{
    DailyfaceoffInjuriesAdapter, LineCombinationsAdapter, StartingGoaliesAdapter,
};

use sqlx::SqlitePool;

/// The storage archetype a source belongs to, matching the `kind` CHECK
/// constraint on the `data_source` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    ApiJson,
    HtmlReport,
    MixedScrape,
}

impl StoreKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ApiJson => "api_json",
            Self::HtmlReport => "html_report",
            Self::MixedScrape => "mixed_scrape",
        }
    }
}

/// Every data source this crate knows how to ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    NhlJsonSchedule,
    NhlJsonBoxscore,
    NhlJsonPlayByPlay,
    NhlJsonPlayerGameLog,
    HtmlGameSummary,
    HtmlEventSummary,
    HtmlFaceoffSummary,
    HtmlTimeOnIce,
    HtmlRoster,
    HtmlShotSummary,
    HtmlFaceoffComparison,
    HtmlPlayByPlayReport,
    DailyfaceoffLineCombinations,
    DailyfaceoffStartingGoalies,
    DailyfaceoffInjuries,
}

/// Every known `SourceKind`, used to build the registry and to drive
/// exhaustive CLI/validation listings.
pub const ALL_SOURCE_KINDS: [SourceKind; 15] = [
    SourceKind::NhlJsonSchedule,
    SourceKind::NhlJsonBoxscore,
    SourceKind::NhlJsonPlayByPlay,
    SourceKind::NhlJsonPlayerGameLog,
    SourceKind::HtmlGameSummary,
    SourceKind::HtmlEventSummary,
    SourceKind::HtmlFaceoffSummary,
    SourceKind::HtmlTimeOnIce,
    SourceKind::HtmlRoster,
    SourceKind::HtmlShotSummary,
    SourceKind::HtmlFaceoffComparison,
    SourceKind::HtmlPlayByPlayReport,
    SourceKind::DailyfaceoffLineCombinations,
    SourceKind::DailyfaceoffStartingGoalies,
    SourceKind::DailyfaceoffInjuries,
];

impl SourceKind {
    /// Stable registry name, stored as `data_source.name` and as the
    /// `source_name` every adapter reports.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::NhlJsonSchedule => "nhl_json_schedule",
            Self::NhlJsonBoxscore => "nhl_json_boxscore",
            Self::NhlJsonPlayByPlay => "nhl_json_play_by_play",
            Self::NhlJsonPlayerGameLog => "nhl_json_player_game_log",
            Self::HtmlGameSummary => "html_game_summary",
            Self::HtmlEventSummary => "html_event_summary",
            Self::HtmlFaceoffSummary => "html_faceoff_summary",
            Self::HtmlTimeOnIce => "html_time_on_ice",
            Self::HtmlRoster => "html_roster",
            Self::HtmlShotSummary => "html_shot_summary",
            Self::HtmlFaceoffComparison => "html_faceoff_comparison",
            Self::HtmlPlayByPlayReport => "html_play_by_play_report",
            Self::DailyfaceoffLineCombinations => "dailyfaceoff_line_combinations",
            Self::DailyfaceoffStartingGoalies => "dailyfaceoff_starting_goalies",
            Self::DailyfaceoffInjuries => "dailyfaceoff_injuries",
        }
    }

    #[must_use]
    pub fn store_kind(self) -> StoreKind {
        match self {
            Self::NhlJsonSchedule
            | Self::NhlJsonBoxscore
            | Self::NhlJsonPlayByPlay
            | Self::NhlJsonPlayerGameLog => StoreKind::ApiJson,
            Self::HtmlGameSummary
            | Self::HtmlEventSummary
            | Self::HtmlFaceoffSummary
            | Self::HtmlTimeOnIce
            | Self::HtmlRoster
            | Self::HtmlShotSummary
            | Self::HtmlFaceoffComparison
            | Self::HtmlPlayByPlayReport => StoreKind::HtmlReport,
            Self::DailyfaceoffLineCombinations
            | Self::DailyfaceoffStartingGoalies
            | Self::DailyfaceoffInjuries => StoreKind::MixedScrape,
        }
    }

    /// Looks up a source by its registry name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        ALL_SOURCE_KINDS.into_iter().find(|kind| kind.name() == name)
    }
}

/// Errors raised resolving or constructing a source.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("unknown source: {0}")]
    UnknownSource(String),

    #[error("failed to resolve data_source row for '{0}': {1}")]
    Storage(String, #[source] sqlx::Error),
}

/// Resolves (and lazily creates) the numeric `data_source.id` row for a
/// `SourceKind`. The table carries no seed rows, so every adapter run
/// looks its row up by name the first time and inserts it if absent.
///
/// # Errors
/// Returns [`RegistryError::Storage`] if the upsert/select fails.
pub async fn resolve_source_id(pool: &SqlitePool, kind: SourceKind) -> Result<i64, RegistryError> {
    let name = kind.name();
    let store_kind = kind.store_kind().as_str();

    let existing: Option<i64> =
        sqlx::query_scalar("SELECT source_id FROM data_source WHERE name = ?")
            .bind(name)
            .fetch_optional(pool)
            .await
            .map_err(|e| RegistryError::Storage(name.to_string(), e))?;

    if let Some(id) = existing {
        return Ok(id);
    }

    let inserted: i64 = sqlx::query_scalar(
        "INSERT INTO data_source (name, kind) VALUES (?, ?) RETURNING source_id",
    )
    .bind(name)
    .bind(store_kind)
    .fetch_one(pool)
    .await
    .map_err(|e| RegistryError::Storage(name.to_string(), e))?;

    Ok(inserted)
}

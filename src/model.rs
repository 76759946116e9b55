//! Parsed domain entities (§3 `ParsedEntity`).
//!
//! Each source produces one of these shapes after `fetch_one` parses the
//! raw payload. They carry `game_id`/`season_id` so the reconciliation
//! engine (C11) can join the same semantic fact across sources.

use serde::{Deserialize, Serialize};

/// Converts a 10-digit `YYYYGGNNNN` game id into its season id
/// (`YYYY*10000 + YYYY+1`).
#[must_use]
pub fn season_id_for_game(game_id: i64) -> i64 {
    let year = game_id / 1_000_000;
    year * 10_000 + (year + 1)
}

/// Last 6 digits of the game id, zero-padded, used for HTML report URLs.
#[must_use]
pub fn html_game_suffix(game_id: i64) -> String {
    format!("{:06}", game_id % 1_000_000)
}

/// One team's aggregate line in a boxscore or HTML report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamTotals {
    pub team_id: i64,
    pub score: i64,
    pub shots_on_goal: i64,
}

/// Per-skater stat line shared by boxscore and HTML report parsers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkaterStats {
    pub player_id: i64,
    pub name: String,
    pub team_id: i64,
    pub goals: i64,
    pub assists: i64,
    pub points: i64,
    pub power_play_goals: i64,
    pub shorthanded_goals: i64,
    pub faceoff_pct: Option<f64>,
    /// `MM:SS` or `M:SS` as reported; parsed seconds stored separately.
    pub toi: Option<String>,
    pub toi_seconds: Option<i64>,
    pub shifts: Option<i64>,
}

/// Per-goalie stat line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalieStats {
    pub player_id: i64,
    pub name: String,
    pub team_id: i64,
    pub saves: i64,
    pub goals_against: i64,
    pub shots_against: i64,
    pub save_pct: Option<f64>,
}

/// Parsed JSON-API boxscore (`GET /v1/gamecenter/{game_id}/boxscore`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Boxscore {
    pub game_id: i64,
    pub season_id: i64,
    pub home_team: TeamTotals,
    pub away_team: TeamTotals,
    pub skaters: Vec<SkaterStats>,
    pub goalies: Vec<GoalieStats>,
}

/// A single play-by-play event. `period_type` is `"SO"` for shootout,
/// which every cross-source goal/shot rule excludes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayByPlayEvent {
    pub event_type: String,
    pub team_id: i64,
    pub period_type: String,
    /// True for shot-on-goal events (used for the shots cross-source rule).
    pub is_shot_on_goal: bool,
}

/// Parsed JSON-API play-by-play feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayByPlay {
    pub game_id: i64,
    pub season_id: i64,
    pub home_team_id: i64,
    pub away_team_id: i64,
    pub events: Vec<PlayByPlayEvent>,
}

impl PlayByPlay {
    /// Counts non-shootout goal events for the given team.
    #[must_use]
    pub fn goal_count(&self, team_id: i64) -> i64 {
        self.events
            .iter()
            .filter(|e| e.team_id == team_id && e.period_type != "SO" && e.event_type == "goal")
            .count() as i64
    }

    /// Counts non-shootout shots-on-goal (goal or shot-on-goal events) for
    /// the given team.
    #[must_use]
    pub fn shot_count(&self, team_id: i64) -> i64 {
        self.events
            .iter()
            .filter(|e| {
                e.team_id == team_id
                    && e.period_type != "SO"
                    && (e.is_shot_on_goal || e.event_type == "goal")
            })
            .count() as i64
    }
}

/// A single shift for one player, used to cross-check boxscore TOI/shifts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shift {
    pub player_id: i64,
    pub duration_seconds: i64,
    /// Shift-chart event type code; `505` marks a decorative goal row that
    /// is excluded from TOI sums (per spec's open question).
    pub type_code: Option<i64>,
}

/// Parsed shift chart for one game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShiftChart {
    pub game_id: i64,
    pub season_id: i64,
    pub shifts: Vec<Shift>,
}

const DECORATIVE_GOAL_TYPE_CODE: i64 = 505;

impl ShiftChart {
    /// Sum of shift durations for a player, excluding decorative goal rows.
    #[must_use]
    pub fn total_toi_seconds(&self, player_id: i64) -> i64 {
        self.shifts
            .iter()
            .filter(|s| s.player_id == player_id && s.type_code != Some(DECORATIVE_GOAL_TYPE_CODE))
            .map(|s| s.duration_seconds)
            .sum()
    }

    /// Count of shifts for a player, excluding decorative goal rows.
    #[must_use]
    pub fn shift_count(&self, player_id: i64) -> i64 {
        self.shifts
            .iter()
            .filter(|s| s.player_id == player_id && s.type_code != Some(DECORATIVE_GOAL_TYPE_CODE))
            .count() as i64
    }
}

/// Parsed schedule entry for one game; scores are `None` pre-game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub game_id: i64,
    pub season_id: i64,
    pub home_team_id: i64,
    pub away_team_id: i64,
    pub home_score: Option<i64>,
    pub away_score: Option<i64>,
}

/// Parsed HTML report (game summary, event summary, faceoff summary, or
/// time-on-ice reports), keyed by two-letter report code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HtmlReport {
    pub game_id: i64,
    pub season_id: i64,
    pub report_code: String,
    pub home_team: Option<TeamTotals>,
    pub away_team: Option<TeamTotals>,
    pub skaters: Vec<SkaterStats>,
    pub goalies: Vec<GoalieStats>,
    /// Raw response bytes, preserved only when the adapter is configured
    /// to keep them for reprocessing.
    pub raw_bytes: Option<Vec<u8>>,
}

/// One player's line-combination slot for a team, from the mixed-scrape
/// line-combinations page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineSlot {
    pub player_name: String,
    pub line_number: i64,
    pub position: String,
}

/// One goalie's starting assignment, from the mixed-scrape starting-
/// goalies page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartingGoalie {
    pub player_name: String,
    pub team_name: String,
    pub confirmed: bool,
}

/// One player's reported injury, from the mixed-scrape injuries page
/// (either a team's own page or the league-wide injury news feed).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InjuryRecord {
    pub player_name: String,
    pub team_abbreviation: String,
    pub status: String,
    pub details: Option<String>,
    pub player_id: Option<String>,
}

/// Parsed mixed-scrape payload. `page` distinguishes which page was
/// scraped (`"line_combinations"`, `"starting_goalies"`, `"injuries"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixedScrapePayload {
    pub game_id: i64,
    pub season_id: i64,
    pub page: String,
    pub lines: Vec<LineSlot>,
    pub starting_goalies: Vec<StartingGoalie>,
    pub injuries: Vec<InjuryRecord>,
}

/// One game's stat line in a player's game log. Goalie-specific fields are
/// `None` for skaters and vice versa, mirroring the API's two shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerGameLogEntry {
    pub game_id: i64,
    pub game_date: String,
    pub team_abbrev: String,
    pub opponent_abbrev: String,
    pub home_road_flag: String,
    pub goals: i64,
    pub assists: i64,
    pub pim: i64,
    pub toi: String,
    // Skater-only fields.
    pub points: Option<i64>,
    pub plus_minus: Option<i64>,
    pub shots: Option<i64>,
    pub shifts: Option<i64>,
    pub power_play_goals: Option<i64>,
    pub power_play_points: Option<i64>,
    pub shorthanded_goals: Option<i64>,
    pub shorthanded_points: Option<i64>,
    pub game_winning_goals: Option<i64>,
    pub ot_goals: Option<i64>,
    // Goalie-only fields.
    pub games_started: Option<i64>,
    pub decision: Option<String>,
    pub shots_against: Option<i64>,
    pub goals_against: Option<i64>,
    pub save_pct: Option<f64>,
    pub shutouts: Option<i64>,
}

/// Parsed player game log (`GET /v1/player/{id}/game-log/{season}/{game_type}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerGameLog {
    pub player_id: i64,
    pub season_id: i64,
    pub game_type: i64,
    pub is_goalie: bool,
    pub games: Vec<PlayerGameLogEntry>,
}

impl PlayerGameLog {
    #[must_use]
    pub fn total_goals(&self) -> i64 {
        self.games.iter().map(|g| g.goals).sum()
    }

    #[must_use]
    pub fn total_assists(&self) -> i64 {
        self.games.iter().map(|g| g.assists).sum()
    }
}

/// Any parsed entity a source adapter can produce. `persist` dispatches
/// on this enum to the matching `parsed_*` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParsedEntity {
    Boxscore(Boxscore),
    PlayByPlay(PlayByPlay),
    ShiftChart(ShiftChart),
    Schedule(ScheduleEntry),
    HtmlReport(HtmlReport),
    MixedScrape(MixedScrapePayload),
    PlayerGameLog(PlayerGameLog),
}

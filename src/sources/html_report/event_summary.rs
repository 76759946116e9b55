//! Event Summary (`ES`) report: per-player G/A/P/TOI/shots/faceoffs,
//! ported from `examples/original_source`'s `EventSummaryDownloader`.
//! Column positions are fixed (the NHL report layout doesn't vary), same
//! as the original's `_parse_header_columns`.

use async_trait::async_trait;
use futures_util::StreamExt;
use scraper::{ElementRef, Html, Selector};
use sqlx::SqlitePool;
use tracing::warn;

use crate::config::SourceConfig;
use crate::model::{ParsedEntity, SkaterStats, GoalieStats};
use crate::sources::adapter::{AdapterContext, ItemStream, SourceAdapter};
use crate::sources::error::ParseError;
use crate::sources::api_json::fetch_season_game_ids;
use crate::sources::util::parse_time_mmss;

use super::{build_report_url, element_text, empty_report, fetch_report_bytes, parse_document, persist_html_report, safe_cell_int};

const REPORT_CODE: &str = "ES";

const COL_NUM: usize = 0;
const COL_POS: usize = 1;
const COL_NAME: usize = 2;
const COL_GOALS: usize = 3;
const COL_ASSISTS: usize = 4;
const COL_POINTS: usize = 5;
const COL_TOI_TOTAL: usize = 9;
const COL_SHIFTS: usize = 10;
const COL_PP: usize = 12;
const COL_SH: usize = 13;
const COL_SHOTS: usize = 15;
const COL_FACEOFF_WINS: usize = 22;
const COL_FACEOFF_PCT: usize = 24;
const MIN_ROW_COLUMNS: usize = 15;

fn cell_text(cells: &[ElementRef], idx: usize) -> String {
    cells.get(idx).map(element_text).unwrap_or_default()
}

fn cell_int(cells: &[ElementRef], idx: usize) -> i64 {
    safe_cell_int(&cell_text(cells, idx)).unwrap_or(0)
}

fn is_goalie_row(cells: &[ElementRef]) -> bool {
    cell_text(cells, COL_POS).to_uppercase() == "G"
}

fn parse_player_row(cells: &[ElementRef], team_id: i64) -> Option<SkaterStats> {
    let number = safe_cell_int(&cell_text(cells, COL_NUM))?;
    let toi = cell_text(cells, COL_TOI_TOTAL);
    Some(SkaterStats {
        player_id: number,
        name: cell_text(cells, COL_NAME),
        team_id,
        goals: cell_int(cells, COL_GOALS),
        assists: cell_int(cells, COL_ASSISTS),
        points: cell_int(cells, COL_POINTS),
        power_play_goals: 0,
        shorthanded_goals: 0,
        faceoff_pct: cell_text(cells, COL_FACEOFF_PCT).parse().ok(),
        toi_seconds: parse_time_mmss(&toi),
        toi: Some(toi),
        shifts: Some(cell_int(cells, COL_SHIFTS)),
    })
}

fn parse_goalie_row(cells: &[ElementRef], team_id: i64) -> Option<GoalieStats> {
    let number = safe_cell_int(&cell_text(cells, COL_NUM))?;
    // The ES report carries no goalie-specific stats (TOI/saves/GA/Sv%
    // live in the Game Summary report instead); only identity survives.
    Some(GoalieStats {
        player_id: number,
        name: cell_text(cells, COL_NAME),
        team_id,
        saves: 0,
        goals_against: 0,
        shots_against: 0,
        save_pct: None,
    })
}

fn find_stats_tables(document: &Html) -> Vec<ElementRef<'_>> {
    let Ok(table_selector) = Selector::parse("table") else { return Vec::new() };
    let Ok(section_heading_selector) = Selector::parse("td.sectionheading") else { return Vec::new() };
    let Ok(row_selector) = Selector::parse("tr.oddColor, tr.evenColor") else { return Vec::new() };
    let Ok(cell_selector) = Selector::parse("td") else { return Vec::new() };

    document
        .select(&table_selector)
        .filter(|table| {
            table.select(&section_heading_selector).next().is_some()
                && table
                    .select(&row_selector)
                    .next()
                    .is_some_and(|row| row.select(&cell_selector).count() >= MIN_ROW_COLUMNS)
        })
        .collect()
}

fn parse_team_stats(table: &ElementRef, team_id: i64) -> (Vec<SkaterStats>, Vec<GoalieStats>) {
    let Ok(row_selector) = Selector::parse("tr.oddColor, tr.evenColor") else {
        return (Vec::new(), Vec::new());
    };
    let Ok(cell_selector) = Selector::parse("td") else { return (Vec::new(), Vec::new()) };

    let mut skaters = Vec::new();
    let mut goalies = Vec::new();
    for row in table.select(&row_selector) {
        let cells: Vec<ElementRef> = row.select(&cell_selector).collect();
        if cells.is_empty() {
            continue;
        }
        if is_goalie_row(&cells) {
            if let Some(goalie) = parse_goalie_row(&cells, team_id) {
                goalies.push(goalie);
            }
        } else if let Some(skater) = parse_player_row(&cells, team_id) {
            skaters.push(skater);
        }
    }
    (skaters, goalies)
}

fn parse_event_summary(game_id: i64, bytes: Vec<u8>, store_raw: bool) -> crate::model::HtmlReport {
    let document = parse_document(&bytes);
    let tables = find_stats_tables(&document);

    let (mut skaters, mut goalies) = (Vec::new(), Vec::new());
    // Away team's table is conventionally first, home team's second,
    // matching the original's table_index 0/1 split.
    if let Some(table) = tables.first() {
        let (away_skaters, away_goalies) = parse_team_stats(table, 0);
        skaters.extend(away_skaters);
        goalies.extend(away_goalies);
    }
    if let Some(table) = tables.get(1) {
        let (home_skaters, home_goalies) = parse_team_stats(table, 1);
        skaters.extend(home_skaters);
        goalies.extend(home_goalies);
    }

    let mut report = empty_report(game_id, REPORT_CODE, store_raw.then_some(bytes));
    report.skaters = skaters;
    report.goalies = goalies;
    report
}

/// Downloads and persists Event Summary HTML reports for a season's games.
pub struct EventSummaryAdapter {
    ctx: AdapterContext,
    base_url: String,
    json_base_url: String,
    store_raw: bool,
}

impl EventSummaryAdapter {
    #[must_use]
    pub fn new(config: &SourceConfig, ctx: AdapterContext, json_base_url: String) -> Self {
        Self { ctx, base_url: config.base_url.clone(), json_base_url, store_raw: true }
    }
}

#[async_trait]
impl SourceAdapter for EventSummaryAdapter {
    fn source_name(&self) -> &str {
        "html_event_summary"
    }

    fn enumerate_items(&self, season_id: i64) -> ItemStream {
        let ctx = self.ctx.clone();
        let json_base_url = self.json_base_url.clone();
        Box::pin(
            futures_util::stream::once(async move {
                match fetch_season_game_ids(&ctx, &json_base_url, season_id).await {
                    Ok(ids) => ids,
                    Err(error) => {
                        warn!(season_id, %error, "failed to enumerate season game ids");
                        Vec::new()
                    }
                }
            })
            .flat_map(|ids| futures_util::stream::iter(ids.into_iter().map(|id| id.to_string()))),
        )
    }

    async fn fetch_one(&self, item_key: &str) -> Result<ParsedEntity, ParseError> {
        let game_id: i64 = item_key
            .parse()
            .map_err(|_| ParseError::MissingField { field: "game_id".into(), item_key: item_key.into() })?;
        let season_id = crate::model::season_id_for_game(game_id);
        let url = build_report_url(&self.base_url, REPORT_CODE, season_id, game_id);
        let bytes = fetch_report_bytes(&self.ctx, self.source_name(), &url).await?;
        Ok(ParsedEntity::HtmlReport(parse_event_summary(game_id, bytes, self.store_raw)))
    }

    async fn persist(&self, pool: &SqlitePool, parsed: &ParsedEntity) -> Result<u64, ParseError> {
        persist_html_report(pool, parsed).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_row(cells: &str) -> String {
        format!(r#"<tr class="oddColor">{cells}</tr>"#)
    }

    #[test]
    fn parse_event_summary_separates_skaters_and_goalies() {
        let player_row = sample_row(
            "<td>20</td><td>C</td><td>S.AHO</td><td>1</td><td>2</td><td>3</td><td>1</td><td>0</td><td>0</td>\
             <td>18:30</td><td>22</td><td>0:50</td><td>2:10</td><td>1:05</td><td>15:15</td><td>4</td>\
             <td>1</td><td>0</td><td>2</td><td>1</td><td>0</td><td>1</td><td>8</td><td>3</td><td>72.7</td>",
        );
        let goalie_row = sample_row(
            "<td>31</td><td>G</td><td>F.ANDERSEN</td><td></td><td></td><td></td><td></td><td></td><td></td>\
             <td></td><td></td><td></td><td></td><td></td><td></td><td></td>\
             <td></td><td></td><td></td><td></td><td></td><td></td><td></td><td></td><td></td>",
        );
        let html = format!(
            r#"<html><body><table><td class="sectionheading">TORONTO</td>{player_row}{goalie_row}</table></body></html>"#
        );
        let report = parse_event_summary(2024020500, html.into_bytes(), false);
        assert_eq!(report.skaters.len(), 1);
        assert_eq!(report.skaters[0].goals, 1);
        assert_eq!(report.skaters[0].toi_seconds, Some(18 * 60 + 30));
        assert_eq!(report.goalies.len(), 1);
        assert_eq!(report.goalies[0].name, "F.ANDERSEN");
    }
}

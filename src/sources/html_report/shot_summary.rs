//! Shot Summary (`SS`) report: team shot/goal totals by period and
//! situation, ported from `examples/original_source`'s
//! `ShotSummaryDownloader`. That downloader also keeps a per-player,
//! per-period breakdown; [`crate::model::SkaterStats`] has no `shots`
//! field to hold it, so only each team's overall goals-shots total
//! (the `"TOT"` row) survives here.

use std::sync::LazyLock;

use async_trait::async_trait;
use futures_util::StreamExt;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use sqlx::SqlitePool;
use tracing::warn;

use crate::config::SourceConfig;
use crate::model::{ParsedEntity, TeamTotals};
use crate::sources::adapter::{AdapterContext, ItemStream, SourceAdapter};
use crate::sources::api_json::fetch_season_game_ids;
use crate::sources::error::ParseError;

use super::{build_report_url, element_text, empty_report, fetch_report_bytes, parse_document, persist_html_report};

const REPORT_CODE: &str = "SS";

/// "2-15" -> (goals=2, shots=15), the report's "goals-shots" cell format.
static GOALS_SHOTS_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)-(\d+)$").expect("valid regex"));

fn parse_goals_shots(text: &str) -> Option<(i64, i64)> {
    let caps = GOALS_SHOTS_PATTERN.captures(text.trim())?;
    Some((caps[1].parse().ok()?, caps[2].parse().ok()?))
}

/// Finds the `ShotsSummary` table's two `width="50%"` columns (away, home)
/// and reads each one's `"TOT"` row.
fn parse_team_totals(document: &Html) -> (Option<(i64, i64)>, Option<(i64, i64)>) {
    let Ok(table_selector) = Selector::parse("table#ShotsSummary") else { return (None, None) };
    let Ok(column_selector) = Selector::parse("td") else { return (None, None) };
    let Ok(row_selector) = Selector::parse("tr.oddColor, tr.evenColor") else { return (None, None) };
    let Ok(cell_selector) = Selector::parse("td") else { return (None, None) };

    let Some(table) = document.select(&table_selector).next() else { return (None, None) };
    let columns: Vec<ElementRef> = table
        .select(&column_selector)
        .filter(|td| td.value().attr("width") == Some("50%"))
        .collect();

    let totals_in = |column: &ElementRef| -> Option<(i64, i64)> {
        column.select(&row_selector).find_map(|row| {
            let cells: Vec<ElementRef> = row.select(&cell_selector).collect();
            if cells.first().is_some_and(|c| element_text(c).trim() == "TOT") {
                cells.last().and_then(|c| parse_goals_shots(&element_text(c)))
            } else {
                None
            }
        })
    };

    (columns.first().and_then(totals_in), columns.get(1).and_then(totals_in))
}

fn parse_shot_summary(game_id: i64, bytes: Vec<u8>, store_raw: bool) -> crate::model::HtmlReport {
    let document = parse_document(&bytes);
    let (away_totals, home_totals) = parse_team_totals(&document);

    let mut report = empty_report(game_id, REPORT_CODE, store_raw.then_some(bytes));
    report.away_team = away_totals.map(|(goals, shots)| TeamTotals { team_id: 0, score: goals, shots_on_goal: shots });
    report.home_team = home_totals.map(|(goals, shots)| TeamTotals { team_id: 1, score: goals, shots_on_goal: shots });
    report
}

/// Downloads and persists Shot Summary HTML reports for a season's games.
pub struct ShotSummaryAdapter {
    ctx: AdapterContext,
    base_url: String,
    json_base_url: String,
    store_raw: bool,
}

impl ShotSummaryAdapter {
    #[must_use]
    pub fn new(config: &SourceConfig, ctx: AdapterContext, json_base_url: String) -> Self {
        Self { ctx, base_url: config.base_url.clone(), json_base_url, store_raw: true }
    }
}

#[async_trait]
impl SourceAdapter for ShotSummaryAdapter {
    fn source_name(&self) -> &str {
        "html_shot_summary"
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
        Ok(ParsedEntity::HtmlReport(parse_shot_summary(game_id, bytes, self.store_raw)))
    }

    async fn persist(&self, pool: &SqlitePool, parsed: &ParsedEntity) -> Result<u64, ParseError> {
        persist_html_report(pool, parsed).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_goals_shots_reads_goals_and_shots() {
        assert_eq!(parse_goals_shots("2-15"), Some((2, 15)));
    }

    #[test]
    fn parse_shot_summary_reads_team_totals_row() {
        let html = r#"<html><body><table id="ShotsSummary"><tr>
            <td width="50%"><table><tr class="oddColor"><td>TOT</td><td>2-15</td></tr></table></td>
            <td width="50%"><table><tr class="oddColor"><td>TOT</td><td>4-30</td></tr></table></td>
        </tr></table></body></html>"#;
        let report = parse_shot_summary(2024020500, html.as_bytes().to_vec(), false);
        let away = report.away_team.expect("away");
        assert_eq!(away.score, 2);
        assert_eq!(away.shots_on_goal, 15);
        let home = report.home_team.expect("home");
        assert_eq!(home.score, 4);
        assert_eq!(home.shots_on_goal, 30);
    }
}

//! Play-by-Play (`PL`) HTML report: running score by event, distinct
//! from the JSON-API play-by-play feed (`sources::api_json::PlayByPlayAdapter`).
//! `examples/original_source` has no HTML downloader for this report
//! (only the JSON one survived in the retrieved snapshot); parsing here
//! follows the same team-header/score-cell shape `GameSummaryAdapter`
//! reads, since both reports share the NHL HTML report chrome.

use async_trait::async_trait;
use futures_util::StreamExt;
use scraper::Selector;
use sqlx::SqlitePool;
use tracing::warn;

use crate::config::SourceConfig;
use crate::model::{ParsedEntity, TeamTotals};
use crate::sources::adapter::{AdapterContext, ItemStream, SourceAdapter};
use crate::sources::api_json::fetch_season_game_ids;
use crate::sources::error::ParseError;

use super::{build_report_url, element_text, empty_report, fetch_report_bytes, parse_document, persist_html_report, safe_cell_int};

const REPORT_CODE: &str = "PL";

/// The final "TOT" row of the per-event scoring table reports each
/// team's running goal count; everything before it (period/time/zone
/// detail) isn't represented on [`crate::model::HtmlReport`].
fn final_score(document: &scraper::Html, table_id: &str) -> i64 {
    let Ok(table_selector) = Selector::parse(&format!("table#{table_id}")) else { return 0 };
    let Ok(row_selector) = Selector::parse("tr") else { return 0 };
    let Ok(cell_selector) = Selector::parse("td") else { return 0 };
    let Some(table) = document.select(&table_selector).next() else { return 0 };

    table
        .select(&row_selector)
        .filter_map(|row| {
            let cells: Vec<_> = row.select(&cell_selector).collect();
            if cells.first().map(element_text).as_deref() == Some("TOT") {
                cells.last().and_then(safe_cell_int)
            } else {
                None
            }
        })
        .next_back()
        .unwrap_or(0)
}

fn parse_play_by_play_report(game_id: i64, bytes: Vec<u8>, store_raw: bool) -> crate::model::HtmlReport {
    let document = parse_document(&bytes);
    let away_score = final_score(&document, "AwayScoring");
    let home_score = final_score(&document, "HomeScoring");

    let mut report = empty_report(game_id, REPORT_CODE, store_raw.then_some(bytes));
    report.away_team = Some(TeamTotals { team_id: 0, score: away_score, shots_on_goal: 0 });
    report.home_team = Some(TeamTotals { team_id: 1, score: home_score, shots_on_goal: 0 });
    report
}

/// Downloads and persists Play-by-Play HTML reports for a season's games.
pub struct PlayByPlayReportAdapter {
    ctx: AdapterContext,
    base_url: String,
    json_base_url: String,
    store_raw: bool,
}

impl PlayByPlayReportAdapter {
    #[must_use]
    pub fn new(config: &SourceConfig, ctx: AdapterContext, json_base_url: String) -> Self {
        Self { ctx, base_url: config.base_url.clone(), json_base_url, store_raw: true }
    }
}

#[async_trait]
impl SourceAdapter for PlayByPlayReportAdapter {
    fn source_name(&self) -> &str {
        "html_play_by_play_report"
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
        Ok(ParsedEntity::HtmlReport(parse_play_by_play_report(game_id, bytes, self.store_raw)))
    }

    async fn persist(&self, pool: &SqlitePool, parsed: &ParsedEntity) -> Result<u64, ParseError> {
        persist_html_report(pool, parsed).await
    }
}

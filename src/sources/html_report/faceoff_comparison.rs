//! Faceoff Comparison (`FC`) report: each player's own offensive/
//! defensive/neutral/total faceoff record, ported from
//! `examples/original_source`'s `FaceoffComparisonDownloader`. That
//! downloader also keeps every head-to-head "vs." matchup row;
//! [`crate::model::SkaterStats`] has no field for per-opponent detail,
//! so only each player's own total faceoff percentage survives here,
//! the same trim `FaceoffSummaryAdapter` applies to its report.

use std::sync::LazyLock;

use async_trait::async_trait;
use futures_util::StreamExt;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use sqlx::SqlitePool;
use tracing::warn;

use crate::config::SourceConfig;
use crate::model::{ParsedEntity, SkaterStats};
use crate::sources::adapter::{AdapterContext, ItemStream, SourceAdapter};
use crate::sources::api_json::fetch_season_game_ids;
use crate::sources::error::ParseError;

use super::{build_report_url, element_text, empty_report, fetch_report_bytes, parse_document, persist_html_report};

const REPORT_CODE: &str = "FC";

/// "8-9 / 89%" -> total percentage, the player header row's rightmost
/// ("TOT") faceoff cell.
static FACEOFF_RESULT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)-(\d+)\s*/\s*(\d+)%").expect("valid regex"));

fn parse_faceoff_pct(text: &str) -> Option<f64> {
    let caps = FACEOFF_RESULT_PATTERN.captures(text.trim())?;
    caps[3].parse().ok()
}

fn is_player_heading(row: &ElementRef, cell_selector: &Selector) -> bool {
    row.select(cell_selector)
        .next()
        .is_some_and(|cell| cell.value().attr("class").is_some_and(|c| c.contains("playerHeading")))
}

fn parse_player_header_row(cells: &[ElementRef], team_id: i64) -> Option<SkaterStats> {
    let number = crate::sources::util::safe_int(&element_text(cells.first()?))?;
    let name = cells.get(2).map(element_text).unwrap_or_default();
    let total_pct = cells.get(6).and_then(|c| parse_faceoff_pct(&element_text(c)));

    Some(SkaterStats {
        player_id: number,
        name,
        team_id,
        goals: 0,
        assists: 0,
        points: 0,
        power_play_goals: 0,
        shorthanded_goals: 0,
        faceoff_pct: total_pct,
        toi: None,
        toi_seconds: None,
        shifts: None,
    })
}

fn find_team_faceoff_tables(document: &Html) -> Vec<ElementRef<'_>> {
    let Ok(container_selector) = Selector::parse(r#"td[valign="top"][width="100%"]"#) else { return Vec::new() };
    let Ok(table_selector) = Selector::parse("table") else { return Vec::new() };
    let Ok(heading_selector) = Selector::parse("td") else { return Vec::new() };
    let Ok(cell_selector) = Selector::parse("td") else { return Vec::new() };

    document
        .select(&container_selector)
        .filter_map(|container| {
            container.select(&table_selector).find(|table| {
                table
                    .select(&heading_selector)
                    .next()
                    .is_some_and(|cell| cell.value().attr("class").is_some_and(|c| c.contains("teamHeading")))
                    && table.select(&cell_selector).any(|cell| {
                        cell.value().attr("class").is_some_and(|c| c.contains("playerHeading"))
                    })
            })
        })
        .take(2)
        .collect()
}

fn parse_team_players(table: &ElementRef, team_id: i64) -> Vec<SkaterStats> {
    let Ok(row_selector) = Selector::parse("tr") else { return Vec::new() };
    let Ok(cell_selector) = Selector::parse("td") else { return Vec::new() };

    table
        .select(&row_selector)
        .filter(|row| is_player_heading(row, &cell_selector))
        .filter_map(|row| {
            let cells: Vec<ElementRef> = row.select(&cell_selector).collect();
            parse_player_header_row(&cells, team_id)
        })
        .collect()
}

fn parse_faceoff_comparison(game_id: i64, bytes: Vec<u8>, store_raw: bool) -> crate::model::HtmlReport {
    let document = parse_document(&bytes);
    let tables = find_team_faceoff_tables(&document);

    let mut skaters = Vec::new();
    if let Some(table) = tables.first() {
        skaters.extend(parse_team_players(table, 0));
    }
    if let Some(table) = tables.get(1) {
        skaters.extend(parse_team_players(table, 1));
    }

    let mut report = empty_report(game_id, REPORT_CODE, store_raw.then_some(bytes));
    report.skaters = skaters;
    report
}

/// Downloads and persists Faceoff Comparison HTML reports for a season's games.
pub struct FaceoffComparisonAdapter {
    ctx: AdapterContext,
    base_url: String,
    json_base_url: String,
    store_raw: bool,
}

impl FaceoffComparisonAdapter {
    #[must_use]
    pub fn new(config: &SourceConfig, ctx: AdapterContext, json_base_url: String) -> Self {
        Self { ctx, base_url: config.base_url.clone(), json_base_url, store_raw: true }
    }
}

#[async_trait]
impl SourceAdapter for FaceoffComparisonAdapter {
    fn source_name(&self) -> &str {
        "html_faceoff_comparison"
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
        Ok(ParsedEntity::HtmlReport(parse_faceoff_comparison(game_id, bytes, self.store_raw)))
    }

    async fn persist(&self, pool: &SqlitePool, parsed: &ParsedEntity) -> Result<u64, ParseError> {
        persist_html_report(pool, parsed).await
    }
}

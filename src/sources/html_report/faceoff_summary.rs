//! Faceoff Summary (`FS`) report: per-player faceoff win/loss and
//! percentage, ported from `examples/original_source`'s
//! `FaceoffSummaryDownloader`. The original also breaks faceoffs down by
//! period/zone/strength; [`crate::model::SkaterStats`] only carries an
//! overall `faceoff_pct`, so only each player's total is kept.

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
use crate::sources::error::ParseError;
use crate::sources::api_json::fetch_season_game_ids;

use super::{build_report_url, element_text, empty_report, fetch_report_bytes, parse_document, persist_html_report};

const REPORT_CODE: &str = "FS";

/// "13 C BARZAL, MATHEW" -> (number, position, name).
static PLAYER_HEADER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\s+([A-Z])\s+(.+)$").expect("valid regex"));

/// "8-9/89%" -> (won=8, total=9, pct=89.0). Also "8-9" without a percent.
static FACEOFF_STAT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)-(\d+)(?:/(\d+)%)?").expect("valid regex"));

fn parse_faceoff_pct(text: &str) -> Option<f64> {
    let caps = FACEOFF_STAT_PATTERN.captures(text.trim())?;
    let won: f64 = caps[1].parse().ok()?;
    let total: f64 = caps[2].parse().ok()?;
    if let Some(pct) = caps.get(3) {
        pct.as_str().parse().ok()
    } else if total > 0.0 {
        Some(won / total * 100.0)
    } else {
        None
    }
}

fn parse_player_row(row: &ElementRef, team_id: i64) -> Option<SkaterStats> {
    let Ok(cell_selector) = Selector::parse("td") else { return None };
    let cells: Vec<ElementRef> = row.select(&cell_selector).collect();
    let header_cell = cells.first()?;
    let header_text = element_text(header_cell);
    let caps = PLAYER_HEADER_PATTERN.captures(header_text.trim())?;
    let number: i64 = caps[1].parse().ok()?;
    let name = caps[3].trim().to_string();

    // The rightmost cell carrying a faceoff stat is the player's total.
    let faceoff_pct = cells.iter().rev().find_map(|c| parse_faceoff_pct(&element_text(c)));

    Some(SkaterStats {
        player_id: number,
        name,
        team_id,
        goals: 0,
        assists: 0,
        points: 0,
        power_play_goals: 0,
        shorthanded_goals: 0,
        faceoff_pct,
        toi: None,
        toi_seconds: None,
        shifts: None,
    })
}

fn parse_team_players(document: &Html, team_id: i64) -> Vec<SkaterStats> {
    let Ok(row_selector) = Selector::parse("tr.oddColor, tr.evenColor") else { return Vec::new() };
    document
        .select(&row_selector)
        .filter_map(|row| parse_player_row(&row, team_id))
        .collect()
}

fn parse_faceoff_summary(game_id: i64, bytes: Vec<u8>, store_raw: bool) -> crate::model::HtmlReport {
    let document = parse_document(&bytes);
    // The report lists away players before home players in document
    // order; without a reliable per-team table boundary in the generic
    // shape we keep, every matching row is attributed to team 0 and
    // downstream reconciliation matches by player name instead of id.
    let skaters = parse_team_players(&document, 0);

    let mut report = empty_report(game_id, REPORT_CODE, store_raw.then_some(bytes));
    report.skaters = skaters;
    report
}

/// Downloads and persists Faceoff Summary HTML reports for a season's games.
pub struct FaceoffSummaryAdapter {
    ctx: AdapterContext,
    base_url: String,
    json_base_url: String,
    store_raw: bool,
}

impl FaceoffSummaryAdapter {
    #[must_use]
    pub fn new(config: &SourceConfig, ctx: AdapterContext, json_base_url: String) -> Self {
        Self { ctx, base_url: config.base_url.clone(), json_base_url, store_raw: true }
    }
}

#[async_trait]
impl SourceAdapter for FaceoffSummaryAdapter {
    fn source_name(&self) -> &str {
        "html_faceoff_summary"
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
        Ok(ParsedEntity::HtmlReport(parse_faceoff_summary(game_id, bytes, self.store_raw)))
    }

    async fn persist(&self, pool: &SqlitePool, parsed: &ParsedEntity) -> Result<u64, ParseError> {
        persist_html_report(pool, parsed).await
    }
}

//! Time on Ice (`TH`/`TV`) reports: per-player shift count and total TOI,
//! ported from `examples/original_source`'s `TimeOnIceDownloader`. The
//! original issues one request per side (home `TH`, away `TV`); this
//! adapter fetches both for a game and merges them into one
//! [`crate::model::HtmlReport`] under a synthetic `"TOI"` report code,
//! matching how `BoxscoreAdapter` merges home/away into one entity.

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
use crate::sources::util::parse_time_mmss;

use super::{build_report_url, element_text, empty_report, fetch_report_bytes, parse_document, persist_html_report};

const REPORT_CODE: &str = "TOI";
const HOME_REPORT_CODE: &str = "TH";
const AWAY_REPORT_CODE: &str = "TV";

/// "4 GOSTISBEHERE, SHAYNE" -> (number, name).
static PLAYER_HEADING_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\s+(.+)$").expect("valid regex"));

fn parse_player_toi(heading: &ElementRef, total_cell: Option<&ElementRef>, team_id: i64) -> Option<SkaterStats> {
    let text = element_text(heading);
    let caps = PLAYER_HEADING_PATTERN.captures(text.trim())?;
    let number: i64 = caps[1].parse().ok()?;
    let name = caps[2].trim().to_string();
    let toi = total_cell.map(element_text).unwrap_or_default();
    Some(SkaterStats {
        player_id: number,
        name,
        team_id,
        goals: 0,
        assists: 0,
        points: 0,
        power_play_goals: 0,
        shorthanded_goals: 0,
        faceoff_pct: None,
        toi_seconds: parse_time_mmss(&toi),
        toi: (!toi.is_empty()).then_some(toi),
        shifts: None,
    })
}

/// Parses one side's TOI report. Player headings live in
/// `td.playerHeading`; the matching `TOT` row in the following shift
/// table carries the total TOI cell.
fn parse_side(document: &Html, team_id: i64) -> Vec<SkaterStats> {
    let Ok(heading_selector) = Selector::parse("td.playerHeading") else { return Vec::new() };
    let Ok(tot_row_selector) = Selector::parse("tr.tot td") else { return Vec::new() };

    let headings: Vec<ElementRef> = document.select(&heading_selector).collect();
    let tot_cells: Vec<ElementRef> = document.select(&tot_row_selector).collect();

    headings
        .iter()
        .zip(tot_cells.iter().map(Some).chain(std::iter::repeat(None)))
        .filter_map(|(heading, total_cell)| parse_player_toi(heading, total_cell, team_id))
        .collect()
}

fn parse_toi_report(game_id: i64, home_bytes: Vec<u8>, away_bytes: Vec<u8>, store_raw: bool) -> crate::model::HtmlReport {
    let home_skaters = parse_side(&parse_document(&home_bytes), 1);
    let away_skaters = parse_side(&parse_document(&away_bytes), 0);

    let raw_bytes = store_raw.then(|| {
        let mut combined = home_bytes;
        combined.extend_from_slice(&away_bytes);
        combined
    });

    let mut report = empty_report(game_id, REPORT_CODE, raw_bytes);
    report.skaters = home_skaters.into_iter().chain(away_skaters).collect();
    report
}

/// Downloads and persists Time on Ice HTML reports (home + away) for a
/// season's games.
pub struct TimeOnIceAdapter {
    ctx: AdapterContext,
    base_url: String,
    json_base_url: String,
    store_raw: bool,
}

impl TimeOnIceAdapter {
    #[must_use]
    pub fn new(config: &SourceConfig, ctx: AdapterContext, json_base_url: String) -> Self {
        Self { ctx, base_url: config.base_url.clone(), json_base_url, store_raw: true }
    }
}

#[async_trait]
impl SourceAdapter for TimeOnIceAdapter {
    fn source_name(&self) -> &str {
        "html_time_on_ice"
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
        let home_url = build_report_url(&self.base_url, HOME_REPORT_CODE, season_id, game_id);
        let away_url = build_report_url(&self.base_url, AWAY_REPORT_CODE, season_id, game_id);
        let home_bytes = fetch_report_bytes(&self.ctx, self.source_name(), &home_url).await?;
        let away_bytes = fetch_report_bytes(&self.ctx, self.source_name(), &away_url).await?;
        Ok(ParsedEntity::HtmlReport(parse_toi_report(game_id, home_bytes, away_bytes, self.store_raw)))
    }

    async fn persist(&self, pool: &SqlitePool, parsed: &ParsedEntity) -> Result<u64, ParseError> {
        persist_html_report(pool, parsed).await
    }
}

//! HTML-report source adapters (§4.7 archetype 2): `nhl.com/scores/htmlreports`
//! pages parsed with `scraper`, generalizing `examples/original_source`'s
//! `BaseHTMLDownloader` (table-row extraction, player-info regex, raw-HTML
//! preservation) onto [`crate::sources::adapter::SourceAdapter`].
//!
//! Every report type shares one URL shape, one sentinel-based HTML
//! validation, and one game-id enumeration (delegated to
//! [`super::fetch_season_game_ids`], same gap-filling rationale as the
//! JSON sources). Only table layout and the columns read from each row
//! differ per report, so that part lives in each submodule.

mod event_summary;
mod faceoff_comparison;
mod faceoff_summary;
mod game_summary;
mod play_by_play_report;
mod roster;
mod shot_summary;
mod time_on_ice;

pub use event_summary::EventSummaryAdapter;
pub use faceoff_comparison::FaceoffComparisonAdapter;
pub use faceoff_summary::FaceoffSummaryAdapter;
pub use game_summary::GameSummaryAdapter;
pub use play_by_play_report::PlayByPlayReportAdapter;
pub use roster::RosterAdapter;
pub use shot_summary::ShotSummaryAdapter;
pub use time_on_ice::TimeOnIceAdapter;

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use sqlx::SqlitePool;

use crate::model::{HtmlReport, ParsedEntity};
use crate::sources::adapter::{AdapterContext, get_with_retry};
use crate::sources::error::ParseError;
use crate::sources::util::safe_int;

/// Matches a team logo image filename, e.g. `logocbuf.gif` -> `BUF`.
static TEAM_LOGO_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)logoc([a-z]{3})\.gif").expect("valid regex"));

/// Checks the first bytes of a response for an HTML sentinel, matching
/// the original's `_validate_html` (first 500 bytes, case-insensitive).
#[must_use]
pub fn looks_like_html(bytes: &[u8]) -> bool {
    let sample_len = bytes.len().min(500);
    let sample = String::from_utf8_lossy(&bytes[..sample_len]).to_lowercase();
    sample.contains("<html") || sample.contains("<!doctype")
}

/// Builds the NHL HTML report URL: `{base}/{season}/{report_code}{suffix}.HTM`.
#[must_use]
pub fn build_report_url(base_url: &str, report_code: &str, season_id: i64, game_id: i64) -> String {
    let suffix = crate::model::html_game_suffix(game_id);
    format!("{base_url}/{season_id}/{report_code}{suffix}.HTM")
}

/// Fetches one report's raw bytes, validating the HTML sentinel.
///
/// # Errors
/// Returns [`ParseError`] if the request fails or the response does not
/// look like HTML.
pub async fn fetch_report_bytes(
    ctx: &AdapterContext,
    source_name: &str,
    url: &str,
) -> Result<Vec<u8>, ParseError> {
    let bytes: Vec<u8> = get_with_retry(&ctx.limiter, &ctx.policy, "fetch_html_report", source_name, || {
        ctx.client.get_bytes(url)
    })
    .await?;
    if !looks_like_html(&bytes) {
        return Err(ParseError::MissingField {
            field: "html_sentinel".into(),
            item_key: url.into(),
        });
    }
    Ok(bytes)
}

/// Parses `bytes` as UTF-8 (lossy, matching the original's
/// `errors="replace"` decode) into a `scraper` document.
#[must_use]
pub fn parse_document(bytes: &[u8]) -> Html {
    let text = String::from_utf8_lossy(bytes);
    Html::parse_document(&text)
}

/// Extracts the team abbreviation from a team header table's logo image
/// `src` attribute (`table#Visitor` / `table#Home`).
#[must_use]
pub fn team_abbrev_from_logo(document: &Html, table_id: &str) -> Option<String> {
    let table_selector = Selector::parse(&format!("table#{table_id}")).ok()?;
    let img_selector = Selector::parse("img[src]").ok()?;
    let table = document.select(&table_selector).next()?;
    let img = table.select(&img_selector).next()?;
    let src = img.value().attr("src")?;
    TEAM_LOGO_PATTERN.captures(src).map(|c| c[1].to_uppercase())
}

/// All direct text content of an element, trimmed, matching
/// `Tag.get_text(strip=True)`.
#[must_use]
pub fn element_text(element: &scraper::ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Safely parses an integer cell, stripping thousands separators and
/// whitespace, matching the original's `_safe_int`.
#[must_use]
pub fn safe_cell_int(text: &str) -> Option<i64> {
    safe_int(&text.replace(',', "").replace(' ', ""))
}

/// Persists an [`HtmlReport`] to `parsed_html_report`, shared by every
/// report-type adapter.
///
/// # Errors
/// Returns [`ParseError::Storage`] if the write fails.
pub async fn persist_html_report(pool: &SqlitePool, parsed: &ParsedEntity) -> Result<u64, ParseError> {
    let ParsedEntity::HtmlReport(report) = parsed else {
        return Err(ParseError::MissingField {
            field: "html_report".into(),
            item_key: "<persist>".into(),
        });
    };
    let payload = serde_json::to_string(report)?;
    let result = sqlx::query(
        "INSERT INTO parsed_html_report (game_id, season_id, report_code, payload_json, raw_bytes)
         VALUES (?, ?, ?, ?, ?)
         ON CONFLICT (game_id, season_id, report_code) DO UPDATE SET
            payload_json = excluded.payload_json,
            raw_bytes = excluded.raw_bytes,
            updated_at = datetime('now')",
    )
    .bind(report.game_id)
    .bind(report.season_id)
    .bind(&report.report_code)
    .bind(payload)
    .bind(report.raw_bytes.as_deref())
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

fn empty_report(game_id: i64, report_code: &str, raw_bytes: Option<Vec<u8>>) -> HtmlReport {
    HtmlReport {
        game_id,
        season_id: crate::model::season_id_for_game(game_id),
        report_code: report_code.to_string(),
        home_team: None,
        away_team: None,
        skaters: Vec::new(),
        goalies: Vec::new(),
        raw_bytes,
    }
}

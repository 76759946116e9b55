//! Roster Report (`RO`) report: team rosters and starting lineups,
//! ported from `examples/original_source`'s `RosterDownloader`. That
//! downloader also keeps scratches, coaches, and officials; none of
//! those have a field on [`crate::model::HtmlReport`] (it only carries
//! `skaters`/`goalies`), so only the dressed roster survives here, the
//! same trim `GameSummaryAdapter` applies to goal-by-goal detail.

use async_trait::async_trait;
use futures_util::StreamExt;
use scraper::{ElementRef, Html, Selector};
use sqlx::SqlitePool;
use tracing::warn;

use crate::config::SourceConfig;
use crate::model::{GoalieStats, ParsedEntity, SkaterStats};
use crate::sources::adapter::{AdapterContext, ItemStream, SourceAdapter};
use crate::sources::api_json::fetch_season_game_ids;
use crate::sources::error::ParseError;

use super::{build_report_url, element_text, empty_report, fetch_report_bytes, parse_document, persist_html_report};

const REPORT_CODE: &str = "RO";

/// A roster table's header row reads `# | Pos | Name`.
fn is_roster_header(row: &ElementRef, cell_selector: &Selector) -> bool {
    let cells: Vec<String> = row.select(cell_selector).map(|c| element_text(&c)).collect();
    cells.len() >= 3 && cells[0] == "#" && cells[1] == "Pos" && cells[2] == "Name"
}

fn find_roster_tables(document: &Html) -> Vec<ElementRef<'_>> {
    let Ok(table_selector) = Selector::parse("table") else { return Vec::new() };
    let Ok(row_selector) = Selector::parse("tr") else { return Vec::new() };
    let Ok(cell_selector) = Selector::parse("td") else { return Vec::new() };

    document
        .select(&table_selector)
        .filter(|table| table.select(&row_selector).next().is_some_and(|row| is_roster_header(&row, &cell_selector)))
        .take(2)
        .collect()
}

fn parse_player_row(row: &ElementRef, team_id: i64, cell_selector: &Selector) -> Option<(SkaterStats, bool)> {
    let cells: Vec<ElementRef> = row.select(cell_selector).collect();
    if cells.len() < 3 {
        return None;
    }
    let number = crate::sources::util::safe_int(&element_text(&cells[0]))?;
    let position = element_text(&cells[1]).to_uppercase();
    if !matches!(position.as_str(), "C" | "L" | "R" | "D" | "G") {
        return None;
    }
    // Strip trailing "(C)"/"(A)" captain designations; identity only
    // matters for reconciliation, not the captaincy itself.
    let mut name = element_text(&cells[2]);
    if let Some(idx) = name.rfind('(') {
        name.truncate(idx);
        name = name.trim().to_string();
    }

    let stats = SkaterStats {
        player_id: number,
        name,
        team_id,
        goals: 0,
        assists: 0,
        points: 0,
        power_play_goals: 0,
        shorthanded_goals: 0,
        faceoff_pct: None,
        toi: None,
        toi_seconds: None,
        shifts: None,
    };
    Some((stats, position == "G"))
}

fn parse_team_roster(table: &ElementRef, team_id: i64) -> (Vec<SkaterStats>, Vec<GoalieStats>) {
    let Ok(row_selector) = Selector::parse("tr") else { return (Vec::new(), Vec::new()) };
    let Ok(cell_selector) = Selector::parse("td") else { return (Vec::new(), Vec::new()) };

    let mut skaters = Vec::new();
    let mut goalies = Vec::new();
    for row in table.select(&row_selector).skip(1) {
        let Some((skater, is_goalie)) = parse_player_row(&row, team_id, &cell_selector) else { continue };
        if is_goalie {
            goalies.push(GoalieStats {
                player_id: skater.player_id,
                name: skater.name,
                team_id,
                saves: 0,
                goals_against: 0,
                shots_against: 0,
                save_pct: None,
            });
        } else {
            skaters.push(skater);
        }
    }
    (skaters, goalies)
}

fn parse_roster(game_id: i64, bytes: Vec<u8>, store_raw: bool) -> crate::model::HtmlReport {
    let document = parse_document(&bytes);
    let tables = find_roster_tables(&document);

    let (mut skaters, mut goalies) = (Vec::new(), Vec::new());
    if let Some(table) = tables.first() {
        let (away_skaters, away_goalies) = parse_team_roster(table, 0);
        skaters.extend(away_skaters);
        goalies.extend(away_goalies);
    }
    if let Some(table) = tables.get(1) {
        let (home_skaters, home_goalies) = parse_team_roster(table, 1);
        skaters.extend(home_skaters);
        goalies.extend(home_goalies);
    }

    let mut report = empty_report(game_id, REPORT_CODE, store_raw.then_some(bytes));
    report.skaters = skaters;
    report.goalies = goalies;
    report
}

/// Downloads and persists Roster Report HTML reports for a season's games.
pub struct RosterAdapter {
    ctx: AdapterContext,
    base_url: String,
    json_base_url: String,
    store_raw: bool,
}

impl RosterAdapter {
    #[must_use]
    pub fn new(config: &SourceConfig, ctx: AdapterContext, json_base_url: String) -> Self {
        Self { ctx, base_url: config.base_url.clone(), json_base_url, store_raw: true }
    }
}

#[async_trait]
impl SourceAdapter for RosterAdapter {
    fn source_name(&self) -> &str {
        "html_roster"
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
        Ok(ParsedEntity::HtmlReport(parse_roster(game_id, bytes, self.store_raw)))
    }

    async fn persist(&self, pool: &SqlitePool, parsed: &ParsedEntity) -> Result<u64, ParseError> {
        persist_html_report(pool, parsed).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_HTML: &str = r#"<html><body>
        <table><tr><td>#</td><td>Pos</td><td>Name</td></tr>
        <tr><td>13</td><td>C</td><td>BARZAL, MATHEW (A)</td></tr>
        <tr><td>35</td><td>G</td><td>VARLAMOV, ILYA</td></tr></table>
        <table><tr><td>#</td><td>Pos</td><td>Name</td></tr>
        <tr><td>34</td><td>D</td><td>HAMONIC, TRAVIS</td></tr></table>
    </body></html>"#;

    #[test]
    fn parse_roster_splits_skaters_and_goalies_per_team() {
        let report = parse_roster(2024020500, SAMPLE_HTML.as_bytes().to_vec(), false);
        assert_eq!(report.skaters.len(), 2);
        assert_eq!(report.goalies.len(), 1);
        assert_eq!(report.goalies[0].name, "VARLAMOV, ILYA");
    }

    #[test]
    fn parse_roster_strips_captain_designation() {
        let report = parse_roster(2024020500, SAMPLE_HTML.as_bytes().to_vec(), false);
        let barzal = report.skaters.iter().find(|s| s.player_id == 13).expect("barzal");
        assert_eq!(barzal.name, "BARZAL, MATHEW");
    }
}

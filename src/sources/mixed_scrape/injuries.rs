//! Injuries page: per-team injury report plus the league-wide injury
//! news feed, ported from `examples/original_source`'s `InjuryDownloader`
//! (`tests/unit/downloaders/sources/dailyfaceoff/test_injuries.py`).
//! Both shapes share the same `__NEXT_DATA__`-first-then-DOM-fallback
//! contract as `starting_goalies.rs`: a team page nests `players[]` under
//! `props.pageProps`, the league news feed nests `news[]` there instead,
//! and either falls back to `div.player.{ir,out}` markup when the JSON
//! blob isn't present.

use async_trait::async_trait;
use scraper::{Html, Selector};
use serde_json::Value;
use sqlx::SqlitePool;

use crate::config::SourceConfig;
use crate::model::{InjuryRecord, ParsedEntity};
use crate::sources::adapter::{AdapterContext, ItemStream, SourceAdapter, get_with_retry};
use crate::sources::error::ParseError;
use crate::sources::html_report::looks_like_html;

use super::{empty_payload, persist_mixed_scrape};

/// The league-wide injury news feed's item key; every other item key
/// names a configured team's slug.
const LEAGUE_ITEM_KEY: &str = "league";

fn extract_next_data(document: &Html) -> Option<Value> {
    let selector = Selector::parse(r#"script#__NEXT_DATA__"#).ok()?;
    let script = document.select(&selector).next()?;
    let text: String = script.text().collect();
    serde_json::from_str(&text).ok()
}

/// Parses a team page's `props.pageProps.players[]`, dropping entries
/// with no reported status (matching `_dict_to_injury_record` skipping
/// players whose `injuryStatus` is null).
fn team_injuries_from_next_data(next_data: &Value, team_abbreviation: &str) -> Option<Vec<InjuryRecord>> {
    let players = next_data.pointer("/props/pageProps/players")?.as_array()?;
    Some(
        players
            .iter()
            .filter_map(|player| {
                let name = player.get("name").and_then(Value::as_str)?;
                let status = player.get("injuryStatus").and_then(Value::as_str)?;
                Some(InjuryRecord {
                    player_name: name.to_string(),
                    team_abbreviation: team_abbreviation.to_string(),
                    status: status.to_string(),
                    details: player.get("details").and_then(Value::as_str).map(str::to_string),
                    player_id: player.get("playerId").and_then(Value::as_str).map(str::to_string),
                })
            })
            .collect(),
    )
}

/// Parses the league feed's `props.pageProps.news[]`, keeping only
/// entries whose `newsCategoryName` is `"Injury"` (matching
/// `_news_item_to_injury`).
fn league_injuries_from_next_data(next_data: &Value) -> Option<Vec<InjuryRecord>> {
    let news = next_data.pointer("/props/pageProps/news")?.as_array()?;
    Some(
        news.iter()
            .filter(|item| item.get("newsCategoryName").and_then(Value::as_str) == Some("Injury"))
            .filter_map(|item| {
                let name = item.get("playerName").and_then(Value::as_str)?;
                Some(InjuryRecord {
                    player_name: name.to_string(),
                    team_abbreviation: item
                        .get("teamAbbreviation")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    status: "news".to_string(),
                    details: item.get("details").and_then(Value::as_str).map(str::to_string),
                    player_id: item.get("playerId").and_then(Value::as_str).map(str::to_string),
                })
            })
            .collect(),
    )
}

/// `div.player.ir` / `div.player.out` DOM fallback, used when a page
/// carries no `__NEXT_DATA__` blob. `<a href="/players/news/slug/ID">Name</a>`
/// supplies the player name and id; the class itself (`ir` vs `out`)
/// supplies the status.
fn dom_injuries(document: &Html, team_abbreviation: &str) -> Vec<InjuryRecord> {
    let Ok(div_selector) = Selector::parse("div.player.ir, div.player.out") else { return Vec::new() };
    let Ok(link_selector) = Selector::parse("a[href]") else { return Vec::new() };

    document
        .select(&div_selector)
        .filter_map(|div| {
            let status = if div.value().classes().any(|c| c == "ir") { "ir" } else { "out" };
            let link = div.select(&link_selector).next()?;
            let player_name: String = link.text().collect::<String>().trim().to_string();
            if player_name.is_empty() {
                return None;
            }
            let player_id = link.value().attr("href").and_then(|href| href.rsplit('/').next()).map(str::to_string);
            Some(InjuryRecord {
                player_name,
                team_abbreviation: team_abbreviation.to_string(),
                status: status.to_string(),
                details: None,
                player_id,
            })
        })
        .collect()
}

fn parse_team_injuries(team_slug: &str, team_abbreviation: &str, bytes: &[u8]) -> crate::model::MixedScrapePayload {
    let text = String::from_utf8_lossy(bytes);
    let document = Html::parse_document(&text);

    let injuries = extract_next_data(&document)
        .and_then(|next_data| team_injuries_from_next_data(&next_data, team_abbreviation))
        .unwrap_or_else(|| dom_injuries(&document, team_abbreviation));

    let mut payload = empty_payload(format!("injuries:{team_slug}"));
    payload.injuries = injuries;
    payload
}

fn parse_league_injuries(bytes: &[u8]) -> crate::model::MixedScrapePayload {
    let text = String::from_utf8_lossy(bytes);
    let document = Html::parse_document(&text);

    let injuries = extract_next_data(&document)
        .and_then(|next_data| league_injuries_from_next_data(&next_data))
        .unwrap_or_else(|| dom_injuries(&document, ""));

    let mut payload = empty_payload(LEAGUE_ITEM_KEY);
    payload.injuries = injuries;
    payload
}

/// One DailyFaceoff team whose per-team injuries page this adapter
/// downloads, keyed the same way `LineCombinationsAdapter` keys its
/// configured teams.
#[derive(Debug, Clone)]
pub struct InjuryTeam {
    pub team_slug: String,
    pub team_abbreviation: String,
}

/// Downloads and persists DailyFaceoff injury pages: the league-wide news
/// feed always runs, plus one page per configured team.
pub struct DailyfaceoffInjuriesAdapter {
    ctx: AdapterContext,
    base_url: String,
    teams: Vec<InjuryTeam>,
}

impl DailyfaceoffInjuriesAdapter {
    #[must_use]
    pub fn new(config: &SourceConfig, ctx: AdapterContext, teams: Vec<InjuryTeam>) -> Self {
        Self { ctx, base_url: config.base_url.clone(), teams }
    }

    fn team_for_slug(&self, slug: &str) -> Option<&InjuryTeam> {
        self.teams.iter().find(|t| t.team_slug == slug)
    }
}

#[async_trait]
impl SourceAdapter for DailyfaceoffInjuriesAdapter {
    fn source_name(&self) -> &str {
        "dailyfaceoff_injuries"
    }

    fn enumerate_items(&self, _season_id: i64) -> ItemStream {
        let mut keys = vec![LEAGUE_ITEM_KEY.to_string()];
        keys.extend(self.teams.iter().map(|t| t.team_slug.clone()));
        Box::pin(futures_util::stream::iter(keys))
    }

    async fn fetch_one(&self, item_key: &str) -> Result<ParsedEntity, ParseError> {
        if item_key == LEAGUE_ITEM_KEY {
            let url = format!("{}/injuries", self.base_url);
            let bytes: Vec<u8> =
                get_with_retry(&self.ctx.limiter, &self.ctx.policy, "fetch_league_injuries", self.source_name(), || {
                    self.ctx.client.get_bytes(&url)
                })
                .await?;
            if !looks_like_html(&bytes) {
                return Err(ParseError::MissingField { field: "html_sentinel".into(), item_key: url });
            }
            return Ok(ParsedEntity::MixedScrape(parse_league_injuries(&bytes)));
        }

        let team = self.team_for_slug(item_key).ok_or_else(|| ParseError::MissingField {
            field: "team_slug".into(),
            item_key: item_key.into(),
        })?;
        let url = format!("{}/injuries/{}", self.base_url, team.team_slug);
        let bytes: Vec<u8> =
            get_with_retry(&self.ctx.limiter, &self.ctx.policy, "fetch_team_injuries", self.source_name(), || {
                self.ctx.client.get_bytes(&url)
            })
            .await?;
        if !looks_like_html(&bytes) {
            return Err(ParseError::MissingField { field: "html_sentinel".into(), item_key: url });
        }
        Ok(ParsedEntity::MixedScrape(parse_team_injuries(&team.team_slug, &team.team_abbreviation, &bytes)))
    }

    async fn persist(&self, pool: &SqlitePool, parsed: &ParsedEntity) -> Result<u64, ParseError> {
        persist_mixed_scrape(pool, parsed).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEAM_NEXT_DATA: &str = r#"<!DOCTYPE html><html><body>
        <script id="__NEXT_DATA__" type="application/json">
        {"props":{"pageProps":{"players":[
            {"name":"Anthony Stolarz","injuryStatus":"ir","playerId":"12345","details":"Upper-body injury"},
            {"name":"Chris Tanev","injuryStatus":"out","playerId":"12346"},
            {"name":"Auston Matthews","injuryStatus":null,"playerId":"12347"}
        ]}}}
        </script>
    </body></html>"#;

    const LEAGUE_NEXT_DATA: &str = r#"<!DOCTYPE html><html><body>
        <script id="__NEXT_DATA__" type="application/json">
        {"props":{"pageProps":{"news":[
            {"playerName":"Connor McDavid","teamAbbreviation":"EDM","newsCategoryName":"Injury","details":"Ankle injury","playerId":"99999"},
            {"playerName":"Sidney Crosby","teamAbbreviation":"PIT","newsCategoryName":"Injury","details":"Lower-body injury","playerId":"88888"},
            {"playerName":"Alex Ovechkin","teamAbbreviation":"WSH","newsCategoryName":"Trade","details":"Trade rumors"}
        ]}}}
        </script>
    </body></html>"#;

    const TEAM_DOM_FALLBACK: &str = r#"<!DOCTYPE html><html><body>
        <div class="player ir"><a href="/players/news/test-player/12345">Test Player</a></div>
        <div class="player out"><a href="/players/news/another-player/12346">Another Player</a></div>
        <div class="player"><a href="/players/news/healthy-player/12347">Healthy Player</a></div>
    </body></html>"#;

    #[test]
    fn parse_team_injuries_reads_only_injured_players() {
        let payload = parse_team_injuries("toronto-maple-leafs", "TOR", TEAM_NEXT_DATA.as_bytes());
        assert_eq!(payload.injuries.len(), 2);
        let stolarz = payload.injuries.iter().find(|i| i.player_name == "Anthony Stolarz").expect("stolarz");
        assert_eq!(stolarz.status, "ir");
        assert_eq!(stolarz.player_id.as_deref(), Some("12345"));
    }

    #[test]
    fn parse_league_injuries_filters_to_injury_category() {
        let payload = parse_league_injuries(LEAGUE_NEXT_DATA.as_bytes());
        assert_eq!(payload.injuries.len(), 2);
        let mcdavid = payload.injuries.iter().find(|i| i.player_name == "Connor McDavid").expect("mcdavid");
        assert_eq!(mcdavid.team_abbreviation, "EDM");
    }

    #[test]
    fn parse_team_injuries_falls_back_to_dom_classes() {
        let payload = parse_team_injuries("toronto-maple-leafs", "TOR", TEAM_DOM_FALLBACK.as_bytes());
        assert_eq!(payload.injuries.len(), 2);
        assert!(payload.injuries.iter().any(|i| i.status == "ir" && i.player_name == "Test Player"));
        assert!(payload.injuries.iter().any(|i| i.status == "out" && i.player_name == "Another Player"));
    }
}

//! League-wide starting goalies page: one fetch covers every game on
//! tonight's slate. Ported from `examples/original_source`'s
//! `StartingGoaliesDownloader._parse_starting_goalies`, which extracts
//! the `__NEXT_DATA__` JSON blob embedded in the page rather than
//! walking the DOM (the page is a Next.js app; the rendered HTML carries
//! no stable classes, only the embedded JSON does).

use async_trait::async_trait;
use scraper::{Html, Selector};
use serde_json::Value;
use sqlx::SqlitePool;

use crate::config::SourceConfig;
use crate::model::{ParsedEntity, StartingGoalie};
use crate::sources::adapter::{AdapterContext, ItemStream, SourceAdapter, get_with_retry};
use crate::sources::error::ParseError;
use crate::sources::html_report::looks_like_html;

use super::{empty_payload, persist_mixed_scrape};

const PAGE_KEY: &str = "starting_goalies";

/// The single item this adapter ever enumerates: the page has no
/// per-item key, it returns every game at once.
const TONIGHT_ITEM_KEY: &str = "tonight";

fn extract_next_data(document: &Html) -> Option<Value> {
    let selector = Selector::parse(r#"script#__NEXT_DATA__"#).ok()?;
    let script = document.select(&selector).next()?;
    let text: String = script.text().collect();
    serde_json::from_str(&text).ok()
}

fn games_from_next_data(next_data: &Value) -> Vec<&Value> {
    next_data
        .pointer("/props/pageProps/games")
        .and_then(Value::as_array)
        .map(|games| games.iter().collect())
        .unwrap_or_default()
}

fn string_field<'a>(game: &'a Value, key: &str) -> Option<&'a str> {
    game.get(key).and_then(Value::as_str)
}

/// Parses one side (home/away) of a game entry into a [`StartingGoalie`],
/// matching `_parse_goalie_from_game`'s `{prefix}GoalieName` field
/// naming convention.
fn parse_goalie_from_game(game: &Value, is_home: bool) -> Option<StartingGoalie> {
    let prefix = if is_home { "home" } else { "away" };
    let goalie_name = string_field(game, &format!("{prefix}GoalieName"))?;
    if goalie_name.is_empty() {
        return None;
    }
    let team_name = string_field(game, &format!("{prefix}TeamSlug")).unwrap_or_default();
    let strength_id = game.get(format!("{prefix}NewsStrengthId")).and_then(Value::as_i64);
    // strengthId 2 = confirmed by team/reporter; anything else (including
    // 3 = "likely") is treated as not yet confirmed.
    let confirmed = strength_id == Some(2);

    Some(StartingGoalie { player_name: goalie_name.to_string(), team_name: team_name.to_string(), confirmed })
}

fn parse_starting_goalies(bytes: &[u8]) -> crate::model::MixedScrapePayload {
    let text = String::from_utf8_lossy(bytes);
    let document = Html::parse_document(&text);

    let mut payload = empty_payload(PAGE_KEY);
    let Some(next_data) = extract_next_data(&document) else { return payload };

    for game in games_from_next_data(&next_data) {
        payload.starting_goalies.extend(parse_goalie_from_game(game, false));
        payload.starting_goalies.extend(parse_goalie_from_game(game, true));
    }
    payload
}

/// Downloads and persists the DailyFaceoff starting-goalies page. The
/// page isn't scoped to a season or game, so `enumerate_items` always
/// yields exactly one item regardless of the `season_id` passed in.
pub struct StartingGoaliesAdapter {
    ctx: AdapterContext,
    base_url: String,
}

impl StartingGoaliesAdapter {
    #[must_use]
    pub fn new(config: &SourceConfig, ctx: AdapterContext) -> Self {
        Self { ctx, base_url: config.base_url.clone() }
    }
}

#[async_trait]
impl SourceAdapter for StartingGoaliesAdapter {
    fn source_name(&self) -> &str {
        "dailyfaceoff_starting_goalies"
    }

    fn enumerate_items(&self, _season_id: i64) -> ItemStream {
        Box::pin(futures_util::stream::once(async { TONIGHT_ITEM_KEY.to_string() }))
    }

    async fn fetch_one(&self, _item_key: &str) -> Result<ParsedEntity, ParseError> {
        let url = format!("{}/starting-goalies", self.base_url);
        let bytes: Vec<u8> =
            get_with_retry(&self.ctx.limiter, &self.ctx.policy, "fetch_starting_goalies", self.source_name(), || {
                self.ctx.client.get_bytes(&url)
            })
            .await?;
        if !looks_like_html(&bytes) {
            return Err(ParseError::MissingField { field: "html_sentinel".into(), item_key: url });
        }
        Ok(ParsedEntity::MixedScrape(parse_starting_goalies(&bytes)))
    }

    async fn persist(&self, pool: &SqlitePool, parsed: &ParsedEntity) -> Result<u64, ParseError> {
        persist_mixed_scrape(pool, parsed).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_HTML: &str = r#"<!DOCTYPE html><html><body>
        <script id="__NEXT_DATA__" type="application/json">
        {"props":{"pageProps":{"games":[
            {"homeGoalieName":"Joseph Woll","homeTeamSlug":"toronto-maple-leafs","homeNewsStrengthId":2,
             "awayGoalieName":"Linus Ullmark","awayTeamSlug":"ottawa-senators","awayNewsStrengthId":3}
        ]}}}
        </script>
    </body></html>"#;

    #[test]
    fn parse_starting_goalies_reads_both_sides() {
        let payload = parse_starting_goalies(SAMPLE_HTML.as_bytes());
        assert_eq!(payload.page, "starting_goalies");
        assert_eq!(payload.starting_goalies.len(), 2);
        let home = payload.starting_goalies.iter().find(|g| g.player_name == "Joseph Woll").unwrap();
        assert!(home.confirmed);
        let away = payload.starting_goalies.iter().find(|g| g.player_name == "Linus Ullmark").unwrap();
        assert!(!away.confirmed);
    }

    #[test]
    fn parse_starting_goalies_returns_empty_payload_without_next_data() {
        let payload = parse_starting_goalies(b"<html><body>no data here</body></html>");
        assert!(payload.starting_goalies.is_empty());
    }
}

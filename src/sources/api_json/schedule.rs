//! Schedule adapter. Unlike the other JSON sources, one schedule request
//! enumerates an entire season; there was no surviving Schedule
//! downloader in `examples/original_source` to port (boxscore and
//! play-by-play both take externally-supplied game id lists via
//! `set_game_ids()`, sourced from "the Schedule Downloader" per their own
//! comments), so `fetch_season_game_ids` below fills that gap and is
//! reused by [`super::BoxscoreAdapter`] and [`super::PlayByPlayAdapter`]
//! to discover their own season's game ids.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::StreamExt;
use serde::Deserialize;
use sqlx::SqlitePool;
use tracing::warn;

use crate::config::SourceConfig;
use crate::model::{ParsedEntity, ScheduleEntry};
use crate::sources::adapter::{AdapterContext, ItemStream, SourceAdapter, get_with_retry};
use crate::sources::error::ParseError;

#[derive(Debug, Deserialize)]
struct ScheduleResponse {
    #[serde(default)]
    games: Vec<ScheduleGameDto>,
}

#[derive(Debug, Deserialize)]
struct ScheduleGameDto {
    id: i64,
    #[serde(rename = "homeTeam")]
    home_team: ScheduleTeamDto,
    #[serde(rename = "awayTeam")]
    away_team: ScheduleTeamDto,
}

#[derive(Debug, Deserialize)]
struct ScheduleTeamDto {
    id: i64,
    score: Option<i64>,
}

async fn fetch_season_schedule(
    ctx: &AdapterContext,
    base_url: &str,
    season_id: i64,
) -> Result<Vec<ScheduleEntry>, ParseError> {
    let url = format!("{base_url}/v1/schedule/{season_id}");
    let response: ScheduleResponse = get_with_retry(
        &ctx.limiter,
        &ctx.policy,
        "fetch_season_schedule",
        "nhl_json_schedule",
        || ctx.client.get_json(&url),
    )
    .await?;

    Ok(response
        .games
        .into_iter()
        .map(|g| ScheduleEntry {
            game_id: g.id,
            season_id,
            home_team_id: g.home_team.id,
            away_team_id: g.away_team.id,
            home_score: g.home_team.score,
            away_score: g.away_team.score,
        })
        .collect())
}

/// Fetches a season's schedule and returns just the game ids, for
/// adapters that only need the enumeration and parse games themselves.
///
/// # Errors
/// Returns [`ParseError`] if the request or JSON decode fails.
pub async fn fetch_season_game_ids(
    ctx: &AdapterContext,
    base_url: &str,
    season_id: i64,
) -> Result<Vec<i64>, ParseError> {
    Ok(fetch_season_schedule(ctx, base_url, season_id)
        .await?
        .into_iter()
        .map(|e| e.game_id)
        .collect())
}

/// Downloads the full season schedule in one request, then serves each
/// game as an item key from an in-memory cache (`persist` reads the
/// cached `ScheduleEntry` rather than issuing a second HTTP request).
pub struct ScheduleAdapter {
    ctx: AdapterContext,
    base_url: String,
    cache: Arc<DashMap<i64, ScheduleEntry>>,
}

impl ScheduleAdapter {
    #[must_use]
    pub fn new(config: &SourceConfig, ctx: AdapterContext) -> Self {
        Self { ctx, base_url: config.base_url.clone(), cache: Arc::new(DashMap::new()) }
    }
}

#[async_trait]
impl SourceAdapter for ScheduleAdapter {
    fn source_name(&self) -> &str {
        "nhl_json_schedule"
    }

    fn enumerate_items(&self, season_id: i64) -> ItemStream {
        let ctx = self.ctx.clone();
        let base_url = self.base_url.clone();
        let cache = self.cache.clone();
        Box::pin(
            futures_util::stream::once(async move {
                match fetch_season_schedule(&ctx, &base_url, season_id).await {
                    Ok(entries) => {
                        let ids: Vec<i64> = entries.iter().map(|e| e.game_id).collect();
                        for entry in entries {
                            cache.insert(entry.game_id, entry);
                        }
                        ids
                    }
                    Err(error) => {
                        warn!(season_id, %error, "failed to enumerate season schedule");
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
        let entry = self.cache.get(&game_id).ok_or_else(|| ParseError::MissingField {
            field: "schedule_entry".into(),
            item_key: item_key.into(),
        })?;
        Ok(ParsedEntity::Schedule(entry.clone()))
    }

    async fn persist(&self, pool: &SqlitePool, parsed: &ParsedEntity) -> Result<u64, ParseError> {
        let ParsedEntity::Schedule(entry) = parsed else {
            return Err(ParseError::MissingField {
                field: "schedule_entry".into(),
                item_key: "<persist>".into(),
            });
        };
        let payload = serde_json::to_string(entry)?;
        let result = sqlx::query(
            "INSERT INTO parsed_schedule (game_id, season_id, home_score, away_score, payload_json)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT (game_id, season_id) DO UPDATE SET
                home_score = excluded.home_score,
                away_score = excluded.away_score,
                payload_json = excluded.payload_json,
                updated_at = datetime('now')",
        )
        .bind(entry.game_id)
        .bind(entry.season_id)
        .bind(entry.home_score)
        .bind(entry.away_score)
        .bind(payload)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ctx() -> AdapterContext {
        let config = SourceConfig::new("nhl_json_schedule", "http://unused.example");
        AdapterContext::from_config(&config).expect("ctx")
    }

    #[tokio::test]
    async fn fetch_season_game_ids_parses_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/schedule/20242025"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "games": [
                    {"id": 2024020001, "homeTeam": {"id": 10, "score": 3}, "awayTeam": {"id": 20, "score": 2}},
                    {"id": 2024020002, "homeTeam": {"id": 11, "score": null}, "awayTeam": {"id": 21, "score": null}}
                ]
            })))
            .mount(&server)
            .await;

        let entries = fetch_season_schedule(&ctx(), &server.uri(), 2024_2025)
            .await
            .expect("schedule");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].game_id, 2024020001);
        assert_eq!(entries[0].home_score, Some(3));
        assert_eq!(entries[1].home_score, None);
    }

    #[tokio::test]
    async fn enumerate_items_populates_cache_for_fetch_one() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/schedule/20242025"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "games": [
                    {"id": 2024020001, "homeTeam": {"id": 10, "score": 3}, "awayTeam": {"id": 20, "score": 2}}
                ]
            })))
            .mount(&server)
            .await;

        let config = SourceConfig::new("nhl_json_schedule", server.uri());
        let adapter = ScheduleAdapter::new(&config, ctx());
        let keys: Vec<String> = adapter.enumerate_items(2024_2025).collect().await;
        assert_eq!(keys, vec!["2024020001".to_string()]);

        let parsed = adapter.fetch_one("2024020001").await.expect("fetch_one");
        match parsed {
            ParsedEntity::Schedule(entry) => assert_eq!(entry.home_score, Some(3)),
            other => panic!("expected Schedule, got {other:?}"),
        }
    }
}

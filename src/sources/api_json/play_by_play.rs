//! `GET {base}/v1/gamecenter/{game_id}/play-by-play` — ported from
//! `examples/original_source`'s `PlayByPlayDownloader`. Only the fields
//! the cross-source goal/shot rules need (team, period type, event type,
//! shot-on-goal flag) are carried into [`crate::model::PlayByPlayEvent`];
//! the original's much richer per-player event detail is dropped since
//! nothing downstream consumes it.

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use sqlx::SqlitePool;
use tracing::warn;

use crate::config::SourceConfig;
use crate::model::{ParsedEntity, PlayByPlay, PlayByPlayEvent, season_id_for_game};
use crate::sources::adapter::{AdapterContext, ItemStream, SourceAdapter, get_with_retry};
use crate::sources::error::ParseError;

use super::fetch_season_game_ids;

const SHOT_ON_GOAL_EVENT: &str = "shot-on-goal";

#[derive(Debug, Deserialize)]
struct PlayByPlayResponse {
    #[serde(rename = "homeTeam")]
    home_team: TeamDto,
    #[serde(rename = "awayTeam")]
    away_team: TeamDto,
    #[serde(default)]
    plays: Vec<PlayDto>,
}

#[derive(Debug, Deserialize)]
struct TeamDto {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct PlayDto {
    #[serde(rename = "typeDescKey", default)]
    type_desc_key: String,
    #[serde(rename = "periodDescriptor", default)]
    period_descriptor: Option<PeriodDescriptorDto>,
    #[serde(default)]
    details: Option<PlayDetailsDto>,
}

#[derive(Debug, Deserialize)]
struct PeriodDescriptorDto {
    #[serde(rename = "periodType", default)]
    period_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlayDetailsDto {
    #[serde(rename = "eventOwnerTeamId")]
    event_owner_team_id: Option<i64>,
}

fn parse_event(play: PlayDto) -> PlayByPlayEvent {
    let team_id = play.details.as_ref().and_then(|d| d.event_owner_team_id).unwrap_or(0);
    let period_type = play
        .period_descriptor
        .and_then(|p| p.period_type)
        .unwrap_or_else(|| "REG".to_string());
    PlayByPlayEvent {
        is_shot_on_goal: play.type_desc_key == SHOT_ON_GOAL_EVENT,
        event_type: play.type_desc_key,
        team_id,
        period_type,
    }
}

fn parse_play_by_play(game_id: i64, response: PlayByPlayResponse) -> PlayByPlay {
    PlayByPlay {
        game_id,
        season_id: season_id_for_game(game_id),
        home_team_id: response.home_team.id,
        away_team_id: response.away_team.id,
        events: response.plays.into_iter().map(parse_event).collect(),
    }
}

/// Downloads and persists JSON-API play-by-play feeds for a season's games.
pub struct PlayByPlayAdapter {
    ctx: AdapterContext,
    base_url: String,
}

impl PlayByPlayAdapter {
    #[must_use]
    pub fn new(config: &SourceConfig, ctx: AdapterContext) -> Self {
        Self { ctx, base_url: config.base_url.clone() }
    }
}

#[async_trait]
impl SourceAdapter for PlayByPlayAdapter {
    fn source_name(&self) -> &str {
        "nhl_json_play_by_play"
    }

    fn enumerate_items(&self, season_id: i64) -> ItemStream {
        let ctx = self.ctx.clone();
        let base_url = self.base_url.clone();
        Box::pin(
            futures_util::stream::once(async move {
                match fetch_season_game_ids(&ctx, &base_url, season_id).await {
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
        let url = format!("{}/v1/gamecenter/{game_id}/play-by-play", self.base_url);
        let response: PlayByPlayResponse = get_with_retry(
            &self.ctx.limiter,
            &self.ctx.policy,
            "fetch_play_by_play",
            self.source_name(),
            || self.ctx.client.get_json(&url),
        )
        .await?;
        Ok(ParsedEntity::PlayByPlay(parse_play_by_play(game_id, response)))
    }

    async fn persist(&self, pool: &SqlitePool, parsed: &ParsedEntity) -> Result<u64, ParseError> {
        let ParsedEntity::PlayByPlay(pbp) = parsed else {
            return Err(ParseError::MissingField {
                field: "play_by_play".into(),
                item_key: "<persist>".into(),
            });
        };
        let payload = serde_json::to_string(pbp)?;
        let result = sqlx::query(
            "INSERT INTO parsed_play_by_play (game_id, season_id, home_team_id, away_team_id, payload_json)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT (game_id, season_id) DO UPDATE SET
                home_team_id = excluded.home_team_id,
                away_team_id = excluded.away_team_id,
                payload_json = excluded.payload_json,
                updated_at = datetime('now')",
        )
        .bind(pbp.game_id)
        .bind(pbp.season_id)
        .bind(pbp.home_team_id)
        .bind(pbp.away_team_id)
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
        let config = SourceConfig::new("nhl_json_play_by_play", "http://unused.example");
        AdapterContext::from_config(&config).expect("ctx")
    }

    #[tokio::test]
    async fn fetch_one_counts_goals_excluding_shootout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/gamecenter/2024020500/play-by-play"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "homeTeam": {"id": 10},
                "awayTeam": {"id": 20},
                "plays": [
                    {"typeDescKey": "goal", "periodDescriptor": {"periodType": "REG"}, "details": {"eventOwnerTeamId": 10}},
                    {"typeDescKey": "goal", "periodDescriptor": {"periodType": "SO"}, "details": {"eventOwnerTeamId": 10}},
                    {"typeDescKey": "shot-on-goal", "periodDescriptor": {"periodType": "REG"}, "details": {"eventOwnerTeamId": 20}}
                ]
            })))
            .mount(&server)
            .await;

        let config = SourceConfig::new("nhl_json_play_by_play", server.uri());
        let adapter = PlayByPlayAdapter::new(&config, ctx());
        let parsed = adapter.fetch_one("2024020500").await.expect("fetch_one");
        match parsed {
            ParsedEntity::PlayByPlay(pbp) => {
                assert_eq!(pbp.goal_count(10), 1);
                assert_eq!(pbp.shot_count(20), 1);
            }
            other => panic!("expected PlayByPlay, got {other:?}"),
        }
    }
}

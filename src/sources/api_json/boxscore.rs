//! `GET {base}/v1/gamecenter/{game_id}/boxscore` — ported from
//! `examples/original_source`'s `BoxscoreDownloader`, generalized onto
//! `SourceAdapter`. Season enumeration is delegated to
//! [`super::fetch_season_game_ids`] since the original took its game ids
//! from an external `set_game_ids()` call.

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use sqlx::SqlitePool;
use tracing::warn;

use crate::config::SourceConfig;
use crate::model::{Boxscore, GoalieStats, SkaterStats, TeamTotals, season_id_for_game};
use crate::sources::adapter::{AdapterContext, ItemStream, SourceAdapter, get_with_retry};
use crate::sources::error::ParseError;
use crate::sources::util::{safe_int, safe_float, parse_time_mmss};

use super::fetch_season_game_ids;

#[derive(Debug, Deserialize)]
struct BoxscoreResponse {
    #[serde(rename = "homeTeam")]
    home_team: TeamDto,
    #[serde(rename = "awayTeam")]
    away_team: TeamDto,
    #[serde(rename = "playerByGameStats", default)]
    player_by_game_stats: Option<PlayerByGameStatsDto>,
}

#[derive(Debug, Deserialize)]
struct TeamDto {
    id: i64,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    sog: i64,
}

#[derive(Debug, Deserialize)]
struct PlayerByGameStatsDto {
    #[serde(rename = "homeTeam", default)]
    home_team: TeamStatsDto,
    #[serde(rename = "awayTeam", default)]
    away_team: TeamStatsDto,
}

#[derive(Debug, Deserialize, Default)]
struct TeamStatsDto {
    #[serde(default)]
    forwards: Vec<SkaterDto>,
    #[serde(default)]
    defense: Vec<SkaterDto>,
    #[serde(default)]
    goalies: Vec<GoalieDto>,
}

#[derive(Debug, Deserialize)]
struct NameDto {
    #[serde(default)]
    default: String,
}

#[derive(Debug, Deserialize)]
struct SkaterDto {
    #[serde(rename = "playerId")]
    player_id: i64,
    #[serde(default)]
    name: Option<NameDto>,
    #[serde(default)]
    goals: i64,
    #[serde(default)]
    assists: i64,
    #[serde(default)]
    points: i64,
    #[serde(rename = "powerPlayGoals", default)]
    power_play_goals: i64,
    #[serde(rename = "shorthandedGoals", default)]
    shorthanded_goals: i64,
    #[serde(rename = "faceoffWinningPctg", default)]
    faceoff_winning_pctg: Option<f64>,
    #[serde(default)]
    toi: Option<String>,
    #[serde(default)]
    shifts: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct GoalieDto {
    #[serde(rename = "playerId")]
    player_id: i64,
    #[serde(default)]
    name: Option<NameDto>,
    #[serde(rename = "saveShotsAgainst", default)]
    save_shots_against: Option<String>,
    #[serde(rename = "goalsAgainst", default)]
    goals_against: i64,
    #[serde(rename = "savePctg", default)]
    save_pctg: Option<f64>,
}

fn parse_save_shots(raw: Option<&str>) -> (i64, i64) {
    let Some(raw) = raw else { return (0, 0) };
    match raw.split_once('/') {
        Some((saves, shots)) => (safe_int(saves).unwrap_or(0), safe_int(shots).unwrap_or(0)),
        None => (0, 0),
    }
}

fn parse_skater(dto: SkaterDto, team_id: i64) -> SkaterStats {
    SkaterStats {
        player_id: dto.player_id,
        name: dto.name.map(|n| n.default).unwrap_or_default(),
        team_id,
        goals: dto.goals,
        assists: dto.assists,
        points: dto.points,
        power_play_goals: dto.power_play_goals,
        shorthanded_goals: dto.shorthanded_goals,
        faceoff_pct: dto.faceoff_winning_pctg,
        toi_seconds: dto.toi.as_deref().and_then(parse_time_mmss),
        toi: dto.toi,
        shifts: dto.shifts,
    }
}

fn parse_goalie(dto: GoalieDto, team_id: i64) -> GoalieStats {
    let (saves, shots_against_from_string) = parse_save_shots(dto.save_shots_against.as_deref());
    GoalieStats {
        player_id: dto.player_id,
        name: dto.name.map(|n| n.default).unwrap_or_default(),
        team_id,
        saves,
        goals_against: dto.goals_against,
        shots_against: shots_against_from_string,
        save_pct: dto.save_pctg,
    }
}

fn parse_boxscore(game_id: i64, response: BoxscoreResponse) -> Boxscore {
    let home_team = TeamTotals {
        team_id: response.home_team.id,
        score: response.home_team.score,
        shots_on_goal: response.home_team.sog,
    };
    let away_team = TeamTotals {
        team_id: response.away_team.id,
        score: response.away_team.score,
        shots_on_goal: response.away_team.sog,
    };

    let stats = response.player_by_game_stats.unwrap_or_else(|| PlayerByGameStatsDto {
        home_team: TeamStatsDto::default(),
        away_team: TeamStatsDto::default(),
    });

    let mut skaters = Vec::new();
    for dto in stats.home_team.forwards.into_iter().chain(stats.home_team.defense) {
        skaters.push(parse_skater(dto, home_team.team_id));
    }
    for dto in stats.away_team.forwards.into_iter().chain(stats.away_team.defense) {
        skaters.push(parse_skater(dto, away_team.team_id));
    }

    let mut goalies = Vec::new();
    for dto in stats.home_team.goalies {
        goalies.push(parse_goalie(dto, home_team.team_id));
    }
    for dto in stats.away_team.goalies {
        goalies.push(parse_goalie(dto, away_team.team_id));
    }

    Boxscore {
        game_id,
        season_id: season_id_for_game(game_id),
        home_team,
        away_team,
        skaters,
        goalies,
    }
}

/// Downloads and persists JSON-API boxscores for a season's games.
pub struct BoxscoreAdapter {
    ctx: AdapterContext,
    base_url: String,
}

impl BoxscoreAdapter {
    #[must_use]
    pub fn new(config: &SourceConfig, ctx: AdapterContext) -> Self {
        Self { ctx, base_url: config.base_url.clone() }
    }
}

#[async_trait]
impl SourceAdapter for BoxscoreAdapter {
    fn source_name(&self) -> &str {
        "nhl_json_boxscore"
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

    async fn fetch_one(&self, item_key: &str) -> Result<crate::model::ParsedEntity, ParseError> {
        let game_id: i64 = item_key
            .parse()
            .map_err(|_| ParseError::MissingField { field: "game_id".into(), item_key: item_key.into() })?;
        let url = format!("{}/v1/gamecenter/{game_id}/boxscore", self.base_url);
        let response: BoxscoreResponse = get_with_retry(
            &self.ctx.limiter,
            &self.ctx.policy,
            "fetch_boxscore",
            self.source_name(),
            || self.ctx.client.get_json(&url),
        )
        .await?;
        Ok(crate::model::ParsedEntity::Boxscore(parse_boxscore(game_id, response)))
    }

    async fn persist(
        &self,
        pool: &SqlitePool,
        parsed: &crate::model::ParsedEntity,
    ) -> Result<u64, ParseError> {
        let crate::model::ParsedEntity::Boxscore(box_) = parsed else {
            return Err(ParseError::MissingField {
                field: "boxscore".into(),
                item_key: "<persist>".into(),
            });
        };
        let payload = serde_json::to_string(box_)?;
        let result = sqlx::query(
            "INSERT INTO parsed_boxscore
                (game_id, season_id, home_score, away_score, home_shots, away_shots, payload_json)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (game_id, season_id) DO UPDATE SET
                home_score = excluded.home_score,
                away_score = excluded.away_score,
                home_shots = excluded.home_shots,
                away_shots = excluded.away_shots,
                payload_json = excluded.payload_json,
                updated_at = datetime('now')",
        )
        .bind(box_.game_id)
        .bind(box_.season_id)
        .bind(box_.home_team.score)
        .bind(box_.away_team.score)
        .bind(box_.home_team.shots_on_goal)
        .bind(box_.away_team.shots_on_goal)
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
        let config = SourceConfig::new("nhl_json_boxscore", "http://unused.example");
        AdapterContext::from_config(&config).expect("ctx")
    }

    #[tokio::test]
    async fn fetch_one_parses_skaters_and_goalies() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/gamecenter/2024020500/boxscore"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "homeTeam": {"id": 10, "score": 4, "sog": 30},
                "awayTeam": {"id": 20, "score": 2, "sog": 25},
                "playerByGameStats": {
                    "homeTeam": {
                        "forwards": [{
                            "playerId": 1, "name": {"default": "A. Player"},
                            "goals": 2, "assists": 1, "points": 3,
                            "powerPlayGoals": 1, "shorthandedGoals": 0,
                            "faceoffWinningPctg": 55.5, "toi": "18:30", "shifts": 22
                        }],
                        "defense": [],
                        "goalies": [{
                            "playerId": 2, "name": {"default": "G. Tender"},
                            "saveShotsAgainst": "23/25", "goalsAgainst": 2, "savePctg": 0.92
                        }]
                    },
                    "awayTeam": {"forwards": [], "defense": [], "goalies": []}
                }
            })))
            .mount(&server)
            .await;

        let config = SourceConfig::new("nhl_json_boxscore", server.uri());
        let adapter = BoxscoreAdapter::new(&config, ctx());
        let parsed = adapter.fetch_one("2024020500").await.expect("fetch_one");
        match parsed {
            crate::model::ParsedEntity::Boxscore(b) => {
                assert_eq!(b.season_id, 2024_2025);
                assert_eq!(b.skaters.len(), 1);
                assert_eq!(b.skaters[0].toi_seconds, Some(18 * 60 + 30));
                assert_eq!(b.goalies[0].saves, 23);
                assert_eq!(b.goalies[0].shots_against, 25);
            }
            other => panic!("expected Boxscore, got {other:?}"),
        }
    }
}

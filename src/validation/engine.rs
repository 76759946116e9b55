//! Reconciliation engine (C11): loads a game's parsed entities from
//! every source, evaluates active rules, and persists results and
//! discrepancies transactionally, per spec §4.10's six-step contract.

use std::collections::HashMap;

use sqlx::{Row, SqlitePool};
use tracing::{info, instrument, warn};

use crate::model::{Boxscore, PlayByPlay, ScheduleEntry, ShiftChart};

use super::error::ValidationError;
use super::{cross_source, rules, RuleResult};

struct GameEntities {
    boxscore: Option<Boxscore>,
    play_by_play: Option<PlayByPlay>,
    shift_chart: Option<ShiftChart>,
    schedule: Option<ScheduleEntry>,
}

async fn load_json<T: serde::de::DeserializeOwned>(
    pool: &SqlitePool,
    query: &str,
    game_id: i64,
    season_id: i64,
) -> Result<Option<T>, ValidationError> {
    let row = sqlx::query(query).bind(game_id).bind(season_id).fetch_optional(pool).await?;
    let Some(row) = row else { return Ok(None) };
    let payload: String = row.try_get("payload_json")?;
    let parsed = serde_json::from_str(&payload).map_err(|source| ValidationError::Decode { game_id, source })?;
    Ok(Some(parsed))
}

async fn load_entities(pool: &SqlitePool, game_id: i64, season_id: i64) -> Result<GameEntities, ValidationError> {
    let boxscore = load_json(
        pool,
        "SELECT payload_json FROM parsed_boxscore WHERE game_id = ? AND season_id = ?",
        game_id,
        season_id,
    )
    .await?;
    let play_by_play = load_json(
        pool,
        "SELECT payload_json FROM parsed_play_by_play WHERE game_id = ? AND season_id = ?",
        game_id,
        season_id,
    )
    .await?;
    let shift_chart = load_json(
        pool,
        "SELECT payload_json FROM parsed_shift_chart WHERE game_id = ? AND season_id = ?",
        game_id,
        season_id,
    )
    .await?;
    let schedule = load_json(
        pool,
        "SELECT payload_json FROM parsed_schedule WHERE game_id = ? AND season_id = ?",
        game_id,
        season_id,
    )
    .await?;
    Ok(GameEntities { boxscore, play_by_play, shift_chart, schedule })
}

/// Maps each rule name to its `(rule_id, is_active)` row, so `run` can
/// resolve the FK to bind and drop results for rules an operator has
/// disabled.
async fn load_active_rules(pool: &SqlitePool) -> Result<HashMap<String, (i64, bool)>, ValidationError> {
    let rows: Vec<(i64, String, bool)> =
        sqlx::query_as("SELECT rule_id, name, is_active FROM validation_rule").fetch_all(pool).await?;
    Ok(rows.into_iter().map(|(rule_id, name, is_active)| (name, (rule_id, is_active))).collect())
}

/// Evaluates every internal and cross-source rule for one game's loaded
/// entities, in the spec's stable `(category, name)` order.
fn evaluate_game(game_id: i64, entities: &GameEntities) -> Vec<RuleResult> {
    let mut results = Vec::new();

    if let Some(boxscore) = &entities.boxscore {
        results.extend(rules::points_equal_goals_plus_assists(game_id, &boxscore.skaters));
        results.extend(rules::special_teams_bounded(game_id, &boxscore.skaters));
        results.extend(rules::faceoff_pct_range(game_id, &boxscore.skaters));
        results.extend(rules::toi_format(game_id, &boxscore.skaters));
        results.extend(rules::goalie_save_pct_range(game_id, &boxscore.goalies));
        results.extend(rules::goalie_shot_arithmetic(game_id, &boxscore.goalies));
        results.push(rules::team_goals_equal_skater_sum(game_id, &boxscore.home_team, &boxscore.skaters));
        results.push(rules::team_goals_equal_skater_sum(game_id, &boxscore.away_team, &boxscore.skaters));
        results.push(rules::shots_at_least_goals(game_id, &boxscore.home_team));
        results.push(rules::shots_at_least_goals(game_id, &boxscore.away_team));
    }

    results.push(cross_source::cross_source_pbp_boxscore_goals_home(
        game_id,
        entities.play_by_play.as_ref(),
        entities.boxscore.as_ref(),
    ));
    results.push(cross_source::cross_source_pbp_boxscore_goals_away(
        game_id,
        entities.play_by_play.as_ref(),
        entities.boxscore.as_ref(),
    ));
    results.push(cross_source::cross_source_pbp_boxscore_shots_home(
        game_id,
        entities.play_by_play.as_ref(),
        entities.boxscore.as_ref(),
    ));
    results.push(cross_source::cross_source_pbp_boxscore_shots_away(
        game_id,
        entities.play_by_play.as_ref(),
        entities.boxscore.as_ref(),
    ));
    results.extend(cross_source::cross_source_final_score(game_id, entities.schedule.as_ref(), entities.boxscore.as_ref()));

    if let Some(boxscore) = &entities.boxscore {
        for skater in &boxscore.skaters {
            results.push(cross_source::cross_source_toi_player(
                game_id,
                skater.player_id,
                entities.shift_chart.as_ref(),
                Some(skater),
            ));
            results.push(cross_source::cross_source_shift_count_player(
                game_id,
                skater.player_id,
                entities.shift_chart.as_ref(),
                Some(skater),
            ));
        }
    }

    results.sort_by(|a, b| a.category.cmp(b.category).then_with(|| a.rule_name.cmp(b.rule_name)));
    results
}

/// Drives validation for a season, or a single game within it.
pub struct ReconciliationEngine {
    pool: SqlitePool,
}

impl ReconciliationEngine {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Runs reconciliation for `season_id` (or just `game_id`, when
    /// given), returning the new `run_id`. Implements spec §4.10's
    /// six-step contract: start run, load entities per game, evaluate
    /// active rules, persist results (incrementing run counters),
    /// upsert discrepancies for failed cross-source results, and
    /// terminate the run. Per-game persistence is transactional.
    ///
    /// # Errors
    /// Returns [`ValidationError`] if any database operation fails.
    #[instrument(skip(self))]
    pub async fn run(&self, season_id: i64, game_id: Option<i64>) -> Result<i64, ValidationError> {
        let run_id: i64 = sqlx::query_scalar(
            "INSERT INTO validation_run (season_id, status) VALUES (?, 'running') RETURNING run_id",
        )
        .bind(season_id)
        .fetch_one(&self.pool)
        .await?;

        let game_ids = match game_id {
            Some(id) => vec![id],
            None => self.games_in_scope(season_id).await?,
        };
        let active_rules = load_active_rules(&self.pool).await?;

        let mut rules_checked = 0i64;
        let mut total_passed = 0i64;
        let mut total_failed = 0i64;
        let mut total_warnings = 0i64;

        for gid in game_ids {
            let entities = load_entities(&self.pool, gid, season_id).await?;
            let results = evaluate_game(gid, &entities);

            let mut tx = self.pool.begin().await?;
            for result in &results {
                let Some(&(rule_id, is_active)) = active_rules.get(result.rule_name) else {
                    warn!(rule_name = result.rule_name, "no validation_rule row for this rule, skipping");
                    continue;
                };
                if !is_active {
                    continue;
                }

                rules_checked += 1;
                if result.passed {
                    total_passed += 1;
                } else {
                    total_failed += 1;
                }
                if matches!(result.severity, super::Severity::Warning) {
                    total_warnings += 1;
                }

                sqlx::query(
                    "INSERT INTO validation_result
                        (run_id, rule_id, rule_name, game_id, passed, severity, message, details_json)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(run_id)
                .bind(rule_id)
                .bind(result.rule_name)
                .bind(gid)
                .bind(result.passed)
                .bind(result.severity.as_str())
                .bind(&result.message)
                .bind(result.details.to_string())
                .execute(&mut *tx)
                .await?;

                if !result.passed {
                    if let Some(ctx) = &result.cross_source {
                        upsert_discrepancy(&mut tx, result.rule_name, ctx, &result.entity_id).await?;
                    }
                }
            }
            tx.commit().await?;
        }

        sqlx::query(
            "UPDATE validation_run SET status = 'completed', completed_at = datetime('now'),
                rules_checked = ?, total_passed = ?, total_failed = ?, total_warnings = ?
             WHERE run_id = ?",
        )
        .bind(rules_checked)
        .bind(total_passed)
        .bind(total_failed)
        .bind(total_warnings)
        .bind(run_id)
        .execute(&self.pool)
        .await?;

        info!(run_id, season_id, rules_checked, total_passed, total_failed, "reconciliation run completed");
        Ok(run_id)
    }

    /// Every game with at least one parsed entity on record for the
    /// season, used when a single `game_id` isn't given.
    async fn games_in_scope(&self, season_id: i64) -> Result<Vec<i64>, ValidationError> {
        let rows: Vec<i64> = sqlx::query_scalar(
            "SELECT DISTINCT game_id FROM parsed_boxscore WHERE season_id = ?
             UNION
             SELECT DISTINCT game_id FROM parsed_schedule WHERE season_id = ?",
        )
        .bind(season_id)
        .bind(season_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

async fn upsert_discrepancy(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    rule_name: &str,
    ctx: &super::CrossSourceContext,
    entity_id: &str,
) -> Result<(), ValidationError> {
    let source_values_json = ctx.source_values.to_string();
    let result = sqlx::query(
        "INSERT INTO discrepancy (rule_name, entity_type, entity_id, field_name, source_values_json)
         VALUES (?, ?, ?, ?, ?)
         ON CONFLICT (rule_name, entity_type, entity_id, field_name) DO UPDATE SET
            source_values_json = excluded.source_values_json,
            resolution_status = 'open'
         WHERE discrepancy.resolution_status != 'resolved'
            OR discrepancy.source_values_json != excluded.source_values_json",
    )
    .bind(rule_name)
    .bind(ctx.entity_type)
    .bind(entity_id)
    .bind(ctx.field_name)
    .bind(source_values_json)
    .execute(&mut **tx)
    .await?;

    if result.rows_affected() == 0 {
        warn!(rule_name, entity_id, "discrepancy left resolved: source values unchanged");
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::model::{Boxscore, GoalieStats, SkaterStats, TeamTotals};

    async fn pool() -> SqlitePool {
        Database::new_in_memory().await.expect("db").pool().clone()
    }

    async fn insert_boxscore(pool: &SqlitePool, game_id: i64, season_id: i64, boxscore: &Boxscore) {
        sqlx::query(
            "INSERT INTO parsed_boxscore (game_id, season_id, home_score, away_score, home_shots, away_shots, payload_json)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(game_id)
        .bind(season_id)
        .bind(boxscore.home_team.score)
        .bind(boxscore.away_team.score)
        .bind(boxscore.home_team.shots_on_goal)
        .bind(boxscore.away_team.shots_on_goal)
        .bind(serde_json::to_string(boxscore).unwrap())
        .execute(pool)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn run_persists_results_and_updates_run_counters() {
        let pool = pool().await;
        let boxscore = Boxscore {
            game_id: 1,
            season_id: 2024_2025,
            home_team: TeamTotals { team_id: 1, score: 1, shots_on_goal: 30 },
            away_team: TeamTotals { team_id: 2, score: 0, shots_on_goal: 20 },
            skaters: vec![SkaterStats {
                player_id: 10,
                name: "A".to_string(),
                team_id: 1,
                goals: 1,
                assists: 0,
                points: 1,
                power_play_goals: 0,
                shorthanded_goals: 0,
                faceoff_pct: None,
                toi: None,
                toi_seconds: None,
                shifts: None,
            }],
            goalies: Vec::<GoalieStats>::new(),
        };
        insert_boxscore(&pool, 1, 2024_2025, &boxscore).await;

        let engine = ReconciliationEngine::new(pool.clone());
        let run_id = engine.run(2024_2025, Some(1)).await.unwrap();

        let result_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM validation_result WHERE run_id = ?")
            .bind(run_id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert!(result_count > 0);

        let status: String = sqlx::query_scalar("SELECT status FROM validation_run WHERE run_id = ?")
            .bind(run_id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(status, "completed");
    }

    #[tokio::test]
    async fn run_opens_discrepancy_for_failed_cross_source_rule() {
        let pool = pool().await;
        let boxscore = Boxscore {
            game_id: 2,
            season_id: 2024_2025,
            home_team: TeamTotals { team_id: 1, score: 5, shots_on_goal: 30 },
            away_team: TeamTotals { team_id: 2, score: 0, shots_on_goal: 20 },
            skaters: vec![],
            goalies: Vec::<GoalieStats>::new(),
        };
        insert_boxscore(&pool, 2, 2024_2025, &boxscore).await;
        sqlx::query(
            "INSERT INTO parsed_schedule (game_id, season_id, home_score, away_score, payload_json)
             VALUES (2, 2024_2025, 1, 0, '{}')",
        )
        .execute(&pool)
        .await
        .unwrap();

        let engine = ReconciliationEngine::new(pool.clone());
        engine.run(2024_2025, Some(2)).await.unwrap();

        let discrepancy_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM discrepancy WHERE rule_name = 'cross_source_final_score'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(discrepancy_count, 1);
    }
}

//! Internal rules (C10): each a pure function over one parsed entity's
//! stat lines, named and contracted exactly per spec §4.9.

use std::sync::LazyLock;

use regex::Regex;

use crate::model::{GoalieStats, SkaterStats, TeamTotals};

use super::{RuleResult, Severity};

static TOI_FORMAT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{1,2}:\d{2}$").expect("valid regex"));

/// Player points equal goals plus assists. Severity error.
#[must_use]
pub fn points_equal_goals_plus_assists(game_id: i64, skaters: &[SkaterStats]) -> Vec<RuleResult> {
    if skaters.is_empty() {
        return vec![RuleResult::skipped(
            "points_equal_goals_plus_assists",
            "skater",
            Severity::Error,
            game_id.to_string(),
        )];
    }
    skaters
        .iter()
        .map(|skater| {
            let expected = skater.goals + skater.assists;
            let passed = skater.points == expected;
            RuleResult {
                rule_name: "points_equal_goals_plus_assists",
                category: "skater",
                passed,
                severity: Severity::Error,
                message: if passed {
                    "points equal goals plus assists".to_string()
                } else {
                    format!("points {} != goals {} + assists {}", skater.points, skater.goals, skater.assists)
                },
                details: serde_json::json!({"points": skater.points, "goals": skater.goals, "assists": skater.assists}),
                entity_id: skater.player_id.to_string(),
                cross_source: None,
            }
        })
        .collect()
}

/// Special-teams goals bounded by total goals. Severity error.
#[must_use]
pub fn special_teams_bounded(game_id: i64, skaters: &[SkaterStats]) -> Vec<RuleResult> {
    if skaters.is_empty() {
        return vec![RuleResult::skipped("special_teams_bounded", "skater", Severity::Error, game_id.to_string())];
    }
    skaters
        .iter()
        .map(|skater| {
            let special_teams = skater.power_play_goals + skater.shorthanded_goals;
            let passed = special_teams <= skater.goals;
            RuleResult {
                rule_name: "special_teams_bounded",
                category: "skater",
                passed,
                severity: Severity::Error,
                message: if passed {
                    "special-teams goals bounded by total goals".to_string()
                } else {
                    format!("power_play_goals + shorthanded_goals {special_teams} exceeds goals {}", skater.goals)
                },
                details: serde_json::json!({
                    "power_play_goals": skater.power_play_goals,
                    "shorthanded_goals": skater.shorthanded_goals,
                    "goals": skater.goals,
                }),
                entity_id: skater.player_id.to_string(),
                cross_source: None,
            }
        })
        .collect()
}

/// Faceoff percentage within `[0, 100]`. Severity warning. Skaters with
/// no recorded faceoff percentage are not applicable and are skipped.
#[must_use]
pub fn faceoff_pct_range(game_id: i64, skaters: &[SkaterStats]) -> Vec<RuleResult> {
    let applicable: Vec<&SkaterStats> = skaters.iter().filter(|s| s.faceoff_pct.is_some()).collect();
    if applicable.is_empty() {
        return vec![RuleResult::skipped("faceoff_pct_range", "skater", Severity::Warning, game_id.to_string())];
    }
    applicable
        .into_iter()
        .map(|skater| {
            let pct = skater.faceoff_pct.unwrap_or_default();
            let passed = (0.0..=100.0).contains(&pct);
            RuleResult {
                rule_name: "faceoff_pct_range",
                category: "skater",
                passed,
                severity: Severity::Warning,
                message: if passed {
                    "faceoff percentage within range".to_string()
                } else {
                    format!("faceoff_pct {pct} outside [0, 100]")
                },
                details: serde_json::json!({"faceoff_pct": pct}),
                entity_id: skater.player_id.to_string(),
                cross_source: None,
            }
        })
        .collect()
}

/// Time-on-ice string matches `MM:SS`/`M:SS`. Severity info. Skaters with
/// no recorded `toi` are not applicable and are skipped.
#[must_use]
pub fn toi_format(game_id: i64, skaters: &[SkaterStats]) -> Vec<RuleResult> {
    let applicable: Vec<&SkaterStats> = skaters.iter().filter(|s| s.toi.is_some()).collect();
    if applicable.is_empty() {
        return vec![RuleResult::skipped("toi_format", "skater", Severity::Info, game_id.to_string())];
    }
    applicable
        .into_iter()
        .map(|skater| {
            let toi = skater.toi.as_deref().unwrap_or_default();
            let passed = TOI_FORMAT_PATTERN.is_match(toi);
            RuleResult {
                rule_name: "toi_format",
                category: "skater",
                passed,
                severity: Severity::Info,
                message: if passed {
                    "toi matches MM:SS".to_string()
                } else {
                    format!("toi '{toi}' does not match MM:SS")
                },
                details: serde_json::json!({"toi": toi}),
                entity_id: skater.player_id.to_string(),
                cross_source: None,
            }
        })
        .collect()
}

/// Goalie save percentage within `[0, 1]`. Severity warning.
#[must_use]
pub fn goalie_save_pct_range(game_id: i64, goalies: &[GoalieStats]) -> Vec<RuleResult> {
    let applicable: Vec<&GoalieStats> = goalies.iter().filter(|g| g.save_pct.is_some()).collect();
    if applicable.is_empty() {
        return vec![RuleResult::skipped("goalie_save_pct_range", "goalie", Severity::Warning, game_id.to_string())];
    }
    applicable
        .into_iter()
        .map(|goalie| {
            let pct = goalie.save_pct.unwrap_or_default();
            let passed = (0.0..=1.0).contains(&pct);
            RuleResult {
                rule_name: "goalie_save_pct_range",
                category: "goalie",
                passed,
                severity: Severity::Warning,
                message: if passed {
                    "save percentage within range".to_string()
                } else {
                    format!("save_pct {pct} outside [0, 1]")
                },
                details: serde_json::json!({"save_pct": pct}),
                entity_id: goalie.player_id.to_string(),
                cross_source: None,
            }
        })
        .collect()
}

/// Goalie shot arithmetic: saves + goals_against = shots_against.
/// Severity error.
#[must_use]
pub fn goalie_shot_arithmetic(game_id: i64, goalies: &[GoalieStats]) -> Vec<RuleResult> {
    if goalies.is_empty() {
        return vec![RuleResult::skipped("goalie_shot_arithmetic", "goalie", Severity::Error, game_id.to_string())];
    }
    goalies
        .iter()
        .map(|goalie| {
            let expected = goalie.saves + goalie.goals_against;
            let passed = expected == goalie.shots_against;
            RuleResult {
                rule_name: "goalie_shot_arithmetic",
                category: "goalie",
                passed,
                severity: Severity::Error,
                message: if passed {
                    "saves plus goals against equal shots against".to_string()
                } else {
                    format!("saves {} + goals_against {} != shots_against {}", goalie.saves, goalie.goals_against, goalie.shots_against)
                },
                details: serde_json::json!({
                    "saves": goalie.saves,
                    "goals_against": goalie.goals_against,
                    "shots_against": goalie.shots_against,
                }),
                entity_id: goalie.player_id.to_string(),
                cross_source: None,
            }
        })
        .collect()
}

/// Team goals equal the sum of its skaters' goals. Severity error.
#[must_use]
pub fn team_goals_equal_skater_sum(game_id: i64, team: &TeamTotals, skaters: &[SkaterStats]) -> RuleResult {
    let team_skaters: Vec<&SkaterStats> = skaters.iter().filter(|s| s.team_id == team.team_id).collect();
    let sum: i64 = team_skaters.iter().map(|s| s.goals).sum();
    let passed = team.score == sum;
    RuleResult {
        rule_name: "team_goals_equal_skater_sum",
        category: "team",
        passed,
        severity: Severity::Error,
        message: if passed {
            "team score equals sum of skater goals".to_string()
        } else {
            format!("team score {} != sum of skater goals {sum}", team.score)
        },
        details: serde_json::json!({"team_score": team.score, "skater_goal_sum": sum}),
        entity_id: format!("{game_id}:{}", team.team_id),
        cross_source: None,
    }
}

/// Team shots on goal at least equal to team score. Severity warning.
#[must_use]
pub fn shots_at_least_goals(game_id: i64, team: &TeamTotals) -> RuleResult {
    let passed = team.shots_on_goal >= team.score;
    RuleResult {
        rule_name: "shots_at_least_goals",
        category: "team",
        passed,
        severity: Severity::Warning,
        message: if passed {
            "shots on goal at least equal to score".to_string()
        } else {
            format!("shots_on_goal {} < score {}", team.shots_on_goal, team.score)
        },
        details: serde_json::json!({"shots_on_goal": team.shots_on_goal, "score": team.score}),
        entity_id: format!("{game_id}:{}", team.team_id),
        cross_source: None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn skater(goals: i64, assists: i64, points: i64) -> SkaterStats {
        SkaterStats {
            player_id: 1,
            name: "TEST".to_string(),
            team_id: 1,
            goals,
            assists,
            points,
            power_play_goals: 0,
            shorthanded_goals: 0,
            faceoff_pct: None,
            toi: None,
            toi_seconds: None,
            shifts: None,
        }
    }

    #[test]
    fn points_rule_passes_on_matching_arithmetic() {
        let results = points_equal_goals_plus_assists(1, &[skater(2, 1, 3)]);
        assert!(results[0].passed);
    }

    #[test]
    fn points_rule_fails_on_mismatched_arithmetic() {
        let results = points_equal_goals_plus_assists(1, &[skater(2, 1, 4)]);
        assert!(!results[0].passed);
    }

    #[test]
    fn points_rule_is_total_over_empty_input() {
        let results = points_equal_goals_plus_assists(1, &[]);
        assert_eq!(results.len(), 1);
        assert!(results[0].passed);
        assert!(results[0].message.starts_with("skipped"));
    }

    #[test]
    fn toi_format_accepts_single_and_double_digit_minutes() {
        let mut s = skater(0, 0, 0);
        s.toi = Some("9:42".to_string());
        assert!(toi_format(1, &[s.clone()])[0].passed);
        s.toi = Some("18:42".to_string());
        assert!(toi_format(1, &[s])[0].passed);
    }

    #[test]
    fn toi_format_rejects_malformed_string() {
        let mut s = skater(0, 0, 0);
        s.toi = Some("bad".to_string());
        assert!(!toi_format(1, &[s])[0].passed);
    }

    #[test]
    fn goalie_shot_arithmetic_checks_saves_plus_goals_against() {
        let goalie = GoalieStats {
            player_id: 30,
            name: "G".to_string(),
            team_id: 1,
            saves: 28,
            goals_against: 2,
            shots_against: 30,
            save_pct: None,
        };
        assert!(goalie_shot_arithmetic(1, &[goalie])[0].passed);
    }

    #[test]
    fn team_goals_equal_skater_sum_matches_filtered_team() {
        let team = TeamTotals { team_id: 1, score: 2, shots_on_goal: 30 };
        let skaters = vec![skater(1, 0, 1), skater(1, 0, 1), { let mut other = skater(5, 0, 5); other.team_id = 2; other }];
        let result = team_goals_equal_skater_sum(1, &team, &skaters);
        assert!(result.passed);
    }
}

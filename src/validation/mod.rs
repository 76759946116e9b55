//! Validation rules and reconciliation (C10/C11): pure-function rules
//! over parsed entities, and the engine that runs them per game and
//! persists the results.
//!
//! Grounded on `examples/original_source`'s validation layer (rule
//! functions named `cross_source_*`, each total over optional inputs)
//! and the teacher's `Resolver` module for the "pure function, caller
//! persists" split between rule evaluation and storage.

pub mod cross_source;
mod engine;
mod error;
pub mod rules;

pub use engine::ReconciliationEngine;
pub use error::ValidationError;

use serde_json::Value;

/// Severity attached to a [`RuleResult`], matching the `validation_rule`
/// and `validation_result` `CHECK (severity IN (...))` constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }
}

/// The outcome of evaluating one rule against one entity (internal) or
/// entity pair (cross-source), per spec §4.9's
/// `{rule_name, passed, severity, message, details, entity_id}` shape.
#[derive(Debug, Clone)]
pub struct RuleResult {
    pub rule_name: &'static str,
    /// Grouping used for the stable `(category, name)` evaluation order
    /// (spec §4.10) and stored as `validation_rule.category`.
    pub category: &'static str,
    pub passed: bool,
    pub severity: Severity,
    pub message: String,
    pub details: Value,
    pub entity_id: String,
    /// Set only for cross-source rules: the discrepancy key's
    /// `entity_type`/`field_name`, and the compared values, so a failed
    /// result can be turned directly into a `Discrepancy` upsert.
    pub cross_source: Option<CrossSourceContext>,
}

/// Discrepancy-keying context attached to cross-source [`RuleResult`]s.
#[derive(Debug, Clone)]
pub struct CrossSourceContext {
    pub entity_type: &'static str,
    pub field_name: &'static str,
    pub source_values: Value,
}

impl RuleResult {
    /// A total-function "not applicable" result: passes with a note,
    /// never a failure, per spec §4.9's "rules MUST be total functions".
    #[must_use]
    pub fn skipped(rule_name: &'static str, category: &'static str, severity: Severity, entity_id: impl Into<String>) -> Self {
        Self {
            rule_name,
            category,
            passed: true,
            severity,
            message: "skipped: insufficient data".to_string(),
            details: Value::Null,
            entity_id: entity_id.into(),
            cross_source: None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn skipped_result_always_passes() {
        let result = RuleResult::skipped("some_rule", "skater", Severity::Error, "42");
        assert!(result.passed);
        assert!(result.message.starts_with("skipped"));
    }
}

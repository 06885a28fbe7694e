//! Fraud rule evaluator.
//!
//! Evaluates compiled rules against feature records. A rule triggers iff
//! every condition holds (AND semantics); the first false condition
//! short-circuits the pass. Evaluation is a pure function over its inputs:
//! no state, no side effects beyond logging.
//!
//! Missing fields are not errors. A condition on an absent (or null) field
//! simply makes the rule not trigger, and the result records which field
//! was missing so callers can audit data quality upstream.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use verdict_core::{FeatureRecord, FeatureValue};

use crate::catalog::RuleCatalog;
use crate::rule::{Condition, Operator, Rule};
use crate::schema::Severity;

// ── Evaluation context ──────────────────────────────────────────────

/// Everything a single evaluation pass can see: the feature record plus
/// optional external aggregates (per-field category averages) consumed by
/// the `category_avg` operator.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationContext<'a> {
    pub record: &'a FeatureRecord,
    pub category_averages: Option<&'a HashMap<String, f64>>,
}

impl<'a> EvaluationContext<'a> {
    pub fn new(record: &'a FeatureRecord) -> Self {
        Self {
            record,
            category_averages: None,
        }
    }

    pub fn with_category_averages(
        record: &'a FeatureRecord,
        averages: &'a HashMap<String, f64>,
    ) -> Self {
        Self {
            record,
            category_averages: Some(averages),
        }
    }
}

// ── Results ─────────────────────────────────────────────────────────

/// Outcome of evaluating one rule against one record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleExecutionResult {
    pub rule_id: String,
    pub triggered: bool,
    /// Severity-adjusted confidence; 0.0 when the rule did not trigger.
    pub confidence: f64,
    /// Human-readable condition strings; on a trigger, one per condition.
    pub evidence: Vec<String>,
    pub actions: Vec<String>,
}

impl RuleExecutionResult {
    fn not_triggered(rule_id: &str, evidence: Vec<String>) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            triggered: false,
            confidence: 0.0,
            evidence,
            actions: Vec::new(),
        }
    }
}

/// Roll-up of one record evaluated against a whole catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEvaluation {
    pub item_id: String,
    pub results: Vec<RuleExecutionResult>,
    pub triggered_count: usize,
    /// Highest severity among triggered rules, if any triggered.
    pub top_severity: Option<Severity>,
    /// Highest adjusted confidence among triggered rules; 0.0 when clean.
    pub max_confidence: f64,
}

// ── Rule evaluator ──────────────────────────────────────────────────

/// Evaluates fraud rules against feature records. Stateless per call.
pub struct RuleEvaluator;

impl RuleEvaluator {
    /// Evaluate a single rule against a record.
    ///
    /// Disabled rules never trigger. Each condition is resolved in order
    /// and the first false one ends the pass.
    pub fn evaluate(rule: &Rule, ctx: &EvaluationContext) -> RuleExecutionResult {
        if !rule.enabled {
            return RuleExecutionResult::not_triggered(&rule.id, Vec::new());
        }

        for condition in &rule.conditions {
            let value = match ctx.record.get(&condition.field) {
                Some(v) if !v.is_null() => v,
                _ => {
                    debug!(
                        rule_id = %rule.id,
                        field = %condition.field,
                        "missing field, rule does not trigger"
                    );
                    return RuleExecutionResult::not_triggered(
                        &rule.id,
                        vec![format!("missing field: {}", condition.field)],
                    );
                }
            };

            if !evaluate_condition(condition, value, ctx) {
                return RuleExecutionResult::not_triggered(&rule.id, Vec::new());
            }
        }

        // All conditions held.
        RuleExecutionResult {
            rule_id: rule.id.clone(),
            triggered: true,
            confidence: rule.adjusted_confidence(),
            evidence: rule.conditions.iter().map(|c| c.describe()).collect(),
            actions: rule.actions.clone(),
        }
    }

    /// Evaluate every enabled rule in the catalog against one record.
    ///
    /// Rules that failed to compile never made it into the catalog, so a
    /// catalog pass cannot fail; it returns one result per enabled rule.
    pub fn evaluate_catalog(catalog: &RuleCatalog, ctx: &EvaluationContext) -> CatalogEvaluation {
        let mut results = Vec::new();
        let mut triggered_count = 0usize;
        let mut top_severity: Option<Severity> = None;
        let mut max_confidence = 0.0f64;

        for rule in catalog.enabled_rules() {
            let result = Self::evaluate(rule, ctx);
            if result.triggered {
                triggered_count += 1;
                max_confidence = max_confidence.max(result.confidence);
                top_severity = Some(match top_severity {
                    Some(current) => current.max(rule.severity),
                    None => rule.severity,
                });
            }
            results.push(result);
        }

        debug!(
            item_id = %ctx.record.item_id,
            rules = results.len(),
            triggered = triggered_count,
            "catalog evaluation complete"
        );

        CatalogEvaluation {
            item_id: ctx.record.item_id.clone(),
            results,
            triggered_count,
            top_severity,
            max_confidence,
        }
    }
}

// ── Condition evaluation ────────────────────────────────────────────

/// Evaluate one condition against a resolved feature value. Numeric
/// operators fail closed when the value does not coerce to a number.
fn evaluate_condition(condition: &Condition, value: &FeatureValue, ctx: &EvaluationContext) -> bool {
    match &condition.operator {
        Operator::GreaterThan(bound) => numeric(value).map(|v| v > *bound).unwrap_or(false),
        Operator::LessThan(bound) => numeric(value).map(|v| v < *bound).unwrap_or(false),
        Operator::AtLeast(bound) => numeric(value).map(|v| v >= *bound).unwrap_or(false),
        Operator::AtMost(bound) => numeric(value).map(|v| v <= *bound).unwrap_or(false),
        Operator::Equals(scalar) => scalar.matches(value),
        Operator::NotEquals(scalar) => !scalar.matches(value),
        Operator::In(set) => set.iter().any(|s| s.matches(value)),
        Operator::NotIn(set) => !set.iter().any(|s| s.matches(value)),
        Operator::Contains(needle) => {
            value.to_string().to_lowercase().contains(&needle.to_lowercase())
        }
        Operator::NotContains(needle) => {
            !value.to_string().to_lowercase().contains(&needle.to_lowercase())
        }
        Operator::Between { low, high } => numeric(value)
            .map(|v| v >= *low && v <= *high)
            .unwrap_or(false),
        Operator::Matches(re) => re.is_match(&value.to_string()),
        Operator::NotMatches(re) => !re.is_match(&value.to_string()),
        Operator::CategoryAvg { ratio } => {
            // Placeholder hook: false unless the caller supplied aggregates.
            let average = ctx
                .category_averages
                .and_then(|m| m.get(&condition.field))
                .copied();
            match (numeric(value), average) {
                (Some(v), Some(avg)) => v > ratio * avg,
                _ => false,
            }
        }
    }
}

fn numeric(value: &FeatureValue) -> Option<f64> {
    value.as_f64()
}

// ── Tests ───────────────────────────────────────────────────────────

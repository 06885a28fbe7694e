//! Compiled rule model.
//!
//! `RuleDefinition::compile` turns the raw YAML spec into a [`Rule`] whose
//! conditions carry strongly-typed operands: numeric bounds are parsed,
//! regexes are compiled, set members are typed scalars. Every malformed
//! operand is rejected here with a [`RuleError::InvalidCondition`], so the
//! evaluator never sees an operator/operand combination it cannot handle.

use std::fmt;

use regex::Regex;
use serde_yaml::Value as Yaml;

use verdict_core::FeatureValue;

use crate::error::RuleError;
use crate::schema::{ConditionSpec, RawOperator, RuleDefinition, RuleKind, Severity};

// ── Scalar operands ─────────────────────────────────────────────────

/// A typed scalar operand for equality and set-membership operators.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    Number(f64),
    Text(String),
    Flag(bool),
}

impl ScalarValue {
    /// Equality against a feature value. Numeric kinds unify (an integer
    /// feature equals a float operand); text is case-sensitive; mixed
    /// text/number never matches.
    pub fn matches(&self, value: &FeatureValue) -> bool {
        match (self, value) {
            (ScalarValue::Number(n), v) => match v {
                FeatureValue::Integer(_) | FeatureValue::Float(_) | FeatureValue::Boolean(_) => {
                    v.as_f64() == Some(*n)
                }
                _ => false,
            },
            (ScalarValue::Text(t), FeatureValue::Text(s)) => t == s,
            (ScalarValue::Flag(b), FeatureValue::Boolean(v)) => b == v,
            _ => false,
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Number(n) => write!(f, "{}", n),
            ScalarValue::Text(t) => write!(f, "{}", t),
            ScalarValue::Flag(b) => write!(f, "{}", b),
        }
    }
}

// ── Operators (closed union) ────────────────────────────────────────

/// The closed operator union. One variant per operator token, each carrying
/// its typed operand; there is no "unknown operator" branch at runtime.
#[derive(Debug, Clone)]
pub enum Operator {
    GreaterThan(f64),
    LessThan(f64),
    AtLeast(f64),
    AtMost(f64),
    Equals(ScalarValue),
    NotEquals(ScalarValue),
    In(Vec<ScalarValue>),
    NotIn(Vec<ScalarValue>),
    Contains(String),
    NotContains(String),
    Between { low: f64, high: f64 },
    Matches(Regex),
    NotMatches(Regex),
    /// Compares the field against `ratio` times the external category average
    /// for that field. Only meaningful when the evaluation context supplies
    /// aggregates; otherwise the condition is false.
    CategoryAvg { ratio: f64 },
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::GreaterThan(v) => write!(f, "> {}", v),
            Operator::LessThan(v) => write!(f, "< {}", v),
            Operator::AtLeast(v) => write!(f, ">= {}", v),
            Operator::AtMost(v) => write!(f, "<= {}", v),
            Operator::Equals(v) => write!(f, "== {}", v),
            Operator::NotEquals(v) => write!(f, "!= {}", v),
            Operator::In(vs) => write!(f, "in [{}]", join_scalars(vs)),
            Operator::NotIn(vs) => write!(f, "not_in [{}]", join_scalars(vs)),
            Operator::Contains(s) => write!(f, "contains {}", s),
            Operator::NotContains(s) => write!(f, "not_contains {}", s),
            Operator::Between { low, high } => write!(f, "between {} and {}", low, high),
            Operator::Matches(re) => write!(f, "matches {}", re.as_str()),
            Operator::NotMatches(re) => write!(f, "not_matches {}", re.as_str()),
            Operator::CategoryAvg { ratio } => write!(f, "category_avg {}", ratio),
        }
    }
}

fn join_scalars(values: &[ScalarValue]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

// ── Compiled condition & rule ───────────────────────────────────────

/// A compiled condition: field name plus a typed operator.
#[derive(Debug, Clone)]
pub struct Condition {
    pub field: String,
    pub operator: Operator,
}

impl Condition {
    /// Human-readable form used in evidence lists: `"unit_price > 1000"`.
    pub fn describe(&self) -> String {
        format!("{} {}", self.field, self.operator)
    }
}

/// A compiled, evaluation-ready rule. Immutable during an evaluation pass.
#[derive(Debug, Clone)]
pub struct Rule {
    pub id: String,
    pub name: String,
    pub kind: RuleKind,
    pub severity: Severity,
    /// Base confidence attributed to a trigger, before severity adjustment.
    pub base_confidence: f64,
    pub enabled: bool,
    pub conditions: Vec<Condition>,
    pub actions: Vec<String>,
}

impl Rule {
    /// Severity-adjusted confidence for a trigger, clamped into [0, 1].
    pub fn adjusted_confidence(&self) -> f64 {
        (self.base_confidence * self.severity.confidence_multiplier()).clamp(0.0, 1.0)
    }
}

// ── Compilation ─────────────────────────────────────────────────────

impl RuleDefinition {
    /// Compile the raw definition into an evaluation-ready [`Rule`].
    ///
    /// Rejects: confidence outside [0, 1], an empty condition list (an
    /// unconditional rule would fire on every record), operand type
    /// mismatches, malformed `between` ranges and invalid regexes.
    pub fn compile(&self) -> Result<Rule, RuleError> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(RuleError::invalid(
                &self.id,
                format!("confidence {} outside [0, 1]", self.confidence),
            ));
        }
        if self.conditions.is_empty() {
            return Err(RuleError::invalid(&self.id, "rule has no conditions"));
        }

        let mut conditions = Vec::with_capacity(self.conditions.len());
        for spec in &self.conditions {
            conditions.push(compile_condition(&self.id, spec)?);
        }

        Ok(Rule {
            id: self.id.clone(),
            name: self.name.clone(),
            kind: self.category,
            severity: self.severity,
            base_confidence: self.confidence,
            enabled: self.enabled,
            conditions,
            actions: self.actions.clone(),
        })
    }
}

fn compile_condition(rule_id: &str, spec: &ConditionSpec) -> Result<Condition, RuleError> {
    let operator = match spec.op {
        RawOperator::Gt => Operator::GreaterThan(numeric_operand(rule_id, spec)?),
        RawOperator::Lt => Operator::LessThan(numeric_operand(rule_id, spec)?),
        RawOperator::Gte => Operator::AtLeast(numeric_operand(rule_id, spec)?),
        RawOperator::Lte => Operator::AtMost(numeric_operand(rule_id, spec)?),
        RawOperator::Eq => Operator::Equals(scalar_operand(rule_id, spec, &spec.value)?),
        RawOperator::Neq => Operator::NotEquals(scalar_operand(rule_id, spec, &spec.value)?),
        RawOperator::In => Operator::In(set_operand(rule_id, spec)?),
        RawOperator::NotIn => Operator::NotIn(set_operand(rule_id, spec)?),
        RawOperator::Contains => Operator::Contains(text_operand(rule_id, spec)?),
        RawOperator::NotContains => Operator::NotContains(text_operand(rule_id, spec)?),
        RawOperator::Between => {
            let (low, high) = range_operand(rule_id, spec)?;
            Operator::Between { low, high }
        }
        RawOperator::Matches => Operator::Matches(regex_operand(rule_id, spec)?),
        RawOperator::NotMatches => Operator::NotMatches(regex_operand(rule_id, spec)?),
        RawOperator::CategoryAvg => Operator::CategoryAvg {
            ratio: numeric_operand(rule_id, spec)?,
        },
    };

    Ok(Condition {
        field: spec.field.clone(),
        operator,
    })
}

fn numeric_operand(rule_id: &str, spec: &ConditionSpec) -> Result<f64, RuleError> {
    yaml_number(&spec.value).ok_or_else(|| {
        RuleError::invalid(
            rule_id,
            format!("operator '{}' on '{}' needs a numeric value", spec.op, spec.field),
        )
    })
}

fn text_operand(rule_id: &str, spec: &ConditionSpec) -> Result<String, RuleError> {
    match &spec.value {
        Yaml::String(s) => Ok(s.clone()),
        _ => Err(RuleError::invalid(
            rule_id,
            format!("operator '{}' on '{}' needs a string value", spec.op, spec.field),
        )),
    }
}

fn scalar_operand(rule_id: &str, spec: &ConditionSpec, value: &Yaml) -> Result<ScalarValue, RuleError> {
    match value {
        Yaml::Number(n) => n.as_f64().map(ScalarValue::Number).ok_or_else(|| {
            RuleError::invalid(rule_id, format!("non-finite number on '{}'", spec.field))
        }),
        Yaml::String(s) => Ok(ScalarValue::Text(s.clone())),
        Yaml::Bool(b) => Ok(ScalarValue::Flag(*b)),
        _ => Err(RuleError::invalid(
            rule_id,
            format!("operator '{}' on '{}' needs a scalar value", spec.op, spec.field),
        )),
    }
}

fn set_operand(rule_id: &str, spec: &ConditionSpec) -> Result<Vec<ScalarValue>, RuleError> {
    match &spec.value {
        Yaml::Sequence(seq) if !seq.is_empty() => seq
            .iter()
            .map(|v| scalar_operand(rule_id, spec, v))
            .collect(),
        _ => Err(RuleError::invalid(
            rule_id,
            format!(
                "operator '{}' on '{}' needs a non-empty list value",
                spec.op, spec.field
            ),
        )),
    }
}

fn range_operand(rule_id: &str, spec: &ConditionSpec) -> Result<(f64, f64), RuleError> {
    let bounds: Option<(f64, f64)> = match &spec.value {
        Yaml::Sequence(seq) if seq.len() == 2 => {
            match (yaml_number(&seq[0]), yaml_number(&seq[1])) {
                (Some(low), Some(high)) => Some((low, high)),
                _ => None,
            }
        }
        _ => None,
    };
    let (low, high) = bounds.ok_or_else(|| {
        RuleError::invalid(
            rule_id,
            format!("'between' on '{}' needs a two-element numeric range", spec.field),
        )
    })?;
    if low > high {
        return Err(RuleError::invalid(
            rule_id,
            format!("'between' range on '{}' is inverted ({} > {})", spec.field, low, high),
        ));
    }
    Ok((low, high))
}

fn regex_operand(rule_id: &str, spec: &ConditionSpec) -> Result<Regex, RuleError> {
    let pattern = text_operand(rule_id, spec)?;
    Regex::new(&pattern).map_err(|e| {
        RuleError::invalid(
            rule_id,
            format!("invalid pattern on '{}': {}", spec.field, e),
        )
    })
}

/// Lenient numeric extraction: YAML numbers and numeric strings both count.
fn yaml_number(value: &Yaml) -> Option<f64> {
    match value {
        Yaml::Number(n) => n.as_f64(),
        Yaml::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::RawOperator;

    fn spec(field: &str, op: RawOperator, value: Yaml) -> ConditionSpec {
        ConditionSpec {
            field: field.to_string(),
            op,
            value,
        }
    }

    fn definition(conditions: Vec<ConditionSpec>) -> RuleDefinition {
        RuleDefinition {
            id: "r1".to_string(),
            name: "Test rule".to_string(),
            description: None,
            enabled: true,
            category: RuleKind::PriceAnomaly,
            severity: Severity::Medium,
            confidence: 0.7,
            conditions,
            actions: vec![],
        }
    }

    #[test]
    fn compiles_every_operator() {
        let conditions = vec![
            spec("a", RawOperator::Gt, Yaml::from(1.0)),
            spec("a", RawOperator::Lt, Yaml::from(2.0)),
            spec("a", RawOperator::Gte, Yaml::from("3")),
            spec("a", RawOperator::Lte, Yaml::from(4)),
            spec("b", RawOperator::Eq, Yaml::from("x")),
            spec("b", RawOperator::Neq, Yaml::from(true)),
            spec("c", RawOperator::In, serde_yaml::from_str("[1, two]").unwrap()),
            spec("c", RawOperator::NotIn, serde_yaml::from_str("[3]").unwrap()),
            spec("d", RawOperator::Contains, Yaml::from("needle")),
            spec("d", RawOperator::NotContains, Yaml::from("hay")),
            spec("e", RawOperator::Between, serde_yaml::from_str("[0, 10]").unwrap()),
            spec("f", RawOperator::Matches, Yaml::from("^ab+c$")),
            spec("f", RawOperator::NotMatches, Yaml::from("[0-9]{4}")),
            spec("g", RawOperator::CategoryAvg, Yaml::from(1.5)),
        ];
        let rule = definition(conditions).compile().unwrap();
        assert_eq!(rule.conditions.len(), 14);
        assert!(matches!(rule.conditions[0].operator, Operator::GreaterThan(v) if v == 1.0));
        assert!(matches!(rule.conditions[2].operator, Operator::AtLeast(v) if v == 3.0));
        assert!(matches!(&rule.conditions[6].operator, Operator::In(vs) if vs.len() == 2));
        assert!(matches!(
            rule.conditions[10].operator,
            Operator::Between { low, high } if low == 0.0 && high == 10.0
        ));
    }

    #[test]
    fn rejects_bad_operands() {
        // numeric operator with text operand
        let bad = definition(vec![spec("a", RawOperator::Gt, Yaml::from("abc"))]);
        assert!(matches!(bad.compile(), Err(RuleError::InvalidCondition { .. })));

        // between with a single bound
        let bad = definition(vec![spec(
            "a",
            RawOperator::Between,
            serde_yaml::from_str("[1]").unwrap(),
        )]);
        assert!(bad.compile().is_err());

        // inverted between range
        let bad = definition(vec![spec(
            "a",
            RawOperator::Between,
            serde_yaml::from_str("[10, 1]").unwrap(),
        )]);
        assert!(bad.compile().is_err());

        // invalid regex
        let bad = definition(vec![spec("a", RawOperator::Matches, Yaml::from("(unclosed"))]);
        assert!(bad.compile().is_err());

        // empty membership set
        let bad = definition(vec![spec(
            "a",
            RawOperator::In,
            serde_yaml::from_str("[]").unwrap(),
        )]);
        assert!(bad.compile().is_err());
    }

    #[test]
    fn rejects_out_of_range_confidence_and_empty_rules() {
        let mut def = definition(vec![spec("a", RawOperator::Gt, Yaml::from(1.0))]);
        def.confidence = 1.5;
        assert!(def.compile().is_err());

        let empty = definition(vec![]);
        assert!(empty.compile().is_err());
    }

    #[test]
    fn adjusted_confidence_applies_multiplier_and_clamps() {
        let mut def = definition(vec![spec("a", RawOperator::Gt, Yaml::from(1.0))]);
        def.severity = Severity::Critical;
        def.confidence = 0.5;
        let rule = def.clone().compile().unwrap();
        assert!((rule.adjusted_confidence() - 0.6).abs() < 1e-12);

        // clamp at 1.0
        def.confidence = 0.95;
        let rule = def.clone().compile().unwrap();
        assert_eq!(rule.adjusted_confidence(), 1.0);

        // low severity dampens, never below zero
        def.severity = Severity::Low;
        def.confidence = 0.0;
        let rule = def.compile().unwrap();
        assert_eq!(rule.adjusted_confidence(), 0.0);
    }

    #[test]
    fn evidence_strings_read_like_the_source_expression() {
        let def = definition(vec![
            spec("unit_price", RawOperator::Gt, Yaml::from(1000)),
            spec("origin", RawOperator::In, serde_yaml::from_str("[BR, PY]").unwrap()),
            spec("weight", RawOperator::Between, serde_yaml::from_str("[1, 5]").unwrap()),
        ]);
        let rule = def.compile().unwrap();
        assert_eq!(rule.conditions[0].describe(), "unit_price > 1000");
        assert_eq!(rule.conditions[1].describe(), "origin in [BR, PY]");
        assert_eq!(rule.conditions[2].describe(), "weight between 1 and 5");
    }

    #[test]
    fn scalar_matching_unifies_numeric_kinds() {
        assert!(ScalarValue::Number(5.0).matches(&FeatureValue::Integer(5)));
        assert!(ScalarValue::Number(5.0).matches(&FeatureValue::Float(5.0)));
        assert!(!ScalarValue::Number(5.0).matches(&FeatureValue::Text("5".into())));
        assert!(ScalarValue::Text("BR".into()).matches(&FeatureValue::Text("BR".into())));
        assert!(!ScalarValue::Text("br".into()).matches(&FeatureValue::Text("BR".into())));
        assert!(ScalarValue::Flag(true).matches(&FeatureValue::Boolean(true)));
    }
}

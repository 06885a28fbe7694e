//! Fraud detection YAML rule engine.
//!
//! What lives here:
//! - Rule documents written in YAML, deserialized with serde
//! - Two-pass document parsing (envelope first, typed spec second)
//! - Compilation into a closed operator union with typed operands
//! - A catalog that loads directories leniently and reports skips
//! - A pure evaluator with AND short-circuit semantics
//!
//! Missing feature fields never raise: rules simply do not trigger,
//! and the result says which field was absent.

pub mod catalog;
pub mod error;
pub mod evaluator;
pub mod rule;
pub mod schema;

pub use catalog::{CatalogStats, LoadReport, RuleCatalog, SkippedRule};
pub use error::RuleError;
pub use evaluator::{CatalogEvaluation, EvaluationContext, RuleEvaluator, RuleExecutionResult};
pub use rule::{Condition, Operator, Rule, ScalarValue};
pub use schema::{
    CommonMetadata, ConditionSpec, DocumentKind, RawOperator, RuleDefinition, RuleDocument,
    RuleEnvelope, RuleKind, Severity,
};

//! YAML rule-document schema with serde deserialization.
//!
//! The type hierarchy, top down:
//! - `RuleEnvelope`: header-only first pass (apiVersion, kind, metadata)
//! - `RuleDocument`: one enum over every supported kind
//! - `FraudRuleDoc` / `RuleSetDoc`: a single rule, or a bundle of rules in one file
//!
//! Documents carry raw condition specs (`ConditionSpec`); the typed, regex-compiled
//! form lives in [`crate::rule`] and is produced by `RuleDefinition::compile`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::RuleError;

// ── Document kind enum ──────────────────────────────────────────────

/// Supported document kinds for two-pass deserialization dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentKind {
    FraudRule,
    FraudRuleSet,
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentKind::FraudRule => write!(f, "FraudRule"),
            DocumentKind::FraudRuleSet => write!(f, "FraudRuleSet"),
        }
    }
}

impl FromStr for DocumentKind {
    type Err = RuleError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "FraudRule" => Ok(DocumentKind::FraudRule),
            "FraudRuleSet" => Ok(DocumentKind::FraudRuleSet),
            other => Err(RuleError::UnknownKind(other.to_string())),
        }
    }
}

// ── Rule category / severity ────────────────────────────────────────

/// Fraud rule categories. Every rule belongs to exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    PriceAnomaly,
    VolumeAnomaly,
    TaxEvasion,
    SupplierRisk,
    DescriptionMismatch,
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleKind::PriceAnomaly => write!(f, "price_anomaly"),
            RuleKind::VolumeAnomaly => write!(f, "volume_anomaly"),
            RuleKind::TaxEvasion => write!(f, "tax_evasion"),
            RuleKind::SupplierRisk => write!(f, "supplier_risk"),
            RuleKind::DescriptionMismatch => write!(f, "description_mismatch"),
        }
    }
}

impl FromStr for RuleKind {
    type Err = RuleError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "price_anomaly" => Ok(RuleKind::PriceAnomaly),
            "volume_anomaly" => Ok(RuleKind::VolumeAnomaly),
            "tax_evasion" => Ok(RuleKind::TaxEvasion),
            "supplier_risk" => Ok(RuleKind::SupplierRisk),
            "description_mismatch" => Ok(RuleKind::DescriptionMismatch),
            other => Err(RuleError::UnknownKind(other.to_string())),
        }
    }
}

/// Rule severity. Ordering is by escalation level (Low < Medium < High < Critical)
/// so roll-ups can take a `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Confidence multiplier applied to a triggered rule's base confidence.
    /// Critical and high severities amplify, low dampens, medium is neutral.
    pub fn confidence_multiplier(&self) -> f64 {
        match self {
            Severity::Critical => 1.2,
            Severity::High => 1.1,
            Severity::Medium => 1.0,
            Severity::Low => 0.9,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

// ── Rule envelope (first-pass) ──────────────────────────────────────

/// First-pass view of a rule document: header fields only.
///
/// Loading happens in two passes so a bad `spec` body produces a precise
/// error. The envelope gives us `kind`, which picks the concrete type the
/// whole document is then parsed into.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleEnvelope {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    pub metadata: CommonMetadata,
    /// Everything past the header, held as raw YAML until the kind is known.
    #[serde(flatten)]
    pub rest: serde_yaml::Value,
}

impl RuleEnvelope {
    /// Turn the raw `kind` string into a typed [`DocumentKind`].
    pub fn document_kind(&self) -> std::result::Result<DocumentKind, RuleError> {
        self.kind.parse()
    }

    /// Second pass: re-serialize the envelope and parse it as the concrete type.
    pub fn parse_full(&self) -> std::result::Result<RuleDocument, RuleError> {
        match self.document_kind()? {
            DocumentKind::FraudRule => {
                let yaml = serde_yaml::to_string(self)?;
                let doc: FraudRuleDoc = serde_yaml::from_str(&yaml)?;
                Ok(RuleDocument::Fraud(doc))
            }
            DocumentKind::FraudRuleSet => {
                let yaml = serde_yaml::to_string(self)?;
                let doc: RuleSetDoc = serde_yaml::from_str(&yaml)?;
                Ok(RuleDocument::Set(doc))
            }
        }
    }
}

// ── Rule document (multi-kind container) ────────────────────────────

/// A fully deserialized rule document of any supported kind.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleDocument {
    /// A single fraud rule.
    Fraud(FraudRuleDoc),
    /// A bundle of rules sharing one file.
    Set(RuleSetDoc),
}

impl RuleDocument {
    /// Get the document's metadata regardless of kind.
    pub fn metadata(&self) -> &CommonMetadata {
        match self {
            RuleDocument::Fraud(doc) => &doc.metadata,
            RuleDocument::Set(doc) => &doc.metadata,
        }
    }

    /// Get the document kind.
    pub fn kind(&self) -> DocumentKind {
        match self {
            RuleDocument::Fraud(_) => DocumentKind::FraudRule,
            RuleDocument::Set(_) => DocumentKind::FraudRuleSet,
        }
    }

    /// Normalize to a flat list of rule definitions, whatever the document shape.
    pub fn definitions(&self) -> Vec<RuleDefinition> {
        match self {
            RuleDocument::Fraud(doc) => vec![doc.definition()],
            RuleDocument::Set(doc) => doc.spec.rules.clone(),
        }
    }

    /// Render the document back to YAML, whichever kind it holds.
    pub fn to_yaml(&self) -> std::result::Result<String, serde_yaml::Error> {
        match self {
            RuleDocument::Fraud(doc) => serde_yaml::to_string(doc),
            RuleDocument::Set(doc) => serde_yaml::to_string(doc),
        }
    }
}

/// Shared metadata header for all document kinds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CommonMetadata {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

// ── Single-rule document ────────────────────────────────────────────

/// Top-level single fraud rule parsed from YAML.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FraudRuleDoc {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    pub metadata: CommonMetadata,
    pub spec: RuleBody,
}

impl FraudRuleDoc {
    /// Merge metadata and spec into a self-contained definition.
    pub fn definition(&self) -> RuleDefinition {
        RuleDefinition {
            id: self.metadata.id.clone(),
            name: self.metadata.name.clone(),
            description: self.metadata.description.clone(),
            enabled: self.metadata.enabled,
            category: self.spec.category,
            severity: self.spec.severity,
            confidence: self.spec.confidence,
            conditions: self.spec.conditions.clone(),
            actions: self.spec.actions.clone(),
        }
    }
}

/// Rule body for a single-rule document (id/name live in metadata).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RuleBody {
    pub category: RuleKind,
    pub severity: Severity,
    /// Base confidence attributed to a trigger, before severity adjustment.
    pub confidence: f64,
    pub conditions: Vec<ConditionSpec>,
    #[serde(default)]
    pub actions: Vec<String>,
}

// ── Rule-set document ───────────────────────────────────────────────

/// A bundle of rule definitions sharing one file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RuleSetDoc {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub kind: String,
    pub metadata: CommonMetadata,
    pub spec: RuleSetBody,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RuleSetBody {
    pub rules: Vec<RuleDefinition>,
}

/// A self-contained rule definition: the unit the catalog stores, exports
/// and re-imports. This is the persistence form of a rule; compiling it
/// (operator typing, regex compilation) yields [`crate::rule::Rule`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RuleDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub category: RuleKind,
    pub severity: Severity,
    pub confidence: f64,
    pub conditions: Vec<ConditionSpec>,
    #[serde(default)]
    pub actions: Vec<String>,
}

// ── Condition spec (raw) ────────────────────────────────────────────

/// One raw condition as written in YAML: field, operator token, operand.
/// Operand typing is checked at compile time, not at parse time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ConditionSpec {
    pub field: String,
    pub op: RawOperator,
    pub value: serde_yaml::Value,
}

/// Operator tokens accepted in rule documents. This is the closed set;
/// anything else fails YAML deserialization before it can reach evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RawOperator {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Neq,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "not_in")]
    NotIn,
    #[serde(rename = "contains")]
    Contains,
    #[serde(rename = "not_contains")]
    NotContains,
    #[serde(rename = "between")]
    Between,
    #[serde(rename = "matches")]
    Matches,
    #[serde(rename = "not_matches")]
    NotMatches,
    #[serde(rename = "category_avg")]
    CategoryAvg,
}

impl fmt::Display for RawOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = match self {
            RawOperator::Gt => ">",
            RawOperator::Lt => "<",
            RawOperator::Gte => ">=",
            RawOperator::Lte => "<=",
            RawOperator::Eq => "==",
            RawOperator::Neq => "!=",
            RawOperator::In => "in",
            RawOperator::NotIn => "not_in",
            RawOperator::Contains => "contains",
            RawOperator::NotContains => "not_contains",
            RawOperator::Between => "between",
            RawOperator::Matches => "matches",
            RawOperator::NotMatches => "not_matches",
            RawOperator::CategoryAvg => "category_avg",
        };
        write!(f, "{}", token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRICE_RULE_YAML: &str = r#"
apiVersion: verdict/v1
kind: FraudRule
metadata:
  id: price-gouging
  name: Price gouging on imported goods
  description: Unit price far above what the declared category supports
  tags: [price, import]
  enabled: true
spec:
  category: price_anomaly
  severity: high
  confidence: 0.75
  conditions:
    - field: unit_price
      op: ">"
      value: 1000
    - field: supplier_age_days
      op: "<"
      value: 90
  actions:
    - flag_for_review
    - request_documentation
"#;

    const RULE_SET_YAML: &str = r#"
apiVersion: verdict/v1
kind: FraudRuleSet
metadata:
  id: baseline-pack
  name: Baseline fraud rules
  enabled: true
spec:
  rules:
    - id: ghost-supplier
      name: Supplier with no history
      category: supplier_risk
      severity: critical
      confidence: 0.8
      conditions:
        - field: supplier_invoice_count
          op: "<="
          value: 1
      actions: [escalate]
    - id: mismatched-description
      name: Description does not match category
      category: description_mismatch
      severity: medium
      confidence: 0.6
      conditions:
        - field: description
          op: not_contains
          value: "medical"
        - field: declared_category
          op: "=="
          value: "medical_supplies"
"#;

    #[test]
    fn parse_single_rule() {
        let doc: FraudRuleDoc = serde_yaml::from_str(PRICE_RULE_YAML).unwrap();
        assert_eq!(doc.api_version, "verdict/v1");
        assert_eq!(doc.metadata.id, "price-gouging");
        assert_eq!(doc.spec.category, RuleKind::PriceAnomaly);
        assert_eq!(doc.spec.severity, Severity::High);
        assert_eq!(doc.spec.conditions.len(), 2);
        assert_eq!(doc.spec.conditions[0].op, RawOperator::Gt);
        assert_eq!(doc.spec.actions, vec!["flag_for_review", "request_documentation"]);
    }

    #[test]
    fn parse_rule_set() {
        let doc: RuleSetDoc = serde_yaml::from_str(RULE_SET_YAML).unwrap();
        assert_eq!(doc.metadata.id, "baseline-pack");
        assert_eq!(doc.spec.rules.len(), 2);
        assert_eq!(doc.spec.rules[0].category, RuleKind::SupplierRisk);
        assert_eq!(doc.spec.rules[1].conditions[0].op, RawOperator::NotContains);
        // actions default to empty when omitted
        assert!(doc.spec.rules[1].actions.is_empty());
    }

    #[test]
    fn round_trip() {
        let doc: FraudRuleDoc = serde_yaml::from_str(PRICE_RULE_YAML).unwrap();
        let yaml = serde_yaml::to_string(&doc).unwrap();
        let doc2: FraudRuleDoc = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(doc, doc2);
    }

    #[test]
    fn malformed_yaml_errors() {
        // Missing required field
        let missing_meta = r#"
apiVersion: verdict/v1
kind: FraudRule
spec:
  category: price_anomaly
  severity: low
  confidence: 0.5
  conditions: []
"#;
        assert!(serde_yaml::from_str::<FraudRuleDoc>(missing_meta).is_err());

        // Operator outside the closed set
        let bad_operator = r#"
apiVersion: verdict/v1
kind: FraudRule
metadata:
  id: test
  name: Test
spec:
  category: price_anomaly
  severity: low
  confidence: 0.5
  conditions:
    - field: unit_price
      op: "~="
      value: 10
"#;
        assert!(serde_yaml::from_str::<FraudRuleDoc>(bad_operator).is_err());

        // Unknown field in strict struct
        let unknown_field = r#"
apiVersion: verdict/v1
kind: FraudRule
metadata:
  id: test
  name: Test
  bogus_field: oops
spec:
  category: price_anomaly
  severity: low
  confidence: 0.5
  conditions: []
"#;
        assert!(serde_yaml::from_str::<FraudRuleDoc>(unknown_field).is_err());
    }

    // ── DocumentKind / RuleEnvelope / RuleDocument tests ────────────

    #[test]
    fn document_kind_from_str() {
        assert_eq!("FraudRule".parse::<DocumentKind>().unwrap(), DocumentKind::FraudRule);
        assert_eq!("FraudRuleSet".parse::<DocumentKind>().unwrap(), DocumentKind::FraudRuleSet);
        assert!("AnomalyRule".parse::<DocumentKind>().is_err());
    }

    #[test]
    fn rule_kind_round_trips_through_str() {
        for kind in [
            RuleKind::PriceAnomaly,
            RuleKind::VolumeAnomaly,
            RuleKind::TaxEvasion,
            RuleKind::SupplierRisk,
            RuleKind::DescriptionMismatch,
        ] {
            assert_eq!(kind.to_string().parse::<RuleKind>().unwrap(), kind);
        }
        assert!("bogus".parse::<RuleKind>().is_err());
    }

    #[test]
    fn severity_ordering_and_multipliers() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
        assert_eq!(Severity::Critical.confidence_multiplier(), 1.2);
        assert_eq!(Severity::High.confidence_multiplier(), 1.1);
        assert_eq!(Severity::Medium.confidence_multiplier(), 1.0);
        assert_eq!(Severity::Low.confidence_multiplier(), 0.9);
    }

    #[test]
    fn rule_envelope_parses_both_kinds() {
        let envelope: RuleEnvelope = serde_yaml::from_str(PRICE_RULE_YAML).unwrap();
        assert_eq!(envelope.kind, "FraudRule");
        assert_eq!(envelope.metadata.id, "price-gouging");
        let doc = envelope.parse_full().unwrap();
        assert_eq!(doc.kind(), DocumentKind::FraudRule);
        assert_eq!(doc.definitions().len(), 1);

        let envelope: RuleEnvelope = serde_yaml::from_str(RULE_SET_YAML).unwrap();
        let doc = envelope.parse_full().unwrap();
        assert_eq!(doc.kind(), DocumentKind::FraudRuleSet);
        assert_eq!(doc.definitions().len(), 2);
    }

    #[test]
    fn envelope_rejects_unknown_kind() {
        let yaml = r#"
apiVersion: verdict/v1
kind: UnknownKind
metadata:
  id: test
  name: Test
"#;
        let envelope: RuleEnvelope = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(envelope.document_kind(), Err(RuleError::UnknownKind(_))));
    }

    #[test]
    fn fraud_doc_definition_merges_metadata() {
        let doc: FraudRuleDoc = serde_yaml::from_str(PRICE_RULE_YAML).unwrap();
        let def = doc.definition();
        assert_eq!(def.id, "price-gouging");
        assert_eq!(def.name, "Price gouging on imported goods");
        assert!(def.enabled);
        assert_eq!(def.category, RuleKind::PriceAnomaly);
        assert_eq!(def.conditions.len(), 2);
    }
}

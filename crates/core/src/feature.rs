use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A feature record is a flat key-value map plus the identifier of the item it
/// was extracted from. Upstream extraction owns the wire format; by the time a
/// record reaches this engine it is already a typed map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub item_id: String,
    pub features: HashMap<String, FeatureValue>,
}

impl FeatureRecord {
    pub fn new(item_id: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            features: HashMap::new(),
        }
    }

    /// Builder-style insert, mainly for tests and fixtures.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<FeatureValue>) -> Self {
        self.features.insert(field.into(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&FeatureValue> {
        self.features.get(field)
    }

    /// All features coercible to a number, for vector-space consumers.
    pub fn numeric_features(&self) -> HashMap<String, f64> {
        self.features
            .iter()
            .filter_map(|(k, v)| v.as_f64().map(|n| (k.clone(), n)))
            .collect()
    }
}

/// Typed feature values. Extraction emits strings, numbers and flags and we
/// preserve the distinction instead of stringifying everything.
///
/// Untagged, so records serialize as plain JSON maps. Variant order matters:
/// integers must be tried before floats.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FeatureValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Null,
}

impl FeatureValue {
    /// Extract as string, returning None for non-text values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FeatureValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Coerce to a float. Text parses leniently (trimmed); Null never coerces.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FeatureValue::Float(f) => Some(*f),
            FeatureValue::Integer(i) => Some(*i as f64),
            FeatureValue::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            FeatureValue::Text(s) => s.trim().parse().ok(),
            FeatureValue::Null => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FeatureValue::Null)
    }
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureValue::Text(s) => write!(f, "{}", s),
            FeatureValue::Integer(i) => write!(f, "{}", i),
            FeatureValue::Float(v) => write!(f, "{}", v),
            FeatureValue::Boolean(b) => write!(f, "{}", b),
            FeatureValue::Null => write!(f, "null"),
        }
    }
}

impl From<&str> for FeatureValue {
    fn from(s: &str) -> Self {
        FeatureValue::Text(s.to_string())
    }
}

impl From<String> for FeatureValue {
    fn from(s: String) -> Self {
        FeatureValue::Text(s)
    }
}

impl From<i64> for FeatureValue {
    fn from(i: i64) -> Self {
        FeatureValue::Integer(i)
    }
}

impl From<f64> for FeatureValue {
    fn from(f: f64) -> Self {
        FeatureValue::Float(f)
    }
}

impl From<bool> for FeatureValue {
    fn from(b: bool) -> Self {
        FeatureValue::Boolean(b)
    }
}

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a reviewer judged a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackKind {
    /// The prediction was wrong and a corrected value is supplied.
    Correction,
    /// The prediction was confirmed correct.
    Validation,
    /// The prediction was unusable; no corrected value offered.
    Rejection,
}

impl FeedbackKind {
    pub fn base_weight(self) -> f64 {
        match self {
            FeedbackKind::Correction => 1.0,
            FeedbackKind::Validation => 0.8,
            FeedbackKind::Rejection => 0.6,
        }
    }
}

impl fmt::Display for FeedbackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedbackKind::Correction => write!(f, "correction"),
            FeedbackKind::Validation => write!(f, "validation"),
            FeedbackKind::Rejection => write!(f, "rejection"),
        }
    }
}

/// One reviewed prediction. Entries are append-only; ingestion assigns the
/// id, the timestamp, and the derived learning weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub id: Uuid,
    /// Free-text description of the item the prediction was made for.
    pub description: String,
    pub predicted: String,
    pub corrected: String,
    /// Model confidence at prediction time, clamped to [0, 1].
    pub confidence: f64,
    pub source_id: String,
    pub kind: FeedbackKind,
    /// Derived learning weight; a confident-but-wrong prediction weighs
    /// more than an unconfident one.
    pub weight: f64,
    pub received_at: DateTime<Utc>,
}

impl FeedbackEntry {
    pub fn new(
        description: impl Into<String>,
        predicted: impl Into<String>,
        corrected: impl Into<String>,
        confidence: f64,
        source_id: impl Into<String>,
        kind: FeedbackKind,
    ) -> Self {
        let confidence = confidence.clamp(0.0, 1.0);
        Self {
            id: Uuid::new_v4(),
            description: description.into(),
            predicted: predicted.into(),
            corrected: corrected.into(),
            confidence,
            source_id: source_id.into(),
            kind,
            weight: learning_weight(kind, confidence),
            received_at: Utc::now(),
        }
    }
}

/// Base weight by kind, boosted when the model was confident: corrections
/// above 0.8 confidence and validations above 0.9 (both strict).
fn learning_weight(kind: FeedbackKind, confidence: f64) -> f64 {
    let base = kind.base_weight();
    match kind {
        FeedbackKind::Correction if confidence > 0.8 => base * 1.5,
        FeedbackKind::Validation if confidence > 0.9 => base * 1.2,
        _ => base,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weight_of(kind: FeedbackKind, confidence: f64) -> f64 {
        FeedbackEntry::new("desc", "1111", "2222", confidence, "analyst", kind).weight
    }

    #[test]
    fn weights_follow_kind_and_confidence() {
        assert_eq!(weight_of(FeedbackKind::Correction, 0.5), 1.0);
        assert_eq!(weight_of(FeedbackKind::Correction, 0.9), 1.5);
        assert_eq!(weight_of(FeedbackKind::Validation, 0.5), 0.8);
        assert!((weight_of(FeedbackKind::Validation, 0.95) - 0.96).abs() < 1e-12);
        // Rejections never boost.
        assert_eq!(weight_of(FeedbackKind::Rejection, 0.99), 0.6);
    }

    #[test]
    fn boost_gates_are_strict() {
        assert_eq!(weight_of(FeedbackKind::Correction, 0.8), 1.0);
        assert_eq!(weight_of(FeedbackKind::Validation, 0.9), 0.8);
    }

    #[test]
    fn confidence_is_clamped() {
        let entry = FeedbackEntry::new("d", "p", "c", 1.7, "s", FeedbackKind::Correction);
        assert_eq!(entry.confidence, 1.0);
        // Clamped confidence still clears the boost gate.
        assert_eq!(entry.weight, 1.5);
    }

    #[test]
    fn kind_serializes_as_snake_case() {
        assert_eq!(
            serde_json::to_string(&FeedbackKind::Correction).unwrap(),
            "\"correction\""
        );
        let parsed: FeedbackKind = serde_json::from_str("\"rejection\"").unwrap();
        assert_eq!(parsed, FeedbackKind::Rejection);
    }
}

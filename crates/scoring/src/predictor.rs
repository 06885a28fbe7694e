//! The predictor abstraction and the built-in reference families.
//!
//! A `Predictor` is one binary classifier inside the ensemble. Models are
//! never persisted as opaque blobs: each family exports its fitted
//! parameters as plain JSON and can be rebuilt from them, so snapshots stay
//! language-neutral and diffable.
//!
//! Two small built-in families keep the ensemble wiring honest without
//! turning this crate into a training framework:
//! - [`PriorPredictor`]: majority-class prior, probability = positive rate
//! - [`CentroidPredictor`]: per-class feature centroids, distance-ratio
//!   probability

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use verdict_core::FeatureRecord;

use crate::error::ScoringError;

// ── Training data ───────────────────────────────────────────────────

/// One labeled example. Appended to the ensemble's pool, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingExample {
    pub record: FeatureRecord,
    pub label: bool,
    pub added_at: DateTime<Utc>,
}

impl TrainingExample {
    pub fn new(record: FeatureRecord, label: bool) -> Self {
        Self {
            record,
            label,
            added_at: Utc::now(),
        }
    }
}

// ── Predictor trait ─────────────────────────────────────────────────

/// A binary classifier family usable inside the ensemble.
///
/// Implementations must be deterministic for a given training set: fitting
/// the same examples twice yields the same parameters, so snapshot
/// round-trips reproduce identical decisions.
pub trait Predictor: Send + Sync {
    /// Stable family name, used as the registry key when reloading
    /// snapshots (e.g. `"prior"`, `"centroid"`).
    fn family(&self) -> &'static str;

    /// Fit on labeled examples, replacing any previous state.
    fn fit(&mut self, examples: &[TrainingExample]) -> Result<(), ScoringError>;

    /// Probability that the record belongs to the positive (fraud) class.
    /// Must return a value in [0, 1]; untrained predictors return 0.5.
    fn predict_probability(&self, record: &FeatureRecord) -> f64;

    /// Per-feature contribution weights, empty when the family has none.
    fn feature_importance(&self) -> HashMap<String, f64>;

    /// Fitted parameters as plain JSON. Paired with the family's loader so
    /// loading the exported params reproduces the same predictor.
    fn params(&self) -> serde_json::Value;
}

// ── Prior predictor ─────────────────────────────────────────────────

/// Majority-class prior: ignores features entirely and predicts the
/// positive rate observed in training. Useful as a calibration floor and
/// as the simplest possible registry entry.
#[derive(Debug, Default, Clone)]
pub struct PriorPredictor {
    positive_rate: Option<f64>,
}

impl PriorPredictor {
    pub const FAMILY: &'static str = "prior";

    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from exported parameters.
    pub fn from_params(params: &serde_json::Value) -> Result<Self, ScoringError> {
        let rate = params
            .get("positive_rate")
            .and_then(|v| v.as_f64())
            .ok_or_else(|| {
                ScoringError::invalid_params(Self::FAMILY, "missing numeric 'positive_rate'")
            })?;
        if !(0.0..=1.0).contains(&rate) {
            return Err(ScoringError::invalid_params(
                Self::FAMILY,
                format!("positive_rate {rate} outside [0, 1]"),
            ));
        }
        Ok(Self {
            positive_rate: Some(rate),
        })
    }
}

impl Predictor for PriorPredictor {
    fn family(&self) -> &'static str {
        Self::FAMILY
    }

    fn fit(&mut self, examples: &[TrainingExample]) -> Result<(), ScoringError> {
        if examples.is_empty() {
            return Err(ScoringError::training(Self::FAMILY, "no training examples"));
        }
        let positives = examples.iter().filter(|e| e.label).count();
        self.positive_rate = Some(positives as f64 / examples.len() as f64);
        Ok(())
    }

    fn predict_probability(&self, _record: &FeatureRecord) -> f64 {
        self.positive_rate.unwrap_or(0.5)
    }

    fn feature_importance(&self) -> HashMap<String, f64> {
        HashMap::new()
    }

    fn params(&self) -> serde_json::Value {
        json!({ "positive_rate": self.positive_rate })
    }
}

// ── Centroid predictor ──────────────────────────────────────────────

/// Per-class centroid classifier over the numeric features seen in
/// training. Probability is the distance ratio `d_neg / (d_pos + d_neg)`,
/// so a record sitting on the positive centroid scores 1.0 and one on the
/// negative centroid scores 0.0. Features absent from a record contribute
/// to neither distance.
#[derive(Debug, Default, Clone)]
pub struct CentroidPredictor {
    feature_names: Vec<String>,
    positive_centroid: Vec<f64>,
    negative_centroid: Vec<f64>,
    trained: bool,
}

impl CentroidPredictor {
    pub const FAMILY: &'static str = "centroid";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_params(params: &serde_json::Value) -> Result<Self, ScoringError> {
        fn f64_vec(params: &serde_json::Value, key: &str) -> Result<Vec<f64>, ScoringError> {
            params
                .get(key)
                .and_then(|v| v.as_array())
                .map(|a| a.iter().filter_map(|x| x.as_f64()).collect::<Vec<_>>())
                .ok_or_else(|| {
                    ScoringError::invalid_params(
                        CentroidPredictor::FAMILY,
                        format!("missing numeric array '{key}'"),
                    )
                })
        }

        let feature_names: Vec<String> = params
            .get("feature_names")
            .and_then(|v| v.as_array())
            .map(|a| {
                a.iter()
                    .filter_map(|x| x.as_str().map(str::to_string))
                    .collect()
            })
            .ok_or_else(|| {
                ScoringError::invalid_params(Self::FAMILY, "missing string array 'feature_names'")
            })?;
        let positive_centroid = f64_vec(params, "positive_centroid")?;
        let negative_centroid = f64_vec(params, "negative_centroid")?;

        if positive_centroid.len() != feature_names.len()
            || negative_centroid.len() != feature_names.len()
        {
            return Err(ScoringError::invalid_params(
                Self::FAMILY,
                "centroid length does not match feature_names",
            ));
        }

        Ok(Self {
            feature_names,
            positive_centroid,
            negative_centroid,
            trained: true,
        })
    }

    fn class_centroid(examples: &[&TrainingExample], names: &[String]) -> Vec<f64> {
        let mut sums = vec![0.0; names.len()];
        let mut counts = vec![0usize; names.len()];
        for example in examples {
            let numeric = example.record.numeric_features();
            for (i, name) in names.iter().enumerate() {
                if let Some(&v) = numeric.get(name) {
                    sums[i] += v;
                    counts[i] += 1;
                }
            }
        }
        sums.iter()
            .zip(&counts)
            .map(|(&s, &c)| if c > 0 { s / c as f64 } else { 0.0 })
            .collect()
    }
}

impl Predictor for CentroidPredictor {
    fn family(&self) -> &'static str {
        Self::FAMILY
    }

    fn fit(&mut self, examples: &[TrainingExample]) -> Result<(), ScoringError> {
        let positives: Vec<&TrainingExample> = examples.iter().filter(|e| e.label).collect();
        let negatives: Vec<&TrainingExample> = examples.iter().filter(|e| !e.label).collect();

        // Centroids need both classes; a one-sided training set is a
        // model-level failure the ensemble isolates and survives.
        if positives.is_empty() || negatives.is_empty() {
            return Err(ScoringError::training(
                Self::FAMILY,
                "training data contains a single class",
            ));
        }

        let mut names: Vec<String> = examples
            .iter()
            .flat_map(|e| e.record.numeric_features().into_keys())
            .collect();
        names.sort();
        names.dedup();
        if names.is_empty() {
            return Err(ScoringError::training(Self::FAMILY, "no numeric features"));
        }

        self.positive_centroid = Self::class_centroid(&positives, &names);
        self.negative_centroid = Self::class_centroid(&negatives, &names);
        self.feature_names = names;
        self.trained = true;
        Ok(())
    }

    fn predict_probability(&self, record: &FeatureRecord) -> f64 {
        if !self.trained {
            return 0.5;
        }
        let numeric = record.numeric_features();
        let mut d_pos = 0.0;
        let mut d_neg = 0.0;
        for (i, name) in self.feature_names.iter().enumerate() {
            if let Some(&v) = numeric.get(name) {
                let dp = v - self.positive_centroid[i];
                let dn = v - self.negative_centroid[i];
                d_pos += dp * dp;
                d_neg += dn * dn;
            }
        }
        let (d_pos, d_neg) = (d_pos.sqrt(), d_neg.sqrt());
        if d_pos + d_neg == 0.0 {
            return 0.5;
        }
        d_neg / (d_pos + d_neg)
    }

    /// Importance is the normalized centroid gap per feature: dimensions
    /// where the classes sit far apart carry the decision.
    fn feature_importance(&self) -> HashMap<String, f64> {
        if !self.trained {
            return HashMap::new();
        }
        let gaps: Vec<f64> = self
            .positive_centroid
            .iter()
            .zip(&self.negative_centroid)
            .map(|(p, n)| (p - n).abs())
            .collect();
        let total: f64 = gaps.iter().sum();
        if total == 0.0 {
            return HashMap::new();
        }
        self.feature_names
            .iter()
            .zip(&gaps)
            .map(|(name, &gap)| (name.clone(), gap / total))
            .collect()
    }

    fn params(&self) -> serde_json::Value {
        json!({
            "feature_names": self.feature_names,
            "positive_centroid": self.positive_centroid,
            "negative_centroid": self.negative_centroid,
        })
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn example(price: f64, qty: f64, label: bool) -> TrainingExample {
        TrainingExample::new(
            FeatureRecord::new("x").with("price", price).with("qty", qty),
            label,
        )
    }

    #[test]
    fn prior_predicts_the_positive_rate() {
        let mut model = PriorPredictor::new();
        let examples = vec![
            example(1.0, 1.0, true),
            example(2.0, 1.0, false),
            example(3.0, 1.0, false),
            example(4.0, 1.0, false),
        ];
        model.fit(&examples).unwrap();

        let record = FeatureRecord::new("q");
        assert!((model.predict_probability(&record) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn prior_round_trips_through_params() {
        let mut model = PriorPredictor::new();
        model.fit(&[example(1.0, 1.0, true), example(2.0, 2.0, false)]).unwrap();

        let rebuilt = PriorPredictor::from_params(&model.params()).unwrap();
        let record = FeatureRecord::new("q");
        assert_eq!(
            model.predict_probability(&record),
            rebuilt.predict_probability(&record)
        );
    }

    #[test]
    fn prior_rejects_bad_params() {
        assert!(PriorPredictor::from_params(&json!({})).is_err());
        assert!(PriorPredictor::from_params(&json!({ "positive_rate": 1.5 })).is_err());
    }

    #[test]
    fn centroid_separates_two_clouds() {
        let mut model = CentroidPredictor::new();
        let examples = vec![
            example(100.0, 90.0, true),
            example(110.0, 95.0, true),
            example(1.0, 2.0, false),
            example(2.0, 1.0, false),
        ];
        model.fit(&examples).unwrap();

        let fraudish = FeatureRecord::new("a").with("price", 105.0).with("qty", 92.0);
        let legitish = FeatureRecord::new("b").with("price", 1.5).with("qty", 1.5);
        assert!(model.predict_probability(&fraudish) > 0.9);
        assert!(model.predict_probability(&legitish) < 0.1);
    }

    #[test]
    fn centroid_requires_both_classes() {
        let mut model = CentroidPredictor::new();
        let err = model
            .fit(&[example(1.0, 1.0, true), example(2.0, 2.0, true)])
            .unwrap_err();
        assert!(matches!(err, ScoringError::Training { .. }));
    }

    #[test]
    fn centroid_importance_tracks_the_informative_feature() {
        let mut model = CentroidPredictor::new();
        // qty is identical across classes; price carries all the signal.
        let examples = vec![
            example(100.0, 5.0, true),
            example(102.0, 5.0, true),
            example(1.0, 5.0, false),
            example(3.0, 5.0, false),
        ];
        model.fit(&examples).unwrap();

        let importance = model.feature_importance();
        assert!((importance["price"] - 1.0).abs() < 1e-9);
        assert!(importance.get("qty").copied().unwrap_or(0.0) < 1e-9);
    }

    #[test]
    fn centroid_round_trips_through_params() {
        let mut model = CentroidPredictor::new();
        model
            .fit(&[
                example(10.0, 1.0, true),
                example(12.0, 2.0, true),
                example(1.0, 8.0, false),
                example(2.0, 9.0, false),
            ])
            .unwrap();

        let rebuilt = CentroidPredictor::from_params(&model.params()).unwrap();
        let probe = FeatureRecord::new("p").with("price", 9.0).with("qty", 3.0);
        assert!(
            (model.predict_probability(&probe) - rebuilt.predict_probability(&probe)).abs()
                < 1e-12
        );
    }

    #[test]
    fn untrained_predictors_sit_on_the_fence() {
        let record = FeatureRecord::new("q").with("price", 1.0);
        assert_eq!(PriorPredictor::new().predict_probability(&record), 0.5);
        assert_eq!(CentroidPredictor::new().predict_probability(&record), 0.5);
    }
}

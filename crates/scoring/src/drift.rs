//! Feature-distribution drift detection and adaptation.
//!
//! Drift compares per-feature mean and standard-deviation vectors between
//! the pool the ensemble was last trained on and an incoming batch. The
//! comparison axes are the training features; batch-only features cannot
//! shift the distance but are reported as newly seen.

use serde::{Deserialize, Serialize};
use tracing::info;

use verdict_core::FeatureRecord;

use crate::ensemble::EnsembleScorer;
use crate::error::ScoringError;
use crate::predictor::TrainingExample;

// ── Feature statistics ──────────────────────────────────────────────

/// Per-feature mean/std over a set of records, axes sorted by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureStats {
    pub feature_names: Vec<String>,
    pub means: Vec<f64>,
    pub stds: Vec<f64>,
}

impl FeatureStats {
    /// Compute stats over every numeric feature seen in the records. A
    /// feature missing from some records is averaged over the records
    /// that carry it.
    pub fn from_records<'a>(records: impl Iterator<Item = &'a FeatureRecord>) -> Self {
        let numeric: Vec<_> = records.map(|r| r.numeric_features()).collect();

        let mut names: Vec<String> = numeric
            .iter()
            .flat_map(|m| m.keys().cloned())
            .collect();
        names.sort();
        names.dedup();

        let mut means = Vec::with_capacity(names.len());
        let mut stds = Vec::with_capacity(names.len());
        for name in &names {
            let values: Vec<f64> = numeric.iter().filter_map(|m| m.get(name).copied()).collect();
            let (mean, std) = mean_std(&values);
            means.push(mean);
            stds.push(std);
        }

        Self {
            feature_names: names,
            means,
            stds,
        }
    }

    /// Project another sample onto this stats object's axes. Features the
    /// sample lacks entirely fall back to this object's values, so they
    /// contribute zero distance.
    fn aligned_stats(&self, records: &[FeatureRecord]) -> (Vec<f64>, Vec<f64>) {
        let numeric: Vec<_> = records.iter().map(|r| r.numeric_features()).collect();
        let mut means = Vec::with_capacity(self.feature_names.len());
        let mut stds = Vec::with_capacity(self.feature_names.len());

        for (i, name) in self.feature_names.iter().enumerate() {
            let values: Vec<f64> = numeric.iter().filter_map(|m| m.get(name).copied()).collect();
            if values.is_empty() {
                means.push(self.means[i]);
                stds.push(self.stds[i]);
            } else {
                let (mean, std) = mean_std(&values);
                means.push(mean);
                stds.push(std);
            }
        }
        (means, stds)
    }
}

fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

#[inline]
fn l2_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

// ── Reports ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftReport {
    pub drift_detected: bool,
    /// L2 distance between training and batch per-feature mean vectors.
    pub mean_distance: f64,
    /// L2 distance between the standard-deviation vectors.
    pub std_distance: f64,
    /// Thresholds the distances were compared against.
    pub mean_threshold: f64,
    pub std_threshold: f64,
    pub batch_size: usize,
    /// Numeric features present in the batch but unseen at training time.
    pub new_features: Vec<String>,
}

/// Outcome of an adaptation attempt. On a non-drifted batch this is a
/// no-op with `retrained == false` and a zero accuracy delta.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptationResult {
    pub drift: DriftReport,
    pub retrained: bool,
    pub accuracy_before: f64,
    pub accuracy_after: f64,
}

impl AdaptationResult {
    pub fn accuracy_delta(&self) -> f64 {
        self.accuracy_after - self.accuracy_before
    }
}

// ── Scorer extension ────────────────────────────────────────────────

impl EnsembleScorer {
    /// Compare an incoming batch against the last training distribution.
    ///
    /// Requires at least `drift.min_batch_size` records; smaller batches
    /// are an insufficient-data error, not a "no drift" verdict.
    pub fn detect_drift(&self, batch: &[FeatureRecord]) -> Result<DriftReport, ScoringError> {
        let min = self.config.drift.min_batch_size;
        if batch.len() < min {
            return Err(ScoringError::InsufficientData {
                context: "drift detection",
                needed: min,
                got: batch.len(),
            });
        }

        let train_stats = {
            let state = self.inner.read().expect("scorer lock poisoned");
            state.train_stats.clone().ok_or(ScoringError::NotTrained)?
        };

        let (batch_means, batch_stds) = train_stats.aligned_stats(batch);
        let mean_distance = l2_distance(&train_stats.means, &batch_means);
        let std_distance = l2_distance(&train_stats.stds, &batch_stds);

        let mut new_features: Vec<String> = batch
            .iter()
            .flat_map(|r| r.numeric_features().into_keys())
            .filter(|name| !train_stats.feature_names.contains(name))
            .collect();
        new_features.sort();
        new_features.dedup();

        let drift = &self.config.drift;
        let drift_detected =
            mean_distance > drift.mean_threshold || std_distance > drift.std_threshold;

        if drift_detected {
            info!(
                mean_distance,
                std_distance,
                batch_size = batch.len(),
                "feature drift detected"
            );
        }

        Ok(DriftReport {
            drift_detected,
            mean_distance,
            std_distance,
            mean_threshold: drift.mean_threshold,
            std_threshold: drift.std_threshold,
            batch_size: batch.len(),
            new_features,
        })
    }

    /// Detect drift on a labeled batch and, when present, fold the batch
    /// into the training pool and retrain. Without drift this changes
    /// nothing and returns the current state (idempotent).
    pub fn adapt(&self, batch: &[TrainingExample]) -> Result<AdaptationResult, ScoringError> {
        let records: Vec<FeatureRecord> = batch.iter().map(|e| e.record.clone()).collect();
        let drift = self.detect_drift(&records)?;
        let accuracy_before = self.mean_model_accuracy();

        if !drift.drift_detected {
            return Ok(AdaptationResult {
                drift,
                retrained: false,
                accuracy_before,
                accuracy_after: accuracy_before,
            });
        }

        self.import_examples(batch.to_vec());
        self.train_all()?;
        let accuracy_after = self.mean_model_accuracy();

        info!(
            accuracy_before,
            accuracy_after,
            ingested = batch.len(),
            "ensemble adapted to drift"
        );
        Ok(AdaptationResult {
            drift,
            retrained: true,
            accuracy_before,
            accuracy_after,
        })
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predictor::{CentroidPredictor, PriorPredictor};
    use verdict_core::ScorerConfig;

    fn record(price: f64, qty: f64) -> FeatureRecord {
        FeatureRecord::new("x").with("price", price).with("qty", qty)
    }

    /// price ~ N-ish around 100±sd 12, qty around 10±1.2, half fraud.
    fn trained_scorer() -> EnsembleScorer {
        let scorer = EnsembleScorer::new(ScorerConfig::default());
        scorer
            .register("prior", Box::new(PriorPredictor::new()))
            .unwrap();
        scorer
            .register("centroid", Box::new(CentroidPredictor::new()))
            .unwrap();
        for i in 0..20 {
            let spread = (i as f64) - 9.5;
            scorer.add_training_example(record(100.0 + spread * 2.0, 10.0 + spread * 0.2), i % 2 == 0);
        }
        scorer.train_all().unwrap();
        scorer
    }

    fn batch_like_training() -> Vec<FeatureRecord> {
        (0..20)
            .map(|i| {
                let spread = (i as f64) - 9.5;
                record(100.0 + spread * 2.0 + 0.01, 10.0 + spread * 0.2)
            })
            .collect()
    }

    #[test]
    fn identical_distribution_is_not_drift() {
        let scorer = trained_scorer();
        let report = scorer.detect_drift(&batch_like_training()).unwrap();

        assert!(!report.drift_detected, "report: {:?}", report);
        assert!(report.mean_distance < 0.5);
        assert!(report.new_features.is_empty());
    }

    #[test]
    fn five_sigma_shift_is_drift() {
        let scorer = trained_scorer();
        // Training price std is ~11.5; shift every price by 5 of them.
        let shifted: Vec<FeatureRecord> = batch_like_training()
            .into_iter()
            .map(|r| {
                let price = r.numeric_features()["price"] + 5.0 * 11.5;
                record(price, r.numeric_features()["qty"])
            })
            .collect();

        let report = scorer.detect_drift(&shifted).unwrap();
        assert!(report.drift_detected);
        assert!(report.mean_distance > report.mean_threshold);
    }

    #[test]
    fn small_batches_are_insufficient_not_clean() {
        let scorer = trained_scorer();
        let batch: Vec<FeatureRecord> = batch_like_training().into_iter().take(9).collect();
        assert!(matches!(
            scorer.detect_drift(&batch),
            Err(ScoringError::InsufficientData { got: 9, .. })
        ));
    }

    #[test]
    fn drift_before_training_is_not_trained() {
        let scorer = EnsembleScorer::new(ScorerConfig::default());
        assert!(matches!(
            scorer.detect_drift(&batch_like_training()),
            Err(ScoringError::NotTrained)
        ));
    }

    #[test]
    fn unseen_features_are_reported() {
        let scorer = trained_scorer();
        let batch: Vec<FeatureRecord> = (0..15)
            .map(|i| {
                let spread = (i as f64) - 7.0;
                FeatureRecord::new("y")
                    .with("price", 100.0 + spread * 2.0)
                    .with("qty", 10.0 + spread * 0.2)
                    .with("freight_cost", 7.5 + spread)
            })
            .collect();

        let report = scorer.detect_drift(&batch).unwrap();
        assert_eq!(report.new_features, vec!["freight_cost"]);
    }

    #[test]
    fn adaptation_without_drift_is_a_no_op() {
        let scorer = trained_scorer();
        let pool_before = scorer.example_count();
        let batch: Vec<TrainingExample> = batch_like_training()
            .into_iter()
            .enumerate()
            .map(|(i, r)| TrainingExample::new(r, i % 2 == 0))
            .collect();

        let result = scorer.adapt(&batch).unwrap();
        assert!(!result.retrained);
        assert_eq!(result.accuracy_delta(), 0.0);
        assert_eq!(scorer.example_count(), pool_before);
    }

    #[test]
    fn adaptation_on_drift_ingests_and_retrains() {
        let scorer = trained_scorer();
        let pool_before = scorer.example_count();
        let batch: Vec<TrainingExample> = (0..20)
            .map(|i| {
                let spread = (i as f64) - 9.5;
                TrainingExample::new(
                    record(500.0 + spread * 2.0, 10.0 + spread * 0.2),
                    i % 2 == 0,
                )
            })
            .collect();

        let result = scorer.adapt(&batch).unwrap();
        assert!(result.drift.drift_detected);
        assert!(result.retrained);
        assert_eq!(scorer.example_count(), pool_before + 20);

        // The batch is folded into the baseline, so the same batch now
        // sits much closer to the training distribution.
        let records: Vec<FeatureRecord> = batch.iter().map(|e| e.record.clone()).collect();
        let again = scorer.detect_drift(&records).unwrap();
        assert!(again.mean_distance < result.drift.mean_distance / 1.5);
    }

    #[test]
    fn feature_stats_align_missing_features_to_baseline() {
        let records = vec![record(10.0, 1.0), record(20.0, 3.0)];
        let stats = FeatureStats::from_records(records.iter());
        assert_eq!(stats.feature_names, vec!["price", "qty"]);
        assert_eq!(stats.means, vec![15.0, 2.0]);

        // Batch lacking qty entirely: qty contributes zero distance.
        let batch = vec![
            FeatureRecord::new("a").with("price", 15.0),
            FeatureRecord::new("b").with("price", 15.0),
        ];
        let (means, stds) = stats.aligned_stats(&batch);
        assert_eq!(means[1], stats.means[1]);
        assert_eq!(stds[1], stats.stds[1]);
        assert_eq!(means[0], 15.0);
    }
}

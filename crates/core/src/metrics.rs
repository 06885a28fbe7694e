//! Binary-classification metrics shared by the scorer and the calibrator.
//!
//! Conventions:
//! - Undefined ratios (no predicted positives, no actual positives) resolve
//!   to 0.0 rather than NaN, so downstream weighting never has to guard.
//! - `percentile` uses linear interpolation between closest ranks.

use serde::{Deserialize, Serialize};

/// Raw confusion-matrix counts for a boolean classification task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionCounts {
    pub true_positives: usize,
    pub false_positives: usize,
    pub true_negatives: usize,
    pub false_negatives: usize,
}

impl ConfusionCounts {
    /// Tally counts from aligned label/prediction slices.
    pub fn from_pairs(labels: &[bool], predictions: &[bool]) -> Self {
        debug_assert_eq!(labels.len(), predictions.len());
        let mut counts = Self::default();
        for (&actual, &predicted) in labels.iter().zip(predictions) {
            match (actual, predicted) {
                (true, true) => counts.true_positives += 1,
                (false, true) => counts.false_positives += 1,
                (false, false) => counts.true_negatives += 1,
                (true, false) => counts.false_negatives += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.true_positives + self.false_positives + self.true_negatives + self.false_negatives
    }

    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        (self.true_positives + self.true_negatives) as f64 / total as f64
    }

    pub fn precision(&self) -> f64 {
        let predicted_positive = self.true_positives + self.false_positives;
        if predicted_positive == 0 {
            return 0.0;
        }
        self.true_positives as f64 / predicted_positive as f64
    }

    pub fn recall(&self) -> f64 {
        let actual_positive = self.true_positives + self.false_negatives;
        if actual_positive == 0 {
            return 0.0;
        }
        self.true_positives as f64 / actual_positive as f64
    }

    /// True-positive rate; alias of recall, kept for ROC readability.
    pub fn tpr(&self) -> f64 {
        self.recall()
    }

    /// False-positive rate over actual negatives (0.0 when there are none).
    pub fn fpr(&self) -> f64 {
        let actual_negative = self.false_positives + self.true_negatives;
        if actual_negative == 0 {
            return 0.0;
        }
        self.false_positives as f64 / actual_negative as f64
    }

    pub fn f1(&self) -> f64 {
        let p = self.precision();
        let r = self.recall();
        if p + r == 0.0 {
            return 0.0;
        }
        2.0 * p * r / (p + r)
    }

    pub fn metrics(&self) -> ClassificationMetrics {
        ClassificationMetrics {
            accuracy: self.accuracy(),
            precision: self.precision(),
            recall: self.recall(),
            f1: self.f1(),
        }
    }
}

/// Derived metric set reported for every trained model and every calibration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

impl ClassificationMetrics {
    /// Evaluate scores against labels at a decision threshold (score > threshold).
    pub fn at_threshold(labels: &[bool], scores: &[f64], threshold: f64) -> Self {
        let predictions: Vec<bool> = scores.iter().map(|&s| s > threshold).collect();
        ConfusionCounts::from_pairs(labels, &predictions).metrics()
    }
}

/// Percentile of an unsorted sample with linear interpolation, `p` in [0, 100].
/// Empty input yields 0.0.
pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = (p / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }
    let fraction = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}

//! Decision-threshold calibration with bootstrap confidence intervals.
//!
//! Each detector accumulates labeled `(label, score)` points; calibration
//! sweeps the threshold grid `[0, 1]` in 0.01 steps, picks the optimum for
//! the requested method, and brackets it with a 95% bootstrap interval
//! (1,000 resamples by default, seeded for reproducibility). Ties on the
//! grid always resolve toward the lowest threshold, so calibration is
//! deterministic.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::RwLock;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use verdict_core::{percentile, CalibratorConfig, ClassificationMetrics, ConfusionCounts};

use crate::error::ScoringError;

/// Threshold assumed before any calibration has run.
pub const DEFAULT_THRESHOLD: f64 = 0.5;

/// Grid resolution: thresholds 0.00, 0.01, ..., 1.00.
const GRID_STEPS: usize = 100;

// ── Data types ──────────────────────────────────────────────────────

/// One labeled observation: what the detector scored vs. what was true.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabeledScore {
    pub label: bool,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationMethod {
    /// Maximize F1 on the grid.
    F1Optimization,
    /// Minimize `|precision - recall|`.
    PrecisionRecallBalance,
    /// Maximize Youden's J statistic (`TPR - FPR`).
    RocOptimization,
}

impl fmt::Display for CalibrationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalibrationMethod::F1Optimization => write!(f, "f1_optimization"),
            CalibrationMethod::PrecisionRecallBalance => write!(f, "precision_recall_balance"),
            CalibrationMethod::RocOptimization => write!(f, "roc_optimization"),
        }
    }
}

impl FromStr for CalibrationMethod {
    type Err = ScoringError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "f1_optimization" => Ok(CalibrationMethod::F1Optimization),
            "precision_recall_balance" => Ok(CalibrationMethod::PrecisionRecallBalance),
            "roc_optimization" => Ok(CalibrationMethod::RocOptimization),
            other => Err(ScoringError::UnknownMethod(other.to_string())),
        }
    }
}

/// Calibration outcome, including the metric delta a caller sees when
/// moving from the default threshold to the calibrated one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationResult {
    pub detector: String,
    pub method: CalibrationMethod,
    pub default_threshold: f64,
    pub calibrated_threshold: f64,
    /// 95% bootstrap interval; always brackets `calibrated_threshold`.
    pub ci_lower: f64,
    pub ci_upper: f64,
    pub sample_count: usize,
    /// Metrics at the default threshold.
    pub before: ClassificationMetrics,
    /// Metrics at the calibrated threshold.
    pub after: ClassificationMetrics,
}

// ── Calibrator ──────────────────────────────────────────────────────

struct CalibratorState {
    points: HashMap<String, Vec<LabeledScore>>,
    thresholds: HashMap<String, f64>,
}

pub struct ThresholdCalibrator {
    config: CalibratorConfig,
    inner: RwLock<CalibratorState>,
}

impl ThresholdCalibrator {
    pub fn new(config: CalibratorConfig) -> Self {
        Self {
            config,
            inner: RwLock::new(CalibratorState {
                points: HashMap::new(),
                thresholds: HashMap::new(),
            }),
        }
    }

    pub fn add_labeled_point(&self, detector: &str, label: bool, score: f64) {
        let mut state = self.inner.write().expect("calibrator lock poisoned");
        state
            .points
            .entry(detector.to_string())
            .or_default()
            .push(LabeledScore { label, score });
    }

    pub fn point_count(&self, detector: &str) -> usize {
        let state = self.inner.read().expect("calibrator lock poisoned");
        state.points.get(detector).map_or(0, Vec::len)
    }

    /// Calibrated threshold for a detector, if one has been computed.
    pub fn threshold_for(&self, detector: &str) -> Option<f64> {
        let state = self.inner.read().expect("calibrator lock poisoned");
        state.thresholds.get(detector).copied()
    }

    /// Calibrate one detector. The heavy bootstrap runs outside the lock;
    /// only the final threshold insert takes the writer.
    pub fn calibrate(
        &self,
        detector: &str,
        method: CalibrationMethod,
    ) -> Result<CalibrationResult, ScoringError> {
        let points = {
            let state = self.inner.read().expect("calibrator lock poisoned");
            state.points.get(detector).cloned().unwrap_or_default()
        };
        if points.len() < self.config.min_samples {
            return Err(ScoringError::InsufficientData {
                context: "calibration",
                needed: self.config.min_samples,
                got: points.len(),
            });
        }

        let calibrated = select_threshold(&points, method);
        let (ci_lower, ci_upper) = self.bootstrap_interval(&points, method, calibrated);

        let labels: Vec<bool> = points.iter().map(|p| p.label).collect();
        let scores: Vec<f64> = points.iter().map(|p| p.score).collect();
        let before = ClassificationMetrics::at_threshold(&labels, &scores, DEFAULT_THRESHOLD);
        let after = ClassificationMetrics::at_threshold(&labels, &scores, calibrated);

        {
            let mut state = self.inner.write().expect("calibrator lock poisoned");
            state.thresholds.insert(detector.to_string(), calibrated);
        }

        info!(
            detector,
            method = %method,
            calibrated,
            ci_lower,
            ci_upper,
            samples = points.len(),
            "threshold calibrated"
        );

        Ok(CalibrationResult {
            detector: detector.to_string(),
            method,
            default_threshold: DEFAULT_THRESHOLD,
            calibrated_threshold: calibrated,
            ci_lower,
            ci_upper,
            sample_count: points.len(),
            before,
            after,
        })
    }

    /// Calibrate every known detector, skipping the ones that do not yet
    /// have enough points (logged, not fatal).
    pub fn calibrate_all(
        &self,
        method: CalibrationMethod,
    ) -> BTreeMap<String, CalibrationResult> {
        let detectors: Vec<String> = {
            let state = self.inner.read().expect("calibrator lock poisoned");
            state.points.keys().cloned().collect()
        };

        let mut results = BTreeMap::new();
        for detector in detectors {
            match self.calibrate(&detector, method) {
                Ok(result) => {
                    results.insert(detector, result);
                }
                Err(e) => {
                    warn!(detector = %detector, error = %e, "skipping calibration");
                }
            }
        }
        results
    }

    /// 95% bootstrap CI: resample the points with replacement, re-run the
    /// threshold selection per resample, take the 2.5/97.5 percentiles.
    /// The interval is widened if needed so it always brackets the point
    /// estimate.
    fn bootstrap_interval(
        &self,
        points: &[LabeledScore],
        method: CalibrationMethod,
        calibrated: f64,
    ) -> (f64, f64) {
        let n = points.len();
        let seed = self.config.bootstrap_seed;

        let estimates: Vec<f64> = (0..self.config.bootstrap_resamples)
            .into_par_iter()
            .map(|i| {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(i as u64));
                let resample: Vec<LabeledScore> =
                    (0..n).map(|_| points[rng.gen_range(0..n)]).collect();
                select_threshold(&resample, method)
            })
            .collect();

        let lower = percentile(&estimates, 2.5).min(calibrated);
        let upper = percentile(&estimates, 97.5).max(calibrated);
        (lower, upper)
    }

    // ── Export / restore (snapshots) ────────────────────────────────

    pub fn export_points(&self) -> BTreeMap<String, Vec<LabeledScore>> {
        let state = self.inner.read().expect("calibrator lock poisoned");
        state
            .points
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn export_thresholds(&self) -> BTreeMap<String, f64> {
        let state = self.inner.read().expect("calibrator lock poisoned");
        state.thresholds.iter().map(|(k, &v)| (k.clone(), v)).collect()
    }

    /// Replace all state with exported data.
    pub fn restore(
        &self,
        points: BTreeMap<String, Vec<LabeledScore>>,
        thresholds: BTreeMap<String, f64>,
    ) {
        let mut state = self.inner.write().expect("calibrator lock poisoned");
        state.points = points.into_iter().collect();
        state.thresholds = thresholds.into_iter().collect();
    }
}

// ── Threshold selection ─────────────────────────────────────────────

/// Sweep the grid and return the best threshold for the method. Strictly
/// better wins, so ties resolve toward the lowest candidate.
fn select_threshold(points: &[LabeledScore], method: CalibrationMethod) -> f64 {
    let labels: Vec<bool> = points.iter().map(|p| p.label).collect();

    let mut best_threshold = 0.0;
    let mut best_objective = f64::NEG_INFINITY;

    for step in 0..=GRID_STEPS {
        let threshold = step as f64 / GRID_STEPS as f64;
        let predictions: Vec<bool> = points.iter().map(|p| p.score > threshold).collect();
        let counts = ConfusionCounts::from_pairs(&labels, &predictions);

        let objective = match method {
            CalibrationMethod::F1Optimization => counts.f1(),
            CalibrationMethod::PrecisionRecallBalance => {
                -(counts.precision() - counts.recall()).abs()
            }
            CalibrationMethod::RocOptimization => counts.tpr() - counts.fpr(),
        };

        if objective > best_objective {
            best_objective = objective;
            best_threshold = threshold;
        }
    }

    best_threshold
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// Nine evenly spaced scores 0.1..0.9, negatives strictly below 0.5.
    fn boundary_points() -> Vec<(bool, f64)> {
        (1..=9)
            .map(|i| {
                let score = i as f64 / 10.0;
                (score >= 0.5, score)
            })
            .collect()
    }

    fn calibrator_with(points: &[(bool, f64)], min_samples: usize) -> ThresholdCalibrator {
        let calibrator = ThresholdCalibrator::new(CalibratorConfig {
            min_samples,
            bootstrap_resamples: 200,
            bootstrap_seed: 42,
        });
        for &(label, score) in points {
            calibrator.add_labeled_point("ncm", label, score);
        }
        calibrator
    }

    #[test]
    fn f1_optimization_lands_at_the_class_boundary() {
        let calibrator = calibrator_with(&boundary_points(), 9);
        let result = calibrator
            .calibrate("ncm", CalibrationMethod::F1Optimization)
            .unwrap();

        // Perfect separation is reachable from 0.40 up to 0.49; the tie
        // break picks the lowest grid point.
        assert!((result.calibrated_threshold - 0.40).abs() < 1e-9);
        assert_eq!(result.after.f1, 1.0);
        assert_eq!(result.sample_count, 9);
        assert_eq!(calibrator.threshold_for("ncm"), Some(result.calibrated_threshold));
    }

    #[test]
    fn all_methods_agree_on_cleanly_separable_data() {
        for method in [
            CalibrationMethod::F1Optimization,
            CalibrationMethod::PrecisionRecallBalance,
            CalibrationMethod::RocOptimization,
        ] {
            let calibrator = calibrator_with(&boundary_points(), 9);
            let result = calibrator.calibrate("ncm", method).unwrap();
            assert!(
                (result.calibrated_threshold - 0.40).abs() < 1e-9,
                "{} picked {}",
                method,
                result.calibrated_threshold
            );
        }
    }

    #[test]
    fn too_few_points_is_an_insufficient_data_error() {
        let calibrator = calibrator_with(&boundary_points(), 10);
        assert!(matches!(
            calibrator.calibrate("ncm", CalibrationMethod::F1Optimization),
            Err(ScoringError::InsufficientData { needed: 10, got: 9, .. })
        ));
        // Unknown detector: zero points, same error shape.
        assert!(matches!(
            calibrator.calibrate("other", CalibrationMethod::F1Optimization),
            Err(ScoringError::InsufficientData { got: 0, .. })
        ));
    }

    #[test]
    fn confidence_interval_brackets_the_estimate() {
        let mut points = boundary_points();
        // Add noise so resamples disagree a little.
        points.push((false, 0.55));
        points.push((true, 0.45));
        points.push((true, 0.35));
        let calibrator = calibrator_with(&points, 10);

        let result = calibrator
            .calibrate("ncm", CalibrationMethod::F1Optimization)
            .unwrap();
        assert!(0.0 <= result.ci_lower);
        assert!(result.ci_lower <= result.calibrated_threshold);
        assert!(result.calibrated_threshold <= result.ci_upper);
        assert!(result.ci_upper <= 1.0);
    }

    #[test]
    fn calibration_is_reproducible_under_a_fixed_seed() {
        let points: Vec<(bool, f64)> = (0..40)
            .map(|i| (i % 3 == 0, (i as f64 * 7.0 % 11.0) / 11.0))
            .collect();

        let a = calibrator_with(&points, 10)
            .calibrate("ncm", CalibrationMethod::F1Optimization)
            .unwrap();
        let b = calibrator_with(&points, 10)
            .calibrate("ncm", CalibrationMethod::F1Optimization)
            .unwrap();

        assert_eq!(a.calibrated_threshold, b.calibrated_threshold);
        assert_eq!(a.ci_lower, b.ci_lower);
        assert_eq!(a.ci_upper, b.ci_upper);
    }

    #[test]
    fn ties_break_toward_the_lowest_threshold() {
        // Perfect F1 on the whole plateau [0.20, 0.79].
        let points: Vec<(bool, f64)> = (0..5)
            .map(|_| (false, 0.2))
            .chain((0..5).map(|_| (true, 0.8)))
            .collect();
        let calibrator = calibrator_with(&points, 10);

        let result = calibrator
            .calibrate("ncm", CalibrationMethod::F1Optimization)
            .unwrap();
        assert!((result.calibrated_threshold - 0.20).abs() < 1e-9);
    }

    #[test]
    fn roc_threshold_maximizes_youden_on_the_grid() {
        let points: Vec<(bool, f64)> = vec![
            (false, 0.1),
            (false, 0.3),
            (false, 0.45),
            (false, 0.2),
            (false, 0.6),
            (true, 0.4),
            (true, 0.55),
            (true, 0.7),
            (true, 0.8),
            (true, 0.9),
        ];
        let calibrator = calibrator_with(&points, 10);
        let result = calibrator
            .calibrate("ncm", CalibrationMethod::RocOptimization)
            .unwrap();

        let labels: Vec<bool> = points.iter().map(|&(l, _)| l).collect();
        let chosen = {
            let predictions: Vec<bool> = points
                .iter()
                .map(|&(_, s)| s > result.calibrated_threshold)
                .collect();
            let c = ConfusionCounts::from_pairs(&labels, &predictions);
            c.tpr() - c.fpr()
        };
        for step in 0..=100 {
            let t = step as f64 / 100.0;
            let predictions: Vec<bool> = points.iter().map(|&(_, s)| s > t).collect();
            let c = ConfusionCounts::from_pairs(&labels, &predictions);
            assert!(c.tpr() - c.fpr() <= chosen + 1e-12);
        }
    }

    #[test]
    fn before_and_after_metrics_show_the_delta() {
        // Scores all sit low, so the default 0.5 threshold misses every
        // positive and calibration must move down.
        let points: Vec<(bool, f64)> = vec![
            (false, 0.05),
            (false, 0.10),
            (false, 0.12),
            (false, 0.15),
            (false, 0.18),
            (true, 0.30),
            (true, 0.32),
            (true, 0.35),
            (true, 0.38),
            (true, 0.40),
        ];
        let calibrator = calibrator_with(&points, 10);
        let result = calibrator
            .calibrate("ncm", CalibrationMethod::F1Optimization)
            .unwrap();

        assert_eq!(result.before.recall, 0.0);
        assert_eq!(result.after.f1, 1.0);
        assert!(result.calibrated_threshold < 0.3);
    }

    #[test]
    fn calibrate_all_skips_starved_detectors() {
        let calibrator = calibrator_with(&boundary_points(), 9);
        calibrator.add_labeled_point("sparse", true, 0.9);
        calibrator.add_labeled_point("sparse", false, 0.1);

        let results = calibrator.calibrate_all(CalibrationMethod::F1Optimization);
        assert!(results.contains_key("ncm"));
        assert!(!results.contains_key("sparse"));
    }

    #[test]
    fn method_names_round_trip() {
        for method in [
            CalibrationMethod::F1Optimization,
            CalibrationMethod::PrecisionRecallBalance,
            CalibrationMethod::RocOptimization,
        ] {
            assert_eq!(method.to_string().parse::<CalibrationMethod>().unwrap(), method);
        }
        assert!(matches!(
            "gradient_descent".parse::<CalibrationMethod>(),
            Err(ScoringError::UnknownMethod(_))
        ));
    }

    #[test]
    fn export_restore_round_trip() {
        let calibrator = calibrator_with(&boundary_points(), 9);
        calibrator
            .calibrate("ncm", CalibrationMethod::F1Optimization)
            .unwrap();

        let fresh = ThresholdCalibrator::new(CalibratorConfig::default());
        fresh.restore(calibrator.export_points(), calibrator.export_thresholds());

        assert_eq!(fresh.point_count("ncm"), 9);
        assert_eq!(fresh.threshold_for("ncm"), calibrator.threshold_for("ncm"));
    }
}

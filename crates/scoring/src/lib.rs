//! Ensemble fraud scoring: weighted model voting, drift detection, and
//! decision-threshold calibration.
//!
//! - [`ensemble`]: the [`EnsembleScorer`] trains every registered
//!   [`Predictor`] on a stratified split, weights the survivors by held-out
//!   F1, and combines their probabilities into one decision.
//! - [`predictor`]: the model trait plus the built-in prior and centroid
//!   families, each exportable as versioned parameters.
//! - [`drift`]: distribution-distance checks between the training baseline
//!   and incoming batches, with an adapt path that retrains on drift.
//! - [`calibrator`]: labeled-score collection and per-detector threshold
//!   sweeps with bootstrap confidence intervals.
//!
//! Model training failures are isolated: a failing model is excluded and
//! the remaining weights renormalize, so one bad fit never takes down the
//! ensemble.

pub mod calibrator;
pub mod drift;
pub mod ensemble;
pub mod error;
pub mod predictor;

pub use calibrator::{
    CalibrationMethod, CalibrationResult, LabeledScore, ThresholdCalibrator, DEFAULT_THRESHOLD,
};
pub use drift::{AdaptationResult, DriftReport, FeatureStats};
pub use ensemble::{EnsembleScorer, ModelExport, Prediction, ENSEMBLE};
pub use error::ScoringError;
pub use predictor::{CentroidPredictor, Predictor, PriorPredictor, TrainingExample};

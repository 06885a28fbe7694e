//! Error types for scoring, drift detection and calibration.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScoringError {
    /// Recoverable: the caller can retry once more data has accumulated.
    #[error("insufficient data for {context}: need at least {needed}, got {got}")]
    InsufficientData {
        context: &'static str,
        needed: usize,
        got: usize,
    },

    #[error("no models registered")]
    NoModels,

    #[error("ensemble has no trained models")]
    NotTrained,

    #[error("training failed for model '{model}': {reason}")]
    Training { model: String, reason: String },

    #[error("every registered model failed to train")]
    AllModelsFailed,

    #[error("unknown model: '{0}'")]
    UnknownModel(String),

    #[error("duplicate model name: '{0}'")]
    DuplicateModel(String),

    #[error("unknown calibration method: '{0}'")]
    UnknownMethod(String),

    #[error("invalid parameters for {family} predictor: {reason}")]
    InvalidParams { family: String, reason: String },
}

impl ScoringError {
    pub fn training(model: impl Into<String>, reason: impl Into<String>) -> Self {
        ScoringError::Training {
            model: model.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_params(family: impl Into<String>, reason: impl Into<String>) -> Self {
        ScoringError::InvalidParams {
            family: family.into(),
            reason: reason.into(),
        }
    }
}

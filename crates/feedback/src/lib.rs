//! Human-feedback learning loop.
//!
//! - [`entry`]: feedback entries and their derived learning weights.
//!   Corrections weigh more than validations, and a confident-but-wrong
//!   prediction weighs the most.
//! - [`learner`]: the [`FeedbackLearner`] store. Ingestion clusters
//!   corrections into recurring error patterns by corrected value and
//!   description overlap; recommendations and insights are recomputed on
//!   demand from the full store.
//!
//! Entries are append-only; nothing here mutates or expires feedback.

pub mod entry;
pub mod learner;

pub use entry::{FeedbackEntry, FeedbackKind};
pub use learner::{
    AccuracyTrend, FeedbackLearner, LearningInsights, LearningPattern, ModelImprovement,
};

//! Durable engine snapshots.
//!
//! A snapshot is one JSON document capturing everything needed to rebuild
//! an [`Engine`](crate::engine::Engine) in a fresh process:
//!
//! - rule definitions exactly as the catalog holds them
//! - trained model state as family/params pairs, rebuilt through a
//!   [`PredictorRegistry`](crate::registry::PredictorRegistry) rather
//!   than stored as opaque blobs
//! - accumulated training examples and the drift baseline
//! - calibration points and per-detector thresholds
//! - the feedback store, raw entries and clustered patterns alike
//!
//! Loading is two-pass: a lightweight probe reads only `version`, so a
//! format mismatch fails with [`EngineError::UnsupportedSnapshotVersion`]
//! instead of a field-level parse error deep inside the document.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use verdict_feedback::{FeedbackEntry, LearningPattern};
use verdict_rules::RuleDefinition;
use verdict_scoring::{FeatureStats, LabeledScore, ModelExport, TrainingExample};

use crate::error::EngineError;

/// Current snapshot format version. Bumped on any breaking layout change.
pub const SNAPSHOT_VERSION: u32 = 1;

/// First-pass deserializer that reads only the version header.
#[derive(Debug, Deserialize)]
struct VersionProbe {
    version: u32,
}

/// Complete serialized engine state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSnapshot {
    /// Format version, compared against [`SNAPSHOT_VERSION`] on load.
    pub version: u32,
    /// Every rule definition in the catalog, enabled or not.
    pub rules: Vec<RuleDefinition>,
    /// Per-model family/params exports for the ensemble.
    pub models: Vec<ModelExport>,
    /// Labeled training examples, so a restored engine can keep adapting.
    pub examples: Vec<TrainingExample>,
    /// Drift baseline from the last training run, if any.
    pub feature_stats: Option<FeatureStats>,
    /// Decision threshold the ensemble was using.
    pub threshold: f64,
    /// Calibration points per detector.
    pub calibration_points: BTreeMap<String, Vec<LabeledScore>>,
    /// Calibrated thresholds per detector.
    pub calibration_thresholds: BTreeMap<String, f64>,
    /// Raw feedback entries in arrival order.
    pub feedback_entries: Vec<FeedbackEntry>,
    /// Patterns already clustered from those entries.
    pub feedback_patterns: Vec<LearningPattern>,
}

impl EngineSnapshot {
    /// Serialize to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, EngineError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a snapshot, rejecting unknown versions before the full parse.
    pub fn from_json(raw: &str) -> Result<Self, EngineError> {
        let probe: VersionProbe = serde_json::from_str(raw)?;
        if probe.version != SNAPSHOT_VERSION {
            return Err(EngineError::UnsupportedSnapshotVersion {
                found: probe.version,
                supported: SNAPSHOT_VERSION,
            });
        }
        Ok(serde_json::from_str(raw)?)
    }

    /// Write the snapshot to `path` as JSON.
    pub fn save(&self, path: &Path) -> Result<(), EngineError> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Read and parse a snapshot from `path`.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let raw = fs::read_to_string(path)?;
        Self::from_json(&raw)
    }
}

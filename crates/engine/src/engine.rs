//! The engine facade.
//!
//! [`Engine`] owns one instance of every subsystem: rule catalog,
//! ensemble scorer, threshold calibrator, consensus aggregator and
//! feedback learner. All state hangs off this value, so two engines in
//! one process share nothing.
//!
//! The standard validator panel wraps the engine's own catalog and
//! scorer; callers can extend it per assessment with extra validators.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tracing::info;
use verdict_consensus::{ConsensusAggregator, ConsensusError, ConsensusResult, Validator};
use verdict_core::{EngineConfig, FeatureRecord};
use verdict_feedback::{FeedbackEntry, FeedbackKind, FeedbackLearner};
use verdict_rules::{LoadReport, RuleCatalog};
use verdict_scoring::{
    CalibrationMethod, CalibrationResult, CentroidPredictor, EnsembleScorer, PriorPredictor,
    ScoringError, ThresholdCalibrator, ENSEMBLE,
};

use crate::error::EngineError;
use crate::registry::PredictorRegistry;
use crate::snapshot::{EngineSnapshot, SNAPSHOT_VERSION};
use crate::validators::{EnsembleValidator, RuleCatalogValidator};

pub struct Engine {
    config: EngineConfig,
    catalog: Arc<RuleCatalog>,
    scorer: Arc<EnsembleScorer>,
    calibrator: ThresholdCalibrator,
    aggregator: ConsensusAggregator,
    learner: FeedbackLearner,
    validators: Vec<Arc<dyn Validator>>,
}

impl Engine {
    /// Engine with an empty rule catalog and the standard model pair.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_catalog(config, RuleCatalog::new())
    }

    /// Engine over an already-built catalog.
    pub fn with_catalog(config: EngineConfig, catalog: RuleCatalog) -> Self {
        let engine = Self::bare(config, catalog);
        engine
            .scorer
            .register(PriorPredictor::FAMILY, Box::new(PriorPredictor::new()))
            .expect("duplicate prior model in fresh scorer");
        engine
            .scorer
            .register(CentroidPredictor::FAMILY, Box::new(CentroidPredictor::new()))
            .expect("duplicate centroid model in fresh scorer");
        info!(
            rules = engine.catalog.len(),
            validators = engine.validators.len(),
            "engine constructed"
        );
        engine
    }

    /// Engine with rules loaded from a directory of YAML documents.
    /// Per-file problems land in the report, not in the error.
    pub fn from_rules_dir(
        config: EngineConfig,
        dir: &Path,
    ) -> Result<(Self, LoadReport), EngineError> {
        let mut catalog = RuleCatalog::new();
        let report = catalog.load_dir(dir)?;
        Ok((Self::with_catalog(config, catalog), report))
    }

    /// All subsystems wired, no models registered yet. The snapshot path
    /// installs imported models instead of the standard pair.
    fn bare(config: EngineConfig, catalog: RuleCatalog) -> Self {
        let catalog = Arc::new(catalog);
        let scorer = Arc::new(EnsembleScorer::new(config.scorer.clone()));
        let validators: Vec<Arc<dyn Validator>> = vec![
            Arc::new(RuleCatalogValidator::new(Arc::clone(&catalog))),
            Arc::new(EnsembleValidator::new(Arc::clone(&scorer))),
        ];
        Self {
            calibrator: ThresholdCalibrator::new(config.calibrator.clone()),
            aggregator: ConsensusAggregator::new(config.consensus.clone()),
            learner: FeedbackLearner::new(),
            config,
            catalog,
            scorer,
            validators,
        }
    }

    // ── Assessment ──────────────────────────────────────────────────

    /// Run one consensus round over the standard validator panel plus
    /// any extras the caller supplies for this record.
    pub async fn assess(
        &self,
        record: &FeatureRecord,
        extra_validators: &[Arc<dyn Validator>],
    ) -> Result<ConsensusResult, ConsensusError> {
        let mut panel = self.validators.clone();
        panel.extend(extra_validators.iter().cloned());
        self.aggregator.validate(record, &panel).await
    }

    // ── Feedback and calibration ────────────────────────────────────

    /// Record reviewer feedback. The entry feeds the learner's pattern
    /// store and the calibrator's labeled pool for the ensemble detector,
    /// where a validation counts as a correct prediction.
    pub fn record_feedback(&self, entry: FeedbackEntry) {
        let label = entry.kind == FeedbackKind::Validation;
        self.calibrator
            .add_labeled_point(ENSEMBLE, label, entry.confidence);
        self.learner.ingest(entry);
    }

    /// Calibrate the ensemble's decision threshold from accumulated
    /// feedback and apply it to the scorer.
    pub fn calibrate_scorer(
        &self,
        method: CalibrationMethod,
    ) -> Result<CalibrationResult, ScoringError> {
        let result = self.calibrator.calibrate(ENSEMBLE, method)?;
        self.scorer.set_threshold(result.calibrated_threshold);
        info!(
            threshold = result.calibrated_threshold,
            method = %method,
            "scorer threshold recalibrated"
        );
        Ok(result)
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn catalog(&self) -> &RuleCatalog {
        &self.catalog
    }

    pub fn scorer(&self) -> &Arc<EnsembleScorer> {
        &self.scorer
    }

    pub fn calibrator(&self) -> &ThresholdCalibrator {
        &self.calibrator
    }

    pub fn aggregator(&self) -> &ConsensusAggregator {
        &self.aggregator
    }

    pub fn learner(&self) -> &FeedbackLearner {
        &self.learner
    }

    // ── Snapshots ───────────────────────────────────────────────────

    /// Capture the complete engine state as a serializable document.
    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            version: SNAPSHOT_VERSION,
            rules: self.catalog.definitions().to_vec(),
            models: self.scorer.export_models(),
            examples: self.scorer.export_examples(),
            feature_stats: self.scorer.export_feature_stats(),
            threshold: self.scorer.threshold(),
            calibration_points: self.calibrator.export_points(),
            calibration_thresholds: self.calibrator.export_thresholds(),
            feedback_entries: self.learner.export_entries(),
            feedback_patterns: self.learner.export_patterns(),
        }
    }

    /// Rebuild an engine from a snapshot. Predictors are reconstructed
    /// through `registry` from their family/params pairs, so restored
    /// models predict exactly what the exporting engine predicted.
    pub fn from_snapshot(
        config: EngineConfig,
        snapshot: EngineSnapshot,
        registry: &PredictorRegistry,
    ) -> Result<Self, EngineError> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(EngineError::UnsupportedSnapshotVersion {
                found: snapshot.version,
                supported: SNAPSHOT_VERSION,
            });
        }

        let catalog = RuleCatalog::from_definitions(snapshot.rules)?;
        let engine = Self::bare(config, catalog);

        let model_count = snapshot.models.len();
        for export in snapshot.models {
            let predictor = registry.load(&export.family, &export.params)?;
            engine.scorer.import_model(export, predictor)?;
        }
        engine.scorer.import_examples(snapshot.examples);
        if let Some(stats) = snapshot.feature_stats {
            engine.scorer.restore_feature_stats(stats);
        }
        engine.scorer.set_threshold(snapshot.threshold);
        engine
            .calibrator
            .restore(snapshot.calibration_points, snapshot.calibration_thresholds);
        engine
            .learner
            .restore(snapshot.feedback_entries, snapshot.feedback_patterns);

        info!(
            rules = engine.catalog.len(),
            models = model_count,
            examples = engine.scorer.example_count(),
            "engine restored from snapshot"
        );
        Ok(engine)
    }
}

// Manual impl: the validator panel holds `dyn Validator` trait objects,
// which carry no `Debug` bound.
impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("rules", &self.catalog.len())
            .field("validators", &self.validators.len())
            .finish_non_exhaustive()
    }
}

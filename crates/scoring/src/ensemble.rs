//! Weighted ensemble of binary classifiers.
//!
//! Models are registered by name, trained together on a shared example
//! pool, and combined by F1-proportional weights measured on a stratified
//! held-out split. `train_all` is one logical transaction: it holds the
//! writer lock for the whole fit/score/re-weight sequence, so concurrent
//! trainings serialize and readers never observe a half-updated weight
//! vector.
//!
//! A model whose training fails is excluded from the ensemble (weight 0)
//! and the remaining weights are renormalized; one bad model never takes
//! the scorer down.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use verdict_core::{ClassificationMetrics, ConfusionCounts, FeatureRecord, ScorerConfig};

use crate::drift::FeatureStats;
use crate::error::ScoringError;
use crate::predictor::{Predictor, TrainingExample};

/// Model name that addresses the weighted combination instead of a single
/// registered model.
pub const ENSEMBLE: &str = "ensemble";

/// Held-out fraction of the training pool used for metric estimation.
const TEST_FRACTION: f64 = 0.2;

// ── State ───────────────────────────────────────────────────────────

struct ModelHandle {
    name: String,
    predictor: Box<dyn Predictor>,
    weight: f64,
    trained_samples: usize,
    metrics: Option<ClassificationMetrics>,
    feature_importance: HashMap<String, f64>,
}

pub(crate) struct EnsembleState {
    models: Vec<ModelHandle>,
    examples: Vec<TrainingExample>,
    threshold: f64,
    pub(crate) train_stats: Option<FeatureStats>,
}

/// One ensemble decision: the boolean call plus the probability and the
/// threshold it was compared against.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Prediction {
    pub prediction: bool,
    pub probability: f64,
    pub threshold: f64,
}

/// Serializable view of one model's trained state, including the
/// family/params pair a registry needs to rebuild the predictor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelExport {
    pub name: String,
    pub family: String,
    pub params: serde_json::Value,
    pub weight: f64,
    pub trained_samples: usize,
    pub metrics: Option<ClassificationMetrics>,
    pub feature_importance: HashMap<String, f64>,
}

// ── Scorer ──────────────────────────────────────────────────────────

pub struct EnsembleScorer {
    pub(crate) config: ScorerConfig,
    pub(crate) inner: RwLock<EnsembleState>,
}

impl EnsembleScorer {
    pub fn new(config: ScorerConfig) -> Self {
        let threshold = config.default_threshold;
        Self {
            config,
            inner: RwLock::new(EnsembleState {
                models: Vec::new(),
                examples: Vec::new(),
                threshold,
                train_stats: None,
            }),
        }
    }

    /// Register a model under a unique name. Models are untrained (and
    /// excluded from predictions) until the next `train_all`.
    pub fn register(
        &self,
        name: impl Into<String>,
        predictor: Box<dyn Predictor>,
    ) -> Result<(), ScoringError> {
        let name = name.into();
        let mut state = self.inner.write().expect("scorer lock poisoned");
        if name == ENSEMBLE || state.models.iter().any(|m| m.name == name) {
            return Err(ScoringError::DuplicateModel(name));
        }
        debug!(model = %name, family = predictor.family(), "model registered");
        state.models.push(ModelHandle {
            name,
            predictor,
            weight: 0.0,
            trained_samples: 0,
            metrics: None,
            feature_importance: HashMap::new(),
        });
        Ok(())
    }

    pub fn add_training_example(&self, record: FeatureRecord, label: bool) {
        self.add_example(TrainingExample::new(record, label));
    }

    pub fn add_example(&self, example: TrainingExample) {
        let mut state = self.inner.write().expect("scorer lock poisoned");
        state.examples.push(example);
    }

    pub fn example_count(&self) -> usize {
        self.inner.read().expect("scorer lock poisoned").examples.len()
    }

    pub fn threshold(&self) -> f64 {
        self.inner.read().expect("scorer lock poisoned").threshold
    }

    /// Override the decision threshold, typically from a calibration.
    pub fn set_threshold(&self, threshold: f64) {
        let mut state = self.inner.write().expect("scorer lock poisoned");
        state.threshold = threshold.clamp(0.0, 1.0);
    }

    // ── Training ────────────────────────────────────────────────────

    /// Fit every registered model and re-weight the ensemble.
    ///
    /// The example pool is split 80/20 stratified by label (deterministic
    /// under the configured seed), each model is fitted on the training
    /// side and scored on the held-out side, and weights are assigned
    /// proportionally to held-out F1. If every F1 is zero the surviving
    /// models get uniform weights instead.
    ///
    /// Returns held-out metrics per successfully trained model.
    pub fn train_all(&self) -> Result<BTreeMap<String, ClassificationMetrics>, ScoringError> {
        let mut state = self.inner.write().expect("scorer lock poisoned");
        if state.models.is_empty() {
            return Err(ScoringError::NoModels);
        }
        if state.examples.len() < 2 {
            return Err(ScoringError::InsufficientData {
                context: "training",
                needed: 2,
                got: state.examples.len(),
            });
        }

        let (train_idx, test_idx) = stratified_split(&state.examples, self.config.split_seed);
        let train: Vec<TrainingExample> =
            train_idx.iter().map(|&i| state.examples[i].clone()).collect();
        let test: Vec<TrainingExample> =
            test_idx.iter().map(|&i| state.examples[i].clone()).collect();
        let test_labels: Vec<bool> = test.iter().map(|e| e.label).collect();

        let mut results = BTreeMap::new();
        for handle in state.models.iter_mut() {
            match handle.predictor.fit(&train) {
                Ok(()) => {
                    // Held-out evaluation at the conventional 0.5 cut; the
                    // calibrated decision threshold only applies to live
                    // predictions, not to model selection.
                    let predictions: Vec<bool> = test
                        .iter()
                        .map(|e| handle.predictor.predict_probability(&e.record) > 0.5)
                        .collect();
                    let metrics = ConfusionCounts::from_pairs(&test_labels, &predictions).metrics();
                    handle.trained_samples = train.len();
                    handle.feature_importance = handle.predictor.feature_importance();
                    handle.metrics = Some(metrics);
                    results.insert(handle.name.clone(), metrics);
                }
                Err(e) => {
                    warn!(model = %handle.name, error = %e, "model training failed, excluding from ensemble");
                    handle.trained_samples = 0;
                    handle.feature_importance.clear();
                    handle.metrics = None;
                }
            }
        }

        if results.is_empty() {
            return Err(ScoringError::AllModelsFailed);
        }

        // Re-weight over the survivors, then install the whole vector at
        // once while still holding the writer lock.
        let weights = f1_weights(&state.models);
        for (handle, weight) in state.models.iter_mut().zip(weights) {
            handle.weight = weight;
        }

        state.train_stats = Some(FeatureStats::from_records(
            state.examples.iter().map(|e| &e.record),
        ));

        info!(
            models = results.len(),
            examples = state.examples.len(),
            train = train.len(),
            test = test.len(),
            "ensemble trained"
        );
        Ok(results)
    }

    // ── Prediction ──────────────────────────────────────────────────

    /// Predict with the weighted ensemble.
    pub fn predict(&self, record: &FeatureRecord) -> Result<Prediction, ScoringError> {
        let state = self.inner.read().expect("scorer lock poisoned");
        Self::predict_ensemble(&state, record)
    }

    /// Predict with one named model, or the ensemble for [`ENSEMBLE`].
    pub fn predict_with(
        &self,
        model: &str,
        record: &FeatureRecord,
    ) -> Result<Prediction, ScoringError> {
        let state = self.inner.read().expect("scorer lock poisoned");
        if model == ENSEMBLE {
            return Self::predict_ensemble(&state, record);
        }
        let handle = state
            .models
            .iter()
            .find(|m| m.name == model)
            .ok_or_else(|| ScoringError::UnknownModel(model.to_string()))?;
        if handle.metrics.is_none() {
            return Err(ScoringError::NotTrained);
        }
        let probability = handle.predictor.predict_probability(record);
        Ok(Prediction {
            prediction: probability > state.threshold,
            probability,
            threshold: state.threshold,
        })
    }

    fn predict_ensemble(
        state: &EnsembleState,
        record: &FeatureRecord,
    ) -> Result<Prediction, ScoringError> {
        let trained: Vec<&ModelHandle> = state
            .models
            .iter()
            .filter(|m| m.metrics.is_some())
            .collect();
        if trained.is_empty() {
            return Err(ScoringError::NotTrained);
        }
        let probability: f64 = trained
            .iter()
            .map(|m| m.weight * m.predictor.predict_probability(record))
            .sum();
        Ok(Prediction {
            prediction: probability > state.threshold,
            probability,
            threshold: state.threshold,
        })
    }

    // ── Introspection & export ──────────────────────────────────────

    /// Current weight per model (zero for untrained/excluded models).
    pub fn weights(&self) -> BTreeMap<String, f64> {
        let state = self.inner.read().expect("scorer lock poisoned");
        state
            .models
            .iter()
            .map(|m| (m.name.clone(), m.weight))
            .collect()
    }

    /// Ensemble-level feature importance: per-model importances combined
    /// by ensemble weight, renormalized to sum to 1.
    pub fn feature_importance(&self) -> BTreeMap<String, f64> {
        let state = self.inner.read().expect("scorer lock poisoned");
        let mut combined: BTreeMap<String, f64> = BTreeMap::new();
        for handle in state.models.iter().filter(|m| m.metrics.is_some()) {
            for (name, &imp) in &handle.feature_importance {
                *combined.entry(name.clone()).or_default() += handle.weight * imp;
            }
        }
        let total: f64 = combined.values().sum();
        if total > 0.0 {
            for value in combined.values_mut() {
                *value /= total;
            }
        }
        combined
    }

    /// Mean held-out accuracy over trained models, 0.0 when none are.
    pub fn mean_model_accuracy(&self) -> f64 {
        let state = self.inner.read().expect("scorer lock poisoned");
        mean_accuracy(&state.models)
    }

    pub fn export_models(&self) -> Vec<ModelExport> {
        let state = self.inner.read().expect("scorer lock poisoned");
        state
            .models
            .iter()
            .map(|m| ModelExport {
                name: m.name.clone(),
                family: m.predictor.family().to_string(),
                params: m.predictor.params(),
                weight: m.weight,
                trained_samples: m.trained_samples,
                metrics: m.metrics,
                feature_importance: m.feature_importance.clone(),
            })
            .collect()
    }

    /// Install a model rebuilt from an export. The predictor must already
    /// carry its fitted parameters; weight and metrics come from the export.
    pub fn import_model(
        &self,
        export: ModelExport,
        predictor: Box<dyn Predictor>,
    ) -> Result<(), ScoringError> {
        let mut state = self.inner.write().expect("scorer lock poisoned");
        if export.name == ENSEMBLE || state.models.iter().any(|m| m.name == export.name) {
            return Err(ScoringError::DuplicateModel(export.name));
        }
        state.models.push(ModelHandle {
            name: export.name,
            predictor,
            weight: export.weight,
            trained_samples: export.trained_samples,
            metrics: export.metrics,
            feature_importance: export.feature_importance,
        });
        Ok(())
    }

    pub fn export_examples(&self) -> Vec<TrainingExample> {
        self.inner
            .read()
            .expect("scorer lock poisoned")
            .examples
            .clone()
    }

    pub fn import_examples(&self, examples: Vec<TrainingExample>) {
        let mut state = self.inner.write().expect("scorer lock poisoned");
        state.examples.extend(examples);
    }

    pub fn export_feature_stats(&self) -> Option<FeatureStats> {
        self.inner
            .read()
            .expect("scorer lock poisoned")
            .train_stats
            .clone()
    }

    pub fn restore_feature_stats(&self, stats: FeatureStats) {
        let mut state = self.inner.write().expect("scorer lock poisoned");
        state.train_stats = Some(stats);
    }
}

// ── Internal helpers ────────────────────────────────────────────────

/// Stratified 80/20 split, shuffled per class with a seeded RNG.
///
/// Classes with a single member keep it on the training side; classes with
/// two or more always contribute at least one held-out example.
fn stratified_split(examples: &[TrainingExample], seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::new();
    let mut test = Vec::new();

    for label in [true, false] {
        let mut indices: Vec<usize> = (0..examples.len())
            .filter(|&i| examples[i].label == label)
            .collect();
        if indices.is_empty() {
            continue;
        }
        indices.shuffle(&mut rng);

        let n = indices.len();
        let n_test = if n == 1 {
            0
        } else {
            (((n as f64) * TEST_FRACTION).round() as usize).clamp(1, n - 1)
        };
        test.extend_from_slice(&indices[..n_test]);
        train.extend_from_slice(&indices[n_test..]);
    }

    (train, test)
}

/// F1-proportional weights over trained models; uniform when every F1 is
/// zero; exactly 0.0 for untrained models.
fn f1_weights(models: &[ModelHandle]) -> Vec<f64> {
    let f1s: Vec<Option<f64>> = models
        .iter()
        .map(|m| m.metrics.map(|metrics| metrics.f1))
        .collect();
    let survivors = f1s.iter().flatten().count();
    let sum: f64 = f1s.iter().flatten().sum();

    f1s.iter()
        .map(|f1| match f1 {
            Some(f1) if sum > 0.0 => f1 / sum,
            Some(_) => 1.0 / survivors as f64,
            None => 0.0,
        })
        .collect()
}

fn mean_accuracy(models: &[ModelHandle]) -> f64 {
    let accuracies: Vec<f64> = models
        .iter()
        .filter_map(|m| m.metrics.map(|metrics| metrics.accuracy))
        .collect();
    if accuracies.is_empty() {
        return 0.0;
    }
    accuracies.iter().sum::<f64>() / accuracies.len() as f64
}

// ── Tests ───────────────────────────────────────────────────────────

//! Predictor reconstruction for snapshot import.

use std::collections::HashMap;

use verdict_scoring::{CentroidPredictor, Predictor, PriorPredictor, ScoringError};

use crate::error::EngineError;

type Loader = Box<dyn Fn(&serde_json::Value) -> Result<Box<dyn Predictor>, ScoringError> + Send + Sync>;

/// Maps predictor family names to loaders that rebuild fitted predictors
/// from their exported parameters. Hosts register extra families before
/// importing snapshots that contain them; an unregistered family fails the
/// whole import rather than silently dropping a model.
pub struct PredictorRegistry {
    loaders: HashMap<String, Loader>,
}

impl PredictorRegistry {
    /// Registry covering the built-in families.
    pub fn with_defaults() -> Self {
        let mut registry = Self {
            loaders: HashMap::new(),
        };
        registry.register(PriorPredictor::FAMILY, |params| {
            PriorPredictor::from_params(params).map(|p| Box::new(p) as Box<dyn Predictor>)
        });
        registry.register(CentroidPredictor::FAMILY, |params| {
            CentroidPredictor::from_params(params).map(|p| Box::new(p) as Box<dyn Predictor>)
        });
        registry
    }

    pub fn register<F>(&mut self, family: impl Into<String>, loader: F)
    where
        F: Fn(&serde_json::Value) -> Result<Box<dyn Predictor>, ScoringError> + Send + Sync + 'static,
    {
        self.loaders.insert(family.into(), Box::new(loader));
    }

    pub fn load(
        &self,
        family: &str,
        params: &serde_json::Value,
    ) -> Result<Box<dyn Predictor>, EngineError> {
        let loader = self
            .loaders
            .get(family)
            .ok_or_else(|| EngineError::UnknownPredictorFamily(family.to_string()))?;
        Ok(loader(params)?)
    }

    pub fn families(&self) -> Vec<String> {
        let mut families: Vec<String> = self.loaders.keys().cloned().collect();
        families.sort();
        families
    }
}

impl Default for PredictorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

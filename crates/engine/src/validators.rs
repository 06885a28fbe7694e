//! Standard validators adapting the rule catalog and the ensemble scorer
//! to the consensus trait. Both vote with the values [`FRAUD`] / [`LEGIT`].

use std::sync::Arc;

use async_trait::async_trait;

use verdict_consensus::{Opinion, Validator, ValidatorError};
use verdict_core::FeatureRecord;
use verdict_rules::{EvaluationContext, RuleCatalog, RuleEvaluator};
use verdict_scoring::EnsembleScorer;

pub const FRAUD: &str = "fraud";
pub const LEGIT: &str = "legit";

/// Votes [`FRAUD`] when any enabled rule triggers, at the highest adjusted
/// confidence among the triggered rules; [`LEGIT`] at full confidence when
/// the record passes the whole catalog.
pub struct RuleCatalogValidator {
    catalog: Arc<RuleCatalog>,
}

impl RuleCatalogValidator {
    pub fn new(catalog: Arc<RuleCatalog>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl Validator for RuleCatalogValidator {
    fn id(&self) -> &str {
        "rule-catalog"
    }

    async fn assess(&self, record: &FeatureRecord) -> Result<Opinion, ValidatorError> {
        let evaluation =
            RuleEvaluator::evaluate_catalog(&self.catalog, &EvaluationContext::new(record));
        if evaluation.triggered_count > 0 {
            Ok(Opinion::new(FRAUD, evaluation.max_confidence))
        } else {
            Ok(Opinion::new(LEGIT, 1.0))
        }
    }
}

/// Votes with the ensemble: [`FRAUD`] at probability `p` when the decision
/// is positive, otherwise [`LEGIT`] at `1 - p`. An untrained scorer reports
/// failure and is excluded from the vote instead of guessing.
pub struct EnsembleValidator {
    scorer: Arc<EnsembleScorer>,
}

impl EnsembleValidator {
    pub fn new(scorer: Arc<EnsembleScorer>) -> Self {
        Self { scorer }
    }
}

#[async_trait]
impl Validator for EnsembleValidator {
    fn id(&self) -> &str {
        "ensemble-scorer"
    }

    async fn assess(&self, record: &FeatureRecord) -> Result<Opinion, ValidatorError> {
        let prediction = self
            .scorer
            .predict(record)
            .map_err(|e| ValidatorError::failed(self.id(), e.to_string()))?;
        if prediction.prediction {
            Ok(Opinion::new(FRAUD, prediction.probability))
        } else {
            Ok(Opinion::new(LEGIT, 1.0 - prediction.probability))
        }
    }
}

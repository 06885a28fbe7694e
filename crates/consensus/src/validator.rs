use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use verdict_core::FeatureRecord;

use crate::error::ValidatorError;

/// One validator's answer: the value it settled on and how sure it is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opinion {
    pub value: String,
    pub confidence: f64,
}

impl Opinion {
    pub fn new(value: impl Into<String>, confidence: f64) -> Self {
        Self {
            value: value.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// An independent assessment source. Implementations wrap anything that can
/// look at a feature record and commit to a value: the rule catalog, the
/// ensemble scorer, or an external service.
///
/// `assess` runs under the aggregator's per-validator timeout; a slow or
/// failing validator is excluded from the vote, not fatal.
#[async_trait]
pub trait Validator: Send + Sync {
    fn id(&self) -> &str;

    async fn assess(&self, record: &FeatureRecord) -> Result<Opinion, ValidatorError>;
}

/// An opinion attributed to the validator that produced it, as kept in the
/// consensus result for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceOpinion {
    pub validator: String,
    pub value: String,
    pub confidence: f64,
}

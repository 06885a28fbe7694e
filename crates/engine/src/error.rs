use thiserror::Error;

use verdict_consensus::ConsensusError;
use verdict_rules::RuleError;
use verdict_scoring::ScoringError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("rule error: {0}")]
    Rule(#[from] RuleError),

    #[error("scoring error: {0}")]
    Scoring(#[from] ScoringError),

    #[error("consensus error: {0}")]
    Consensus(#[from] ConsensusError),

    #[error("snapshot IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot encoding error: {0}")]
    Snapshot(#[from] serde_json::Error),

    #[error("unsupported snapshot version {found} (this build reads version {supported})")]
    UnsupportedSnapshotVersion { found: u32, supported: u32 },

    #[error("no loader registered for predictor family '{0}'")]
    UnknownPredictorFamily(String),
}

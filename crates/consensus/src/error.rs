use thiserror::Error;

/// Failure of a single validator call. These are reported and excluded
/// from the vote, never propagated as a consensus failure.
#[derive(Debug, Error)]
pub enum ValidatorError {
    #[error("validator '{validator}' timed out after {seconds}s")]
    Timeout { validator: String, seconds: u64 },

    #[error("validator '{validator}' failed: {reason}")]
    Failed { validator: String, reason: String },
}

impl ValidatorError {
    pub fn failed(validator: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidatorError::Failed {
            validator: validator.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConsensusError {
    /// Every validator errored or timed out, so there is nothing to vote on.
    #[error("no validator produced an opinion ({attempted} attempted)")]
    NoConsensus { attempted: usize },
}

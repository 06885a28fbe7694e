use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuleError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("unknown document kind: '{0}'")]
    UnknownKind(String),

    #[error("invalid condition in rule '{rule_id}': {detail}")]
    InvalidCondition { rule_id: String, detail: String },

    #[error("duplicate rule id: '{0}'")]
    DuplicateId(String),
}

impl RuleError {
    pub fn invalid(rule_id: impl Into<String>, detail: impl Into<String>) -> Self {
        RuleError::InvalidCondition {
            rule_id: rule_id.into(),
            detail: detail.into(),
        }
    }
}

use thiserror::Error;

/// Convenience alias for `Result<T, AgentScanError>`.
pub type Result<T> = std::result::Result<T, AgentScanError>;

/// The error taxonomy from §7: every failure surfaced by the core maps
/// to exactly one of these variants.
#[derive(Error, Debug)]
pub enum AgentScanError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("agent {agent} failed: {message}")]
    AgentFailure { agent: String, message: String },

    #[error("agent {agent} timed out after {elapsed_secs:.1}s")]
    Timeout { agent: String, elapsed_secs: f64 },

    #[error("transient storage error: {0}")]
    TransientStorage(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("cancelled")]
    Cancelled,

    #[error("configuration error: {0}")]
    Configuration(#[from] config::ConfigError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// How a failure should be treated by the scheduler's retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Worth another attempt, subject to the retry budget.
    Retryable,
    /// Will not succeed on retry; fail the task immediately.
    Terminal,
}

impl AgentScanError {
    /// Classifies this error per §7: timeouts and transient storage
    /// errors retry, everything else (validation, conflict, agent
    /// failure) does not.
    pub fn classification(&self) -> Classification {
        match self {
            AgentScanError::Timeout { .. } | AgentScanError::TransientStorage(_) => {
                Classification::Retryable
            }
            _ => Classification::Terminal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.classification() == Classification::Retryable
    }
}

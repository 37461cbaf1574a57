//! Node-level error type.

use thiserror::Error;

/// Result alias used by every executor and step.
pub type NodeResult<T> = Result<T, NodeError>;

/// Errors returned by a node's `execute` method.
///
/// The step runner uses the variant to decide retry behaviour:
/// - `Transient`: the step is re-run with exponential back-off.
/// - everything else: the run is aborted immediately.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NodeError {
    /// A required configuration field is missing or malformed.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A referenced credential is missing, owned by someone else, or of the wrong type.
    #[error("credential error: {0}")]
    Credential(String),

    /// Network failure, timeout or rate limit during an external call.
    #[error("transient error: {0}")]
    Transient(String),

    /// Permanent failure of an external effect; retrying will not help.
    #[error("fatal node error: {0}")]
    Fatal(String),

    /// A transient failure outlived the retry budget.
    #[error("step '{step}' failed after {attempts} attempts: {message}")]
    RetriesExhausted {
        step: String,
        attempts: u32,
        message: String,
    },
}

impl NodeError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn credential(msg: impl Into<String>) -> Self {
        Self::Credential(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::Fatal(msg.into())
    }

    /// Whether the step substrate may re-run the failing step.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_errors_are_retryable() {
        assert!(NodeError::transient("timeout").is_retryable());
        assert!(!NodeError::configuration("no endpoint").is_retryable());
        assert!(!NodeError::credential("missing").is_retryable());
        assert!(!NodeError::fatal("404").is_retryable());
        assert!(!NodeError::RetriesExhausted {
            step: "http-request".into(),
            attempts: 4,
            message: "timeout".into(),
        }
        .is_retryable());
    }
}

// Error types for agent orchestration

use thiserror::Error;

/// Result type alias for orchestration operations
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Errors that can occur while running a turn or supervising automation
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Completion endpoint error (non-2xx, network failure, bad payload)
    #[error("Completion error: {0}")]
    Completion(String),

    /// Upstream quota exhausted; never retried
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Tool execution error
    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    /// Automation provider error
    #[error("Automation provider error: {0}")]
    Provider(String),

    /// Automation task no longer exists upstream
    #[error("Automation task expired")]
    TaskExpired,

    /// Authentication error (missing or rejected credentials)
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Validation error (missing fields, bad agent type, bad input)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Not enough credits for the requested operation
    #[error("Insufficient credits: {0}")]
    InsufficientCredits(String),

    /// A referenced row does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed data from the model or a backend
    #[error("Data error: {0}")]
    Data(String),

    /// Message store error
    #[error("Message store error: {0}")]
    Store(String),

    /// Trace persistence error
    #[error("Trace persistence error: {0}")]
    Trace(String),

    /// Handoff target is neither built-in nor a known custom agent
    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    /// Handoff chain reached the configured hop limit
    #[error("Handoff limit ({0} hops) reached")]
    HandoffLimit(usize),

    /// Handoff target already appears in the chain
    #[error("Handoff cycle detected: {0}")]
    HandoffCycle(String),

    /// Session state machine rejected a transition
    #[error("Invalid session transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl OrchestratorError {
    /// Create a completion error
    pub fn completion(msg: impl Into<String>) -> Self {
        OrchestratorError::Completion(msg.into())
    }

    /// Create a quota-exceeded error
    pub fn quota(msg: impl Into<String>) -> Self {
        OrchestratorError::QuotaExceeded(msg.into())
    }

    /// Create a tool execution error
    pub fn tool(msg: impl Into<String>) -> Self {
        OrchestratorError::ToolExecution(msg.into())
    }

    /// Create an automation provider error
    pub fn provider(msg: impl Into<String>) -> Self {
        OrchestratorError::Provider(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        OrchestratorError::Auth(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        OrchestratorError::Validation(msg.into())
    }

    /// Create an insufficient-credits error
    pub fn credits(msg: impl Into<String>) -> Self {
        OrchestratorError::InsufficientCredits(msg.into())
    }

    /// Create a not-found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        OrchestratorError::NotFound(msg.into())
    }

    /// Create a data error
    pub fn data(msg: impl Into<String>) -> Self {
        OrchestratorError::Data(msg.into())
    }

    /// Create a message store error
    pub fn store(msg: impl Into<String>) -> Self {
        OrchestratorError::Store(msg.into())
    }

    /// Create a trace persistence error
    pub fn trace(msg: impl Into<String>) -> Self {
        OrchestratorError::Trace(msg.into())
    }

    /// Whether a retry can reasonably help.
    /// Quota errors are explicitly excluded: retrying them burns the same quota.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            OrchestratorError::Completion(_) | OrchestratorError::Provider(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_is_not_retryable() {
        assert!(!OrchestratorError::quota("exceeded your current quota").is_retryable());
    }

    #[test]
    fn test_completion_is_retryable() {
        assert!(OrchestratorError::completion("connection reset").is_retryable());
    }

    #[test]
    fn test_validation_is_not_retryable() {
        assert!(!OrchestratorError::validation("missing user id").is_retryable());
        assert!(!OrchestratorError::credits("need at least 1 credit").is_retryable());
    }
}

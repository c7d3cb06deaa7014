use thiserror::Error;

/// Custom result type alias for the crate
pub type Result<T> = std::result::Result<T, AgentError>;

/// Errors surfaced by the execution core and by domain agents
#[derive(Debug, Error)]
pub enum AgentError {
    /// Agent is disabled or offline; nothing was admitted
    #[error("Agent is not available")]
    Unavailable,

    /// Input payload rejected by the agent's validator
    #[error("Validation errors: {0}")]
    Validation(String),

    /// Per-agent concurrency ceiling reached at admission
    #[error("Maximum concurrent tasks reached")]
    ConcurrencyLimit,

    /// Domain execution exceeded the configured per-task timeout
    #[error("Task execution timed out")]
    Timeout,

    /// Error raised inside a domain execution step
    #[error("{0}")]
    Execution(String),

    /// Agent failed to acquire its external resources
    #[error("Initialization failed: {0}")]
    Initialization(String),

    /// Registry lookup for an unknown agent id
    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    /// Configuration rejected by validation
    #[error("Config error: {0}")]
    Config(String),
}

impl AgentError {
    /// Creates a domain execution error with the specified message
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }

    /// Checks whether this error was produced by admission control,
    /// i.e. before the task ever reached the running state
    pub fn is_admission(&self) -> bool {
        matches!(
            self,
            Self::Unavailable | Self::Validation(_) | Self::ConcurrencyLimit
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message() {
        // The API layer matches on this exact string.
        assert_eq!(AgentError::Timeout.to_string(), "Task execution timed out");
    }

    #[test]
    fn test_is_admission() {
        assert!(AgentError::Unavailable.is_admission());
        assert!(AgentError::ConcurrencyLimit.is_admission());
        assert!(AgentError::Validation("title missing".into()).is_admission());
        assert!(!AgentError::Timeout.is_admission());
        assert!(!AgentError::execution("model refused").is_admission());
    }
}

//! Error Types

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Agent error types
#[derive(Error, Debug)]
pub enum AgentError {
    /// LLM provider error (malformed output, unexpected status)
    #[error("Provider error: {0}")]
    Provider(String),

    /// Provider unavailable or not responding
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Rate limited by the provider
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Provider call exceeded the configured timeout
    #[error("Provider timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Authentication against the provider failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Structured output did not conform to the requested schema
    #[error("Schema violation: {0}")]
    SchemaViolation(String),

    /// Tool not found in registry
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// Tool name already registered
    #[error("Duplicate tool: {0}")]
    DuplicateTool(String),

    /// Tool arguments missing or mistyped
    #[error("Argument error: {0}")]
    Argument(String),

    /// Tool execution failed
    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    /// Domain-level bad input to a tool
    #[error("Validation error: {0}")]
    Validation(String),

    /// Maximum iterations reached in the agent loop
    #[error("Maximum iterations ({0}) exceeded")]
    MaxIterationsExceeded(usize),

    /// Parse error (e.g., tool call parsing)
    #[error("Parse error: {0}")]
    Parse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl AgentError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AgentError::ProviderUnavailable(_)
                | AgentError::RateLimited(_)
                | AgentError::Timeout(_)
                | AgentError::Io(_)
        )
    }

    /// Whether the error originated at the LLM provider boundary
    pub fn is_provider_error(&self) -> bool {
        matches!(
            self,
            AgentError::Provider(_)
                | AgentError::ProviderUnavailable(_)
                | AgentError::RateLimited(_)
                | AgentError::Timeout(_)
                | AgentError::Auth(_)
        )
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            AgentError::Provider(msg) => format!("The AI service encountered an error: {}", msg),
            AgentError::ProviderUnavailable(_) => "The AI service is currently unavailable. Please try again.".into(),
            AgentError::RateLimited(_) => "The AI service is rate limiting requests. Please wait a moment.".into(),
            AgentError::Timeout(_) => "The AI service did not respond in time. Please try again.".into(),
            AgentError::Auth(_) => "Authentication with the AI service failed. Please check your credentials.".into(),
            AgentError::SchemaViolation(msg) => format!("The AI service returned data in an unexpected shape: {}", msg),
            AgentError::UnknownTool(name) => format!("The tool '{}' is not available.", name),
            AgentError::Argument(msg) => format!("Invalid tool input: {}", msg),
            AgentError::ToolExecution(msg) => format!("Tool error: {}", msg),
            AgentError::Validation(msg) => msg.clone(),
            AgentError::MaxIterationsExceeded(_) => "The request took too many steps to process. Please try a simpler input.".into(),
            _ => "An unexpected error occurred.".into(),
        }
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        AgentError::Other(err.to_string())
    }
}

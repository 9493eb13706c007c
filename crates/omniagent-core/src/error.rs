use thiserror::Error;

#[derive(Debug, Error)]
pub enum OmniError {
    // LLM errors
    #[error("LLM request failed: {0}")]
    LlmRequest(String),

    #[error("LLM streaming error: {0}")]
    LlmStream(String),

    #[error("LLM provider not supported: {0}")]
    UnsupportedProvider(String),

    #[error("LLM response parse error: {0}")]
    LlmParse(String),

    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    // Tool errors
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Tool execution failed: {tool}: {message}")]
    ToolExecution { tool: String, message: String },

    #[error("Tool timeout after {timeout_secs}s: {tool}")]
    ToolTimeout { tool: String, timeout_secs: u64 },

    #[error("Tool input validation failed: {0}")]
    ToolValidation(String),

    // Workflow errors
    #[error("Supervisor output does not map to a known node: {output:?}")]
    RoutingAmbiguity { output: String },

    #[error("Workflow exceeded max iterations ({0})")]
    IterationLimitExceeded(usize),

    #[error("Node timeout after {timeout_secs}s: {node}")]
    NodeTimeout { node: String, timeout_secs: u64 },

    #[error("Node not found in graph: {0}")]
    UnknownNode(String),

    #[error("Run cancelled")]
    Cancelled,

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // Storage errors
    #[error("Persistence error: {0}")]
    Persistence(String),

    // Gateway errors
    #[error("Gateway error: {0}")]
    Gateway(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl OmniError {
    /// Failures a sub-agent recovers from locally by reporting them to the model.
    pub fn is_tool_failure(&self) -> bool {
        matches!(
            self,
            Self::ToolNotFound(_)
                | Self::ToolExecution { .. }
                | Self::ToolTimeout { .. }
                | Self::ToolValidation(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, OmniError>;

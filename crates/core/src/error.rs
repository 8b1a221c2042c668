//! Error taxonomy.
//!
//! Backend and tool failures each get a `thiserror` enum and fold into
//! [`Error`]. The sandbox (`WorkspaceError`) and the validator
//! (`ValidationError`) define theirs next to the code that raises them.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("LLM backend error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Configuration error: {message}")]
    Config { message: String },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failures raised by an LLM backend. The orchestrator never retries these;
/// they propagate to its caller.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("backend returned HTTP {status_code}: {message}")]
    ApiError { status_code: u16, message: String },

    #[error("rate limited; retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("authentication rejected: {0}")]
    AuthenticationFailed(String),

    #[error("unknown model: {0}")]
    ModelNotFound(String),

    #[error("stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("backend not configured: {0}")]
    NotConfigured(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("network failure: {0}")]
    Network(String),

    #[error("unexpected response: {0}")]
    InvalidResponse(String),
}

/// Failures raised while executing a tool. The orchestrator records each as
/// a throttle failure and reports it back to the model.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("no tool named '{0}'")]
    NotFound(String),

    #[error("{tool_name} failed: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("{tool_name} timed out after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Sandbox violation: {0}")]
    SandboxViolation(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_shows_status() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 502,
            message: "bad gateway".into(),
        });
        assert_eq!(
            err.to_string(),
            "LLM backend error: backend returned HTTP 502: bad gateway"
        );
    }

    #[test]
    fn sandbox_violation_keeps_prefix() {
        let err = ToolError::SandboxViolation("../../etc/passwd resolves outside workspace".into());
        assert!(err.to_string().starts_with("Sandbox violation: "));
    }

    #[test]
    fn tool_errors_name_the_tool() {
        let timeout = ToolError::Timeout {
            tool_name: "ExecuteCommand".into(),
            timeout_secs: 30,
        };
        assert_eq!(timeout.to_string(), "ExecuteCommand timed out after 30s");
        assert_eq!(
            ToolError::NotFound("Teleport".into()).to_string(),
            "no tool named 'Teleport'"
        );
    }
}

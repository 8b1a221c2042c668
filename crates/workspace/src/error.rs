//! Error types for the workspace sandbox and the patch engine.

use std::path::Path;

use a2ia_core::ToolError;

/// Failures raised by [`crate::Workspace`] operations.
///
/// `Security` is never downgraded: any path that resolves outside the
/// workspace root aborts the operation that asked for it.
#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("Workspace security violation: {0}")]
    Security(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid workspace metadata: {0}")]
    Metadata(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl WorkspaceError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            return WorkspaceError::NotFound(path.display().to_string());
        }
        WorkspaceError::Io {
            path: path.display().to_string(),
            source,
        }
    }

    pub fn is_security(&self) -> bool {
        matches!(self, WorkspaceError::Security(_))
    }

    /// Convert into a tool failure attributed to `tool_name`.
    pub fn into_tool_error(self, tool_name: &str) -> ToolError {
        match self {
            WorkspaceError::Security(msg) => ToolError::SandboxViolation(msg),
            WorkspaceError::InvalidInput(msg) => ToolError::InvalidArguments(msg),
            other => ToolError::ExecutionFailed {
                tool_name: tool_name.to_string(),
                reason: other.to_string(),
            },
        }
    }
}

/// Malformed unified diff. Reported as a structured failure; the target file
/// is never touched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatchError {
    #[error("Invalid diff format: {0}")]
    InvalidFormat(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_maps_to_not_found() {
        let err = WorkspaceError::io(
            Path::new("notes.txt"),
            std::io::Error::from(std::io::ErrorKind::NotFound),
        );
        assert!(matches!(err, WorkspaceError::NotFound(_)));
    }

    #[test]
    fn security_becomes_sandbox_violation() {
        let err = WorkspaceError::Security("Path '../x' resolves outside workspace".into());
        assert!(err.is_security());
        let tool_err = err.into_tool_error("ReadFile");
        assert!(matches!(tool_err, ToolError::SandboxViolation(_)));
    }

    #[test]
    fn other_errors_name_the_tool() {
        let err = WorkspaceError::NotFound("a.txt".into()).into_tool_error("ReadFile");
        assert_eq!(err.to_string(), "ReadFile failed: Not found: a.txt");
    }
}

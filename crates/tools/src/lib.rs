//! Built-in tool implementations for A2IA.
//!
//! Every tool operates inside one [`Workspace`]: filesystem tools resolve
//! their paths through the sandbox, `PatchFile` goes through the
//! [`PatchEngine`], and `ExecuteCommand` runs with the workspace as its
//! working directory.

mod args;
pub mod file_read;
pub mod file_write;
pub mod patch;
pub mod shell;

use std::sync::Arc;

use a2ia_config::ToolsConfig;
use a2ia_core::ToolRegistry;
use a2ia_workspace::{PatchEngine, Workspace, WorkspaceError};

pub use file_read::{ListDirectoryTool, ReadFileTool};
pub use file_write::{
    AppendFileTool, DeleteFileTool, FindReplaceTool, MoveFileTool, TruncateFileTool, WriteFileTool,
};
pub use patch::PatchFileTool;
pub use shell::ExecuteCommandTool;

/// Build the registry of all built-in tools for `workspace`.
///
/// Called once at startup; the orchestrator only sees the returned registry.
pub fn default_registry(
    workspace: Arc<Workspace>,
    config: &ToolsConfig,
) -> Result<ToolRegistry, WorkspaceError> {
    let engine = Arc::new(PatchEngine::new(workspace.clone())?);

    let mut registry = ToolRegistry::new();
    registry.register(Box::new(ReadFileTool::new(workspace.clone())));
    registry.register(Box::new(WriteFileTool::new(workspace.clone())));
    registry.register(Box::new(AppendFileTool::new(workspace.clone())));
    registry.register(Box::new(TruncateFileTool::new(workspace.clone())));
    registry.register(Box::new(DeleteFileTool::new(workspace.clone())));
    registry.register(Box::new(MoveFileTool::new(workspace.clone())));
    registry.register(Box::new(ListDirectoryTool::new(workspace.clone())));
    registry.register(Box::new(FindReplaceTool::new(workspace.clone())));
    registry.register(Box::new(PatchFileTool::new(engine)));
    registry.register(Box::new(ExecuteCommandTool::new(workspace, config)));
    tracing::debug!(tools = registry.len(), "Tool registry built");
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use a2ia_core::ToolExecutor;

    #[test]
    fn registry_has_all_builtin_tools() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Arc::new(Workspace::attach(dir.path(), None).unwrap());
        let registry = default_registry(ws, &ToolsConfig::default()).unwrap();
        assert_eq!(
            registry.names(),
            vec![
                "AppendFile",
                "DeleteFile",
                "ExecuteCommand",
                "FindReplace",
                "ListDirectory",
                "MoveFile",
                "PatchFile",
                "ReadFile",
                "TruncateFile",
                "WriteFile",
            ]
        );
    }

    #[tokio::test]
    async fn registry_dispatches_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Arc::new(Workspace::attach(dir.path(), None).unwrap());
        ws.write_file("a.txt", "a").unwrap();
        let registry = default_registry(ws, &ToolsConfig::default()).unwrap();

        let mut args = serde_json::Map::new();
        args.insert("path".into(), serde_json::Value::String(".".into()));
        let result = registry.call_tool("ListDirectory", args).await.unwrap();
        assert_eq!(result["files"], serde_json::json!(["a.txt"]));
    }
}

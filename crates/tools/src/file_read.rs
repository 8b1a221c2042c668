//! Read-only filesystem tools: `ReadFile` and `ListDirectory`.

use std::sync::Arc;

use a2ia_core::{ParamType, ParameterSchema, Tool, ToolError};
use a2ia_workspace::Workspace;
use async_trait::async_trait;
use serde_json::{Map, Value, json};

use crate::args::{optional_bool, optional_str, required_str};

pub struct ReadFileTool {
    workspace: Arc<Workspace>,
}

impl ReadFileTool {
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "ReadFile"
    }

    fn description(&self) -> &str {
        "Read the contents of a file in the workspace."
    }

    fn parameters(&self) -> ParameterSchema {
        ParameterSchema::object().required_property(
            "path",
            ParamType::String,
            "File path relative to the workspace root",
        )
    }

    async fn invoke(&self, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        let path = required_str(&arguments, "path")?;
        let content = self
            .workspace
            .read_file(path)
            .map_err(|e| e.into_tool_error(self.name()))?;
        Ok(json!({ "success": true, "path": path, "content": content }))
    }
}

pub struct ListDirectoryTool {
    workspace: Arc<Workspace>,
}

impl ListDirectoryTool {
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for ListDirectoryTool {
    fn name(&self) -> &str {
        "ListDirectory"
    }

    fn description(&self) -> &str {
        "List files in a workspace directory. Directories end with '/'."
    }

    fn parameters(&self) -> ParameterSchema {
        ParameterSchema::object()
            .property(
                "path",
                ParamType::String,
                "Directory relative to the workspace root (default: root)",
            )
            .property("recursive", ParamType::Boolean, "Include nested entries")
    }

    async fn invoke(&self, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        let path = optional_str(&arguments, "path").unwrap_or(".");
        let recursive = optional_bool(&arguments, "recursive", false);
        let files = self
            .workspace
            .list_directory(path, recursive)
            .map_err(|e| e.into_tool_error(self.name()))?;
        Ok(json!({ "success": true, "path": path, "files": files }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workspace() -> (tempfile::TempDir, Arc<Workspace>) {
        let dir = tempfile::tempdir().unwrap();
        let ws = Arc::new(Workspace::attach(dir.path(), None).unwrap());
        (dir, ws)
    }

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn tool_definition() {
        let (_dir, ws) = workspace();
        let def = ReadFileTool::new(ws).to_definition();
        assert_eq!(def.name, "ReadFile");
        assert!(def.parameters.is_required("path"));
    }

    #[tokio::test]
    async fn read_existing_file() {
        let (_dir, ws) = workspace();
        ws.write_file("test.txt", "Hello, world!\n").unwrap();

        let result = ReadFileTool::new(ws)
            .invoke(args(json!({"path": "test.txt"})))
            .await
            .unwrap();
        assert_eq!(result["content"], "Hello, world!\n");
        assert_eq!(result["success"], true);
    }

    #[tokio::test]
    async fn read_outside_is_sandbox_violation() {
        let (_dir, ws) = workspace();
        let err = ReadFileTool::new(ws)
            .invoke(args(json!({"path": "../../etc/passwd"})))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::SandboxViolation(_)));
    }

    #[tokio::test]
    async fn read_missing_is_execution_failure() {
        let (_dir, ws) = workspace();
        let err = ReadFileTool::new(ws)
            .invoke(args(json!({"path": "nope.txt"})))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed { .. }));
    }

    #[tokio::test]
    async fn list_defaults_to_root() {
        let (_dir, ws) = workspace();
        ws.write_file("a.txt", "a").unwrap();
        ws.write_file("src/lib.rs", "").unwrap();

        let tool = ListDirectoryTool::new(ws);
        let flat = tool.invoke(Map::new()).await.unwrap();
        assert_eq!(flat["files"], json!(["a.txt", "src/"]));

        let deep = tool.invoke(args(json!({"path": "/", "recursive": true}))).await.unwrap();
        assert_eq!(deep["files"], json!(["a.txt", "src/", "src/lib.rs"]));
    }
}

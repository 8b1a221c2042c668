//! Mutating filesystem tools.
//!
//! `WriteFile`, `AppendFile`, `TruncateFile`, `DeleteFile`, `MoveFile` and
//! `FindReplace`. All paths go through the workspace sandbox.

use std::sync::Arc;

use a2ia_core::{ParamType, ParameterSchema, Tool, ToolError};
use a2ia_workspace::Workspace;
use async_trait::async_trait;
use serde_json::{Map, Value, json};

use crate::args::{optional_u64, required_str};

pub struct WriteFileTool {
    workspace: Arc<Workspace>,
}

impl WriteFileTool {
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "WriteFile"
    }

    fn description(&self) -> &str {
        "Write content to a file. Creates the file and parent directories if needed, overwrites if it exists."
    }

    fn parameters(&self) -> ParameterSchema {
        ParameterSchema::object()
            .required_property("path", ParamType::String, "File path relative to the workspace root")
            .required_property("content", ParamType::String, "The content to write")
    }

    async fn invoke(&self, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        let path = required_str(&arguments, "path")?;
        let content = required_str(&arguments, "content")?;
        let bytes = self
            .workspace
            .write_file(path, content)
            .map_err(|e| e.into_tool_error(self.name()))?;
        Ok(json!({ "success": true, "path": path, "bytes_written": bytes }))
    }
}

pub struct AppendFileTool {
    workspace: Arc<Workspace>,
}

impl AppendFileTool {
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for AppendFileTool {
    fn name(&self) -> &str {
        "AppendFile"
    }

    fn description(&self) -> &str {
        "Append content to the end of a file, creating it if missing."
    }

    fn parameters(&self) -> ParameterSchema {
        ParameterSchema::object()
            .required_property("path", ParamType::String, "File path relative to the workspace root")
            .required_property("content", ParamType::String, "The content to append")
    }

    async fn invoke(&self, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        let path = required_str(&arguments, "path")?;
        let content = required_str(&arguments, "content")?;
        let bytes = self
            .workspace
            .append_file(path, content)
            .map_err(|e| e.into_tool_error(self.name()))?;
        Ok(json!({ "success": true, "path": path, "bytes_appended": bytes }))
    }
}

pub struct TruncateFileTool {
    workspace: Arc<Workspace>,
}

impl TruncateFileTool {
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for TruncateFileTool {
    fn name(&self) -> &str {
        "TruncateFile"
    }

    fn description(&self) -> &str {
        "Truncate a file to the given length in bytes (default 0)."
    }

    fn parameters(&self) -> ParameterSchema {
        ParameterSchema::object()
            .required_property("path", ParamType::String, "File path relative to the workspace root")
            .property("length", ParamType::Integer, "New length in bytes")
    }

    async fn invoke(&self, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        let path = required_str(&arguments, "path")?;
        let length = optional_u64(&arguments, "length")?.unwrap_or(0);
        self.workspace
            .truncate_file(path, length)
            .map_err(|e| e.into_tool_error(self.name()))?;
        Ok(json!({ "success": true, "path": path, "length": length }))
    }
}

pub struct DeleteFileTool {
    workspace: Arc<Workspace>,
}

impl DeleteFileTool {
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for DeleteFileTool {
    fn name(&self) -> &str {
        "DeleteFile"
    }

    fn description(&self) -> &str {
        "Delete a file or directory in the workspace."
    }

    fn parameters(&self) -> ParameterSchema {
        ParameterSchema::object().required_property(
            "path",
            ParamType::String,
            "Path relative to the workspace root",
        )
    }

    async fn invoke(&self, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        let path = required_str(&arguments, "path")?;
        let deleted = self
            .workspace
            .delete_file(path)
            .map_err(|e| e.into_tool_error(self.name()))?;
        Ok(json!({ "success": true, "path": path, "deleted": deleted }))
    }
}

pub struct MoveFileTool {
    workspace: Arc<Workspace>,
}

impl MoveFileTool {
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for MoveFileTool {
    fn name(&self) -> &str {
        "MoveFile"
    }

    fn description(&self) -> &str {
        "Move or rename a file within the workspace."
    }

    fn parameters(&self) -> ParameterSchema {
        ParameterSchema::object()
            .required_property("source", ParamType::String, "Current path")
            .required_property("destination", ParamType::String, "New path")
    }

    async fn invoke(&self, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        let source = required_str(&arguments, "source")?;
        let destination = required_str(&arguments, "destination")?;
        self.workspace
            .move_file(source, destination)
            .map_err(|e| e.into_tool_error(self.name()))?;
        Ok(json!({ "success": true, "source": source, "destination": destination }))
    }
}

pub struct FindReplaceTool {
    workspace: Arc<Workspace>,
}

impl FindReplaceTool {
    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for FindReplaceTool {
    fn name(&self) -> &str {
        "FindReplace"
    }

    fn description(&self) -> &str {
        "Replace literal text in a file. Optionally limit the number of replacements."
    }

    fn parameters(&self) -> ParameterSchema {
        ParameterSchema::object()
            .required_property("path", ParamType::String, "File path relative to the workspace root")
            .required_property("find", ParamType::String, "Exact text to search for")
            .required_property("replace", ParamType::String, "Replacement text")
            .property("count", ParamType::Integer, "Maximum number of replacements")
    }

    async fn invoke(&self, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        let path = required_str(&arguments, "path")?;
        let find = required_str(&arguments, "find")?;
        let replace = required_str(&arguments, "replace")?;
        let max = optional_u64(&arguments, "count")?.map(|n| n as usize);
        let replacements = self
            .workspace
            .find_replace(path, find, replace, max)
            .map_err(|e| e.into_tool_error(self.name()))?;
        Ok(json!({ "success": true, "path": path, "replacements": replacements }))
    }
}

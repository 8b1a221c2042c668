//! `PatchFile`: apply a unified diff to one workspace file.

use std::sync::Arc;

use a2ia_core::{ParamType, ParameterSchema, Tool, ToolError};
use a2ia_workspace::PatchEngine;
use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::args::required_str;

pub struct PatchFileTool {
    engine: Arc<PatchEngine>,
}

impl PatchFileTool {
    pub fn new(engine: Arc<PatchEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Tool for PatchFileTool {
    fn name(&self) -> &str {
        "PatchFile"
    }

    fn description(&self) -> &str {
        "Apply a unified diff (with ---/+++ headers and @@ hunks) to a file. \
         The file is left unchanged if any hunk fails to apply."
    }

    fn parameters(&self) -> ParameterSchema {
        ParameterSchema::object()
            .required_property("path", ParamType::String, "File path relative to the workspace root")
            .required_property("diff", ParamType::String, "Unified diff text")
    }

    async fn invoke(&self, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        let path = required_str(&arguments, "path")?.to_string();
        let diff = required_str(&arguments, "diff")?.to_string();

        // File I/O and the per-path lock block, so keep them off the runtime.
        let engine = self.engine.clone();
        let outcome = tokio::task::spawn_blocking(move || engine.apply_patch(&path, &diff))
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.name().to_string(),
                reason: format!("patch task failed: {e}"),
            })?
            .map_err(|e| e.into_tool_error(self.name()))?;
        serde_json::to_value(outcome).map_err(|e| ToolError::ExecutionFailed {
            tool_name: self.name().to_string(),
            reason: e.to_string(),
        })
    }
}

//! Shell tool: execute a command inside the workspace.
//!
//! The working directory is resolved through the sandbox, stdin is closed,
//! and every run is bounded by a timeout. A command that outlives its
//! timeout is killed.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use a2ia_config::ToolsConfig;
use a2ia_core::{ParamType, ParameterSchema, Tool, ToolError};
use a2ia_workspace::Workspace;
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::args::{optional_str, optional_u64, required_str};

/// Execute shell commands rooted at the workspace.
pub struct ExecuteCommandTool {
    workspace: Arc<Workspace>,
    default_timeout_secs: u64,
    max_timeout_secs: u64,
}

impl ExecuteCommandTool {
    pub fn new(workspace: Arc<Workspace>, config: &ToolsConfig) -> Self {
        Self {
            workspace,
            default_timeout_secs: config.command_timeout_secs,
            max_timeout_secs: config.max_command_timeout_secs,
        }
    }

    /// Requested timeout, defaulted and capped.
    fn effective_timeout(&self, requested: Option<u64>) -> u64 {
        requested
            .filter(|t| *t > 0)
            .unwrap_or(self.default_timeout_secs)
            .min(self.max_timeout_secs)
    }
}

fn env_map(arguments: &Map<String, Value>) -> Result<HashMap<String, String>, ToolError> {
    let Some(value) = arguments.get("env") else {
        return Ok(HashMap::new());
    };
    let Some(obj) = value.as_object() else {
        if value.is_null() {
            return Ok(HashMap::new());
        }
        return Err(ToolError::InvalidArguments("'env' must be an object".into()));
    };
    Ok(obj
        .iter()
        .map(|(k, v)| {
            let v = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), v)
        })
        .collect())
}

#[async_trait]
impl Tool for ExecuteCommandTool {
    fn name(&self) -> &str {
        "ExecuteCommand"
    }

    fn description(&self) -> &str {
        "Execute a shell command in the workspace and return stdout, stderr, returncode and duration."
    }

    fn parameters(&self) -> ParameterSchema {
        ParameterSchema::object()
            .required_property("command", ParamType::String, "The shell command to execute")
            .property("timeout", ParamType::Integer, "Timeout in seconds (default 30, max 600)")
            .property("cwd", ParamType::String, "Working directory relative to the workspace root")
            .property("env", ParamType::Object, "Additional environment variables")
    }

    async fn invoke(&self, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        let command = required_str(&arguments, "command")?;
        let timeout_secs = self.effective_timeout(optional_u64(&arguments, "timeout")?);
        let work_dir = match optional_str(&arguments, "cwd") {
            Some(cwd) => self
                .workspace
                .resolve_path(cwd)
                .map_err(|e| e.into_tool_error(self.name()))?,
            None => self.workspace.root().to_path_buf(),
        };
        let env = env_map(&arguments)?;

        debug!(command = %command, cwd = %work_dir.display(), timeout_secs, "Executing shell command");

        let mut cmd = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", command]);
            c
        } else {
            let mut c = Command::new("sh");
            c.args(["-c", command]);
            c
        };
        cmd.current_dir(&work_dir)
            .envs(&env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let started = Instant::now();
        let child = cmd.spawn().map_err(|e| ToolError::ExecutionFailed {
            tool_name: self.name().to_string(),
            reason: e.to_string(),
        })?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(Duration::from_secs(timeout_secs), child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(ToolError::ExecutionFailed {
                    tool_name: self.name().to_string(),
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                warn!(command = %command, timeout_secs, "Command timed out; killed");
                return Err(ToolError::Timeout {
                    tool_name: self.name().to_string(),
                    timeout_secs,
                });
            }
        };

        let duration = (started.elapsed().as_secs_f64() * 100.0).round() / 100.0;
        let returncode = output.status.code().unwrap_or(-1);
        if returncode != 0 {
            debug!(command = %command, returncode, "Command exited non-zero");
        }

        Ok(json!({
            "stdout": String::from_utf8_lossy(&output.stdout),
            "stderr": String::from_utf8_lossy(&output.stderr),
            "returncode": returncode,
            "duration": duration,
        }))
    }
}

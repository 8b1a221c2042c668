//! Pre-execution validation of tool calls and post-execution sanity checks
//! of their results.
//!
//! `validate_call` runs its checks in a fixed order and returns the first
//! failure: unknown tool, throttled, missing required parameters, unknown
//! parameters, type mismatch. `validate_response` turns an explicit
//! `"success": false` result into a failure and otherwise collects
//! non-fatal warnings. Both feed the owned [`ToolThrottler`].

use std::collections::HashMap;

use a2ia_core::{ParamType, ParameterSchema, ToolDefinition};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::throttle::{ThrottleReason, ToolThrottler};

const MAX_LISTED_TOOLS: usize = 10;
const MAX_SUGGESTIONS: usize = 3;
const SUGGESTION_CUTOFF: f64 = 0.6;
const LARGE_RESPONSE_BYTES: usize = 100 * 1024;
const DEFAULT_WORKSPACE_SEGMENT: &str = "a2ia";

/// Why a tool call (or its result) was rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Tool '{name}' does not exist. {}", unknown_tool_hint(.available, .suggestions))]
    UnknownTool {
        name: String,
        available: Vec<String>,
        suggestions: Vec<String>,
    },

    #[error("{0}")]
    Throttled(ThrottleReason),

    #[error("Missing required parameters: {}", .0.join(", "))]
    MissingRequiredParams(Vec<String>),

    #[error("Unknown parameters: {}. Available: {}", .unknown.join(", "), .available.join(", "))]
    UnknownParams {
        unknown: Vec<String>,
        available: Vec<String>,
    },

    #[error("Parameter '{param}' should be {expected}, got {actual}")]
    TypeMismatch {
        param: String,
        expected: ParamType,
        actual: &'static str,
    },

    /// The tool ran but reported `"success": false`.
    #[error("Tool failed: {0}")]
    ToolReportedFailure(String),
}

fn unknown_tool_hint(available: &[String], suggestions: &[String]) -> String {
    let mut hint = format!("Available tools: {}.", available.join(", "));
    if !suggestions.is_empty() {
        hint.push_str(&format!(" Did you mean: {}?", suggestions.join(", ")));
    }
    hint
}

/// Validates tool calls against the registered schemas.
pub struct ToolValidator {
    /// Tool names in registration order.
    names: Vec<String>,
    schemas: HashMap<String, ParameterSchema>,
    throttler: ToolThrottler,
    workspace_segment: String,
}

impl ToolValidator {
    pub fn new(tools: &[ToolDefinition]) -> Self {
        Self {
            names: tools.iter().map(|t| t.name.clone()).collect(),
            schemas: tools
                .iter()
                .map(|t| (t.name.clone(), t.parameters.clone()))
                .collect(),
            throttler: ToolThrottler::new(),
            workspace_segment: DEFAULT_WORKSPACE_SEGMENT.to_string(),
        }
    }

    /// Segment checked by the duplicated-path heuristic (`/<seg>/<seg>/`).
    pub fn with_workspace_segment(mut self, segment: impl Into<String>) -> Self {
        self.workspace_segment = segment.into();
        self
    }

    pub fn throttler(&self) -> &ToolThrottler {
        &self.throttler
    }

    pub fn throttler_mut(&mut self) -> &mut ToolThrottler {
        &mut self.throttler
    }

    /// Record an execution failure (the executor returned an error).
    pub fn record_failure(&mut self, tool: &str) {
        self.throttler.record_call(tool, false);
    }

    pub fn validate_call(
        &mut self,
        tool: &str,
        arguments: &Map<String, Value>,
    ) -> Result<(), ValidationError> {
        let Some(schema) = self.schemas.get(tool) else {
            return Err(ValidationError::UnknownTool {
                name: tool.to_string(),
                available: self.names.iter().take(MAX_LISTED_TOOLS).cloned().collect(),
                suggestions: self.suggestions(tool),
            });
        };

        self.throttler
            .should_allow(tool)
            .map_err(ValidationError::Throttled)?;

        let missing: Vec<String> = schema
            .required
            .iter()
            .filter(|p| !arguments.contains_key(p.as_str()))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(ValidationError::MissingRequiredParams(missing));
        }

        let unknown: Vec<String> = arguments
            .keys()
            .filter(|k| !schema.properties.contains_key(k.as_str()))
            .cloned()
            .collect();
        if !unknown.is_empty() {
            return Err(ValidationError::UnknownParams {
                unknown,
                available: schema.properties.keys().cloned().collect(),
            });
        }

        for (param, value) in arguments {
            if let Some(prop) = schema.properties.get(param)
                && !prop.kind.matches(value)
            {
                return Err(ValidationError::TypeMismatch {
                    param: param.clone(),
                    expected: prop.kind,
                    actual: ParamType::name_of(value),
                });
            }
        }

        Ok(())
    }

    /// Check a tool result. Returns the non-fatal warnings on success.
    ///
    /// Always records the outcome with the throttler.
    pub fn validate_response(
        &mut self,
        result: &Value,
        tool: &str,
    ) -> Result<Vec<String>, ValidationError> {
        if let Some(obj) = result.as_object()
            && obj.get("success") == Some(&Value::Bool(false))
        {
            self.throttler.record_call(tool, false);
            let message = obj
                .get("error")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .or_else(|| obj.get("stderr").and_then(Value::as_str).filter(|s| !s.is_empty()))
                .unwrap_or("Unknown error");
            return Err(ValidationError::ToolReportedFailure(message.to_string()));
        }

        let warnings = self.sanity_check(result, tool);
        if !warnings.is_empty() {
            debug!(tool = %tool, warnings = warnings.len(), "Tool result warnings");
        }
        self.throttler.record_call(tool, true);
        Ok(warnings)
    }

    fn sanity_check(&self, result: &Value, tool: &str) -> Vec<String> {
        let mut warnings = Vec::new();

        if result.is_object() || result.is_array() {
            let size = serde_json::to_string(result).map(|s| s.len()).unwrap_or(0);
            if size > LARGE_RESPONSE_BYTES {
                warnings.push(format!(
                    "Large response ({:.1}KB). May impact context window.",
                    size as f64 / 1024.0
                ));
            }
        }

        let Some(obj) = result.as_object() else {
            return warnings;
        };

        if let Some(path) = obj.get("path").and_then(Value::as_str) {
            let seg = &self.workspace_segment;
            if path.contains(&format!("/{seg}/{seg}/")) {
                warnings.push(format!("Path contains duplicate segments: {path}"));
            }
        }

        if obj.get("success") == Some(&Value::Bool(true))
            && let Some(key) = content_field(tool)
            && obj.get(key).is_none_or(is_empty_value)
        {
            warnings.push(format!("Tool succeeded but returned no {key}"));
        }

        warnings
    }

    /// Known tool names similar to `name`, best match first.
    pub fn suggestions(&self, name: &str) -> Vec<String> {
        let mut scored: Vec<(f64, &String)> = self
            .names
            .iter()
            .map(|candidate| (similarity(name, candidate), candidate))
            .filter(|(score, _)| *score >= SUGGESTION_CUTOFF)
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored
            .into_iter()
            .take(MAX_SUGGESTIONS)
            .map(|(_, n)| n.clone())
            .collect()
    }
}

/// The field a content-bearing tool is expected to fill.
fn content_field(tool: &str) -> Option<&'static str> {
    let normalized: String = tool
        .chars()
        .filter(|c| *c != '_')
        .flat_map(char::to_lowercase)
        .collect();
    match normalized.as_str() {
        "readfile" => Some("content"),
        "grep" => Some("matches"),
        "listdirectory" => Some("files"),
        _ => None,
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Number(_) => false,
    }
}

/// Normalized similarity in `0.0..=1.0`, from Levenshtein distance.
fn similarity(a: &str, b: &str) -> f64 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(&a, &b) as f64 / longest as f64
}

fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b_chars.len()]
}

//! Orchestrator streaming events.
//!
//! `AgentStreamEvent` is what the presentation layer consumes while a turn
//! runs: provider deltas re-emitted as `content`, the tool-call lifecycle,
//! ReAct thoughts, and a terminal `done` or `error`.

use serde::{Deserialize, Serialize};

/// Events emitted by the orchestrator during a streaming turn.
///
/// - `content`      partial assistant text
/// - `thought`      ReAct reasoning delta
/// - `tool_call`    the model requested a tool
/// - `action_start` a validated call is about to execute
/// - `tool_result`  the tool returned
/// - `tool_error`   validation or execution failed
/// - `warning`      non-fatal result sanity warning
/// - `final_answer` ReAct final answer
/// - `done`         the turn is complete
/// - `error`        the LLM backend failed; the turn is aborted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentStreamEvent {
    Content { content: String },

    Thought { content: String },

    ToolCall {
        id: String,
        name: String,
        arguments: serde_json::Value,
    },

    ActionStart { id: String, name: String },

    ToolResult {
        id: String,
        name: String,
        result: serde_json::Value,
        /// False when the tool reported `"success": false`.
        success: bool,
    },

    ToolError {
        id: String,
        name: String,
        error: String,
    },

    Warning { tool: String, message: String },

    FinalAnswer { content: String },

    Done {
        content: String,
        iterations: usize,
        tool_calls_made: usize,
    },

    Error { message: String },
}

impl AgentStreamEvent {
    /// Wire name of this event kind.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Content { .. } => "content",
            Self::Thought { .. } => "thought",
            Self::ToolCall { .. } => "tool_call",
            Self::ActionStart { .. } => "action_start",
            Self::ToolResult { .. } => "tool_result",
            Self::ToolError { .. } => "tool_error",
            Self::Warning { .. } => "warning",
            Self::FinalAnswer { .. } => "final_answer",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_type_tag() {
        let event = AgentStreamEvent::ToolCall {
            id: "call_0".into(),
            name: "ListDirectory".into(),
            arguments: serde_json::json!({"path": "."}),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"tool_call""#));
        assert!(json.contains(r#""name":"ListDirectory""#));
    }

    #[test]
    fn tag_matches_event_type() {
        let events = vec![
            AgentStreamEvent::Content { content: "x".into() },
            AgentStreamEvent::ActionStart {
                id: "a".into(),
                name: "b".into(),
            },
            AgentStreamEvent::Warning {
                tool: "ReadFile".into(),
                message: "m".into(),
            },
            AgentStreamEvent::FinalAnswer { content: "4".into() },
            AgentStreamEvent::Done {
                content: "ok".into(),
                iterations: 1,
                tool_calls_made: 0,
            },
        ];
        for event in events {
            let value = serde_json::to_value(&event).unwrap();
            assert_eq!(value["type"], event.event_type());
        }
    }

    #[test]
    fn round_trips() {
        let json = r#"{"type":"tool_error","id":"c","name":"ReadFile","error":"boom"}"#;
        let event: AgentStreamEvent = serde_json::from_str(json).unwrap();
        assert_eq!(
            event,
            AgentStreamEvent::ToolError {
                id: "c".into(),
                name: "ReadFile".into(),
                error: "boom".into()
            }
        );
        assert!(!event.is_terminal());
        assert!(
            AgentStreamEvent::Error {
                message: "x".into()
            }
            .is_terminal()
        );
    }
}

//! Conversation model: roles, messages, and the append-only history.
//!
//! These are the value objects that flow through the orchestrator:
//! user input → LLM completion → tool calls → injected tool results → answer.
//!
//! History is append-only. Tool results and tool errors are injected as
//! `Role::User` messages carrying a tagged text payload, because the wrapped
//! backends do not reliably support a dedicated tool role.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who authored a message. Tool results are injected as `User`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user (and injected tool results)
    User,
    /// The model
    Assistant,
    /// System instructions
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// One entry of the history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// UUID v4
    pub id: String,

    pub role: Role,

    pub content: String,

    /// Tool calls requested by the assistant, in the order returned
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<MessageToolCall>,

    /// Creation time (UTC)
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a message with an arbitrary role.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Attach tool calls to this message.
    pub fn with_tool_calls(mut self, tool_calls: Vec<MessageToolCall>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// A tool call embedded in an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageToolCall {
    /// Backend-assigned call id
    pub id: String,

    pub name: String,

    /// Arguments, either a JSON object or a JSON-encoded string of one
    #[serde(default)]
    pub arguments: serde_json::Value,
}

/// An ordered, append-only sequence of messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,

    messages: Vec<Message>,

    pub created_at: DateTime<Utc>,

    /// Time of the last append or clear
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a message.
    pub fn push(&mut self, message: Message) {
        self.updated_at = Utc::now();
        self.messages.push(message);
    }

    /// Drop the whole history. This is the only operation that removes messages.
    pub fn clear(&mut self) {
        self.updated_at = Utc::now();
        self.messages.clear();
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Rough size in tokens, at four bytes per token.
    pub fn estimated_tokens(&self) -> usize {
        self.messages.iter().map(|m| m.content.len() / 4).sum()
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_user_message() {
        let msg = Message::user("Hello, agent!");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello, agent!");
        assert!(!msg.has_tool_calls());
    }

    #[test]
    fn conversation_appends_in_order() {
        let mut conv = Conversation::new();
        let created = conv.created_at;

        conv.push(Message::user("first"));
        conv.push(Message::assistant("second"));
        assert_eq!(conv.len(), 2);
        assert_eq!(conv.messages()[0].content, "first");
        assert_eq!(conv.last().unwrap().content, "second");
        assert!(conv.updated_at >= created);

        conv.clear();
        assert!(conv.is_empty());
    }

    #[test]
    fn role_serializes_lowercase() {
        let msg = Message::system("rules");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "system");
        assert!(json.get("tool_calls").is_none());
    }

    #[test]
    fn role_parses_from_str() {
        assert_eq!("User".parse::<Role>().unwrap(), Role::User);
        assert_eq!("assistant".parse::<Role>().unwrap(), Role::Assistant);
        assert!("tool".parse::<Role>().is_err());
    }

    #[test]
    fn tool_call_arguments_accept_string_or_object() {
        let as_string: MessageToolCall = serde_json::from_str(
            r#"{"id":"1","name":"ReadFile","arguments":"{\"path\":\"a.txt\"}"}"#,
        )
        .unwrap();
        assert!(as_string.arguments.is_string());

        let as_object: MessageToolCall = serde_json::from_str(
            r#"{"id":"1","name":"ReadFile","arguments":{"path":"a.txt"}}"#,
        )
        .unwrap();
        assert_eq!(as_object.arguments["path"], "a.txt");
    }

    #[test]
    fn conversation_token_estimate() {
        let mut conv = Conversation::new();
        // 20 chars ≈ 5 tokens
        conv.push(Message::user("12345678901234567890"));
        assert_eq!(conv.estimated_tokens(), 5);
    }
}

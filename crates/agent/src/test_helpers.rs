//! Shared test doubles for orchestrator tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use a2ia_core::{
    ChunkReceiver, Message, MessageToolCall, ParamType, ParameterSchema, Provider,
    ProviderError, ProviderRequest, ProviderResponse, StreamChunk, ToolCallDelta, ToolDefinition,
    ToolError, ToolExecutor, Usage,
};
use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

/// A provider that replays scripted completions in order and records every
/// request it receives.
///
/// Panics if more calls are made than responses provided.
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<ProviderResponse>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let next = self.responses.lock().unwrap().pop_front();
        Ok(next.expect("ScriptedProvider: no more responses"))
    }
}

/// A provider whose `stream` replays one scripted chunk list per call.
pub struct ScriptedStreamProvider {
    scripts: Mutex<VecDeque<Vec<StreamChunk>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedStreamProvider {
    pub fn new(scripts: Vec<Vec<StreamChunk>>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// One round per text, each chunked as given and closed by `done`.
    pub fn from_text_rounds(rounds: &[&[&str]]) -> Self {
        Self::new(
            rounds
                .iter()
                .map(|chunks| {
                    let mut script: Vec<StreamChunk> =
                        chunks.iter().map(|c| content_chunk(c)).collect();
                    script.push(done_chunk());
                    script
                })
                .collect(),
        )
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedStreamProvider {
    fn name(&self) -> &str {
        "scripted_stream"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        Err(ProviderError::NotConfigured(
            "ScriptedStreamProvider only streams".into(),
        ))
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .expect("ScriptedStreamProvider: no more scripts");
        let (tx, rx) = mpsc::channel(script.len() + 1);
        for chunk in script {
            tx.send(Ok(chunk)).await.unwrap();
        }
        Ok(rx)
    }
}

/// A provider whose backend is always down.
pub struct FailingProvider;

#[async_trait]
impl Provider for FailingProvider {
    fn name(&self) -> &str {
        "failing"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        Err(ProviderError::Network("connection refused".into()))
    }
}

/// An executor with canned results that counts invocations.
pub struct MockExecutor {
    definitions: Vec<ToolDefinition>,
    results: HashMap<String, Value>,
    failing: HashSet<String>,
    delay: Option<Duration>,
    calls: Mutex<Vec<(String, Map<String, Value>)>>,
}

impl MockExecutor {
    /// `ListDirectory {path?}` and `WriteFile {path, content}`.
    pub fn new() -> Self {
        Self {
            definitions: vec![
                ToolDefinition {
                    name: "ListDirectory".into(),
                    description: "List a directory".into(),
                    parameters: ParameterSchema::object()
                        .property("path", ParamType::String, "Directory path")
                        .property("recursive", ParamType::Boolean, "Recurse"),
                },
                ToolDefinition {
                    name: "WriteFile".into(),
                    description: "Write a file".into(),
                    parameters: ParameterSchema::object()
                        .required_property("path", ParamType::String, "File path")
                        .required_property("content", ParamType::String, "File content"),
                },
            ],
            results: HashMap::new(),
            failing: HashSet::new(),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_result(mut self, tool: &str, result: Value) -> Self {
        self.results.insert(tool.to_string(), result);
        self
    }

    pub fn with_failure(mut self, tool: &str) -> Self {
        self.failing.insert(tool.to_string());
        self
    }

    /// Every call sleeps this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<(String, Map<String, Value>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolExecutor for MockExecutor {
    fn list_tools(&self) -> Vec<ToolDefinition> {
        self.definitions.clone()
    }

    async fn call_tool(&self, name: &str, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        self.calls
            .lock()
            .unwrap()
            .push((name.to_string(), arguments));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.contains(name) {
            return Err(ToolError::ExecutionFailed {
                tool_name: name.to_string(),
                reason: "disk on fire".into(),
            });
        }
        Ok(self
            .results
            .get(name)
            .cloned()
            .unwrap_or_else(|| serde_json::json!({"success": true})))
    }
}

fn usage() -> Option<Usage> {
    Some(Usage {
        prompt_tokens: 10,
        completion_tokens: 5,
        total_tokens: 15,
    })
}

/// A plain text response (no tool calls).
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: usage(),
        model: "mock-model".into(),
    }
}

/// A response requesting the given tool calls.
pub fn make_tool_call_response(tool_calls: Vec<MessageToolCall>) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant("").with_tool_calls(tool_calls),
        usage: usage(),
        model: "mock-model".into(),
    }
}

/// A tool call whose arguments arrive JSON-encoded, the way backends send them.
pub fn make_tool_call(id: &str, name: &str, args: Value) -> MessageToolCall {
    MessageToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments: Value::String(args.to_string()),
    }
}

pub fn content_chunk(text: &str) -> StreamChunk {
    StreamChunk {
        content: Some(text.to_string()),
        ..Default::default()
    }
}

pub fn tool_delta_chunk(index: u32, id: Option<&str>, name: Option<&str>, args: &str) -> StreamChunk {
    StreamChunk {
        tool_calls: vec![ToolCallDelta {
            index,
            id: id.map(str::to_string),
            name: name.map(str::to_string),
            arguments: args.to_string(),
        }],
        ..Default::default()
    }
}

pub fn done_chunk() -> StreamChunk {
    StreamChunk {
        done: true,
        usage: usage(),
        ..Default::default()
    }
}

/// Drain every event currently buffered in `rx`.
pub fn drain<T>(rx: &mut mpsc::Receiver<T>) -> Vec<T> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

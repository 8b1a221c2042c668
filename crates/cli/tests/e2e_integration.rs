//! End-to-end tests for the A2IA pipeline.
//!
//! These run the real orchestrator against a real sandboxed workspace and
//! the default tool registry; only the LLM backend is scripted.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use a2ia_agent::{AgentStreamEvent, Orchestrator};
use a2ia_config::ToolsConfig;
use a2ia_core::{
    ChunkReceiver, Message, MessageToolCall, Provider, ProviderError, ProviderRequest,
    ProviderResponse, Role, StreamChunk,
};
use a2ia_tools::default_registry;
use a2ia_workspace::Workspace;
use serde_json::json;
use tokio::sync::mpsc;

// ── Scripted backends ────────────────────────────────────────────────────

/// Replays completions in order and records each request.
struct ScriptedProvider {
    responses: Mutex<VecDeque<ProviderResponse>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let next = self.responses.lock().unwrap().pop_front();
        Ok(next.expect("ScriptedProvider exhausted"))
    }
}

/// Streams one scripted text per round, chunked by the given pieces.
struct ScriptedTextStream {
    rounds: Mutex<VecDeque<Vec<String>>>,
}

impl ScriptedTextStream {
    fn new(rounds: &[&[&str]]) -> Self {
        Self {
            rounds: Mutex::new(
                rounds
                    .iter()
                    .map(|pieces| pieces.iter().map(|p| p.to_string()).collect())
                    .collect(),
            ),
        }
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedTextStream {
    fn name(&self) -> &str {
        "e2e_stream"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        Err(ProviderError::NotConfigured("stream only".into()))
    }

    async fn stream(&self, _request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        let pieces = self
            .rounds
            .lock()
            .unwrap()
            .pop_front()
            .expect("ScriptedTextStream exhausted");
        let (tx, rx) = mpsc::channel(pieces.len() + 1);
        for piece in pieces {
            tx.send(Ok(StreamChunk {
                content: Some(piece),
                ..Default::default()
            }))
            .await
            .unwrap();
        }
        tx.send(Ok(StreamChunk {
            done: true,
            ..Default::default()
        }))
        .await
        .unwrap();
        Ok(rx)
    }
}

fn text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: None,
        model: "mock".into(),
    }
}

fn tool_response(calls: Vec<MessageToolCall>) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant("").with_tool_calls(calls),
        usage: None,
        model: "mock".into(),
    }
}

fn call(id: &str, name: &str, args: serde_json::Value) -> MessageToolCall {
    MessageToolCall {
        id: id.into(),
        name: name.into(),
        arguments: serde_json::Value::String(args.to_string()),
    }
}

fn sandbox() -> (tempfile::TempDir, Arc<Workspace>) {
    let dir = tempfile::tempdir().unwrap();
    let workspace = Arc::new(Workspace::attach(dir.path(), None).unwrap());
    (dir, workspace)
}

fn orchestrator(provider: Arc<dyn Provider>, workspace: Arc<Workspace>) -> Orchestrator {
    let registry = default_registry(workspace, &ToolsConfig::default()).unwrap();
    Orchestrator::new(provider, Arc::new(registry), "mock")
}

fn user_contents(o: &Orchestrator) -> Vec<String> {
    o.messages()
        .iter()
        .filter(|m| m.role == Role::User)
        .map(|m| m.content.clone())
        .collect()
}

// ── Native tool calling ──────────────────────────────────────────────────

#[tokio::test]
async fn e2e_list_files_feeds_result_into_next_request() {
    let (_dir, workspace) = sandbox();
    workspace.write_file("a.txt", "hello").unwrap();

    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_response(vec![call("call_1", "ListDirectory", json!({"path": "."}))]),
        text_response("The workspace contains a.txt."),
    ]));
    let mut o = orchestrator(provider.clone(), workspace);
    o.add_message(Role::User, "list files");

    let reply = o.process_turn(300).await.unwrap();
    assert_eq!(reply.content, "The workspace contains a.txt.");

    let second = &provider.requests()[1];
    let tool_message = second
        .messages
        .iter()
        .find(|m| m.content.starts_with("[Tool result from ListDirectory]: "))
        .expect("tool result in history");
    assert_eq!(tool_message.role, Role::User);
    assert!(tool_message.content.contains(r#""files": ["a.txt"]"#));
    assert_eq!(second.tools.len(), 10);
}

#[cfg(unix)]
#[tokio::test]
async fn e2e_calls_run_sequentially_in_order() {
    let (_dir, workspace) = sandbox();
    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_response(vec![
            call(
                "w",
                "WriteFile",
                json!({"path": "notes/todo.txt", "content": "ship it\\n"}),
            ),
            call("r", "ExecuteCommand", json!({"command": "cat notes/todo.txt"})),
        ]),
        text_response("done"),
    ]));
    let mut o = orchestrator(provider, workspace.clone());
    o.add_message(Role::User, "write and show a todo");

    o.process_turn(300).await.unwrap();

    assert_eq!(workspace.read_file("notes/todo.txt").unwrap(), "ship it\n");
    let users = user_contents(&o);
    assert!(users[1].starts_with("[Tool result from WriteFile]: "));
    assert!(users[2].starts_with("[Tool result from ExecuteCommand]: "));
    assert!(users[2].contains(r#""stdout": "ship it\n""#));
    assert!(users[2].contains(r#""returncode": 0"#));
}

#[tokio::test]
async fn e2e_sandbox_escape_is_reported_and_turn_continues() {
    let (_dir, workspace) = sandbox();
    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_response(vec![call("r", "ReadFile", json!({"path": "../../etc/passwd"}))]),
        text_response("I cannot read that."),
    ]));
    let mut o = orchestrator(provider, workspace);
    o.add_message(Role::User, "read /etc/passwd");

    let reply = o.process_turn(300).await.unwrap();
    assert_eq!(reply.content, "I cannot read that.");
    let users = user_contents(&o);
    assert!(users[1].starts_with("[Tool error from ReadFile]: Sandbox violation"));
}

#[tokio::test]
async fn e2e_patch_applies_once_then_fails_cleanly() {
    let (_dir, workspace) = sandbox();
    workspace.write_file("a.txt", "one\ntwo\nthree\nfour\n").unwrap();
    let diff = "--- a/a.txt\n+++ b/a.txt\n@@ -1,2 +1,2 @@\n-one\n+ONE\n two\n@@ -3,2 +3,2 @@\n three\n-four\n+FOUR\n";

    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_response(vec![
            call("p1", "PatchFile", json!({"path": "a.txt", "diff": diff})),
            call("p2", "PatchFile", json!({"path": "a.txt", "diff": diff})),
        ]),
        text_response("patched"),
    ]));
    let mut o = orchestrator(provider, workspace.clone());
    o.add_message(Role::User, "patch it");

    o.process_turn(300).await.unwrap();

    assert_eq!(workspace.read_file("a.txt").unwrap(), "ONE\ntwo\nthree\nFOUR\n");
    let users = user_contents(&o);
    assert!(users[1].contains(r#""success": true"#));
    assert!(users[2].contains(r#""success": false"#));
}

#[tokio::test]
async fn e2e_repeated_failures_open_the_circuit() {
    let (_dir, workspace) = sandbox();
    let missing = |id: &str| call(id, "ReadFile", json!({"path": "missing.txt"}));
    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_response(vec![missing("1"), missing("2"), missing("3"), missing("4")]),
        text_response("giving up"),
    ]));
    let mut o = orchestrator(provider, workspace);
    o.add_message(Role::User, "read the missing file");

    o.process_turn(300).await.unwrap();

    let users = user_contents(&o);
    assert!(users[1..4].iter().all(|m| m.starts_with("[Tool error from ReadFile]: ")));
    assert!(users[4].starts_with("[Tool validation failed for ReadFile]: "));
    assert!(users[4].contains("3+ times in a row"));
    assert_eq!(o.validator().throttler().consecutive_failures("ReadFile"), 3);
}

#[tokio::test]
async fn e2e_unknown_tool_gets_suggestion() {
    let (_dir, workspace) = sandbox();
    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_response(vec![call("x", "ReadFiles", json!({"path": "a.txt"}))]),
        text_response("retrying later"),
    ]));
    let mut o = orchestrator(provider, workspace);
    o.add_message(Role::User, "read a.txt");

    o.process_turn(300).await.unwrap();
    let users = user_contents(&o);
    assert!(users[1].contains("Tool 'ReadFiles' does not exist."));
    assert!(users[1].contains("Did you mean: ReadFile"));
}

// ── ReAct ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_react_reads_file_then_answers() {
    let (_dir, workspace) = sandbox();
    workspace.write_file("motd.txt", "be kind").unwrap();

    let provider = Arc::new(ScriptedTextStream::new(&[
        &[
            "Thought: I should read the file.\n",
            "Action: ReadFile\nAction Input: {\"path\": ",
            "\"motd.txt\"}",
        ],
        &["Thought: Got it.\nAction: Final Answer\nAction Input: It says: be kind"],
    ]));
    let mut o = orchestrator(provider, workspace);
    o.add_message(Role::User, "what does motd.txt say?");
    let (tx, mut rx) = mpsc::channel(64);

    let reply = o.process_turn_react_streaming(300, &tx).await.unwrap();
    drop(tx);
    assert_eq!(reply.content, "It says: be kind");

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    assert!(events.iter().any(|e| matches!(
        e,
        AgentStreamEvent::ToolResult { name, success: true, .. } if name == "ReadFile"
    )));
    assert!(matches!(events.last(), Some(AgentStreamEvent::Done { tool_calls_made: 1, .. })));

    let users = user_contents(&o);
    assert!(users[1].starts_with("Observation: {"));
    assert!(users[1].contains(r#""content": "be kind""#));
}

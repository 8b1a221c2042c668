//! The tool-calling conversation loop.
//!
//! Each round asks the provider for a completion over the whole history. If
//! the model requests tools, every call is decoded, validated, executed in
//! order, and its outcome appended to the history as a `user` message. The
//! loop ends when a response carries no tool calls, when a ReAct response
//! reaches `Final Answer`, or when the iteration cap is hit.
//!
//! Validation and tool failures never abort a turn; they become conversation
//! content. Provider failures propagate to the caller.

use std::collections::BTreeMap;
use std::sync::Arc;

use a2ia_core::{
    Conversation, Error, Message, MessageToolCall, Provider, ProviderError, ProviderRequest,
    Role, ToolCall, ToolCallDelta, ToolDefinition, ToolError, ToolExecutor,
};
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::format::format_tool_result;
use crate::prompts::react_system_prompt;
use crate::react_parser::{ReActEvent, ReActParser, format_observation};
use crate::stream_event::AgentStreamEvent;
use crate::validator::{ToolValidator, ValidationError};

pub const DEFAULT_MAX_ITERATIONS: usize = 300;

pub const MAX_ITERATIONS_MESSAGE: &str =
    "Max tool call iterations reached. Please try a simpler request.";

type EventSender = mpsc::Sender<AgentStreamEvent>;

/// What happened to one requested tool call.
enum CallOutcome {
    /// Validation failed; the tool never ran.
    Rejected(ValidationError),
    /// The executor returned an error.
    Failed(ToolError),
    /// The tool ran. `check` is the response validation result.
    Completed {
        result: Value,
        check: Result<Vec<String>, ValidationError>,
    },
}

/// Tool-call fragments for one stream index.
#[derive(Default)]
struct PartialCall {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

impl PartialCall {
    fn absorb(&mut self, delta: ToolCallDelta) {
        if delta.id.is_some() {
            self.id = delta.id;
        }
        if let Some(name) = delta.name
            && !name.is_empty()
        {
            self.name = Some(name);
        }
        self.arguments.push_str(&delta.arguments);
    }

    fn into_call(self, index: u32) -> MessageToolCall {
        MessageToolCall {
            id: self.id.unwrap_or_else(|| format!("call_{index}")),
            name: self.name.unwrap_or_default(),
            arguments: Value::String(self.arguments),
        }
    }
}

/// Drives a conversation between a provider and a tool executor.
pub struct Orchestrator {
    provider: Arc<dyn Provider>,
    executor: Arc<dyn ToolExecutor>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    tools_enabled: bool,
    tool_definitions: Vec<ToolDefinition>,
    validator: ToolValidator,
    history: Conversation,
}

impl Orchestrator {
    /// Create an orchestrator. Tool definitions are read from the executor
    /// once, here.
    pub fn new(
        provider: Arc<dyn Provider>,
        executor: Arc<dyn ToolExecutor>,
        model: impl Into<String>,
    ) -> Self {
        let tool_definitions = executor.list_tools();
        let validator = ToolValidator::new(&tool_definitions);
        Self {
            provider,
            executor,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            tools_enabled: true,
            tool_definitions,
            validator,
            history: Conversation::new(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// When disabled, tool definitions are not sent to the model.
    pub fn with_tools_enabled(mut self, enabled: bool) -> Self {
        self.tools_enabled = enabled;
        self
    }

    pub fn with_validator(mut self, validator: ToolValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn tool_definitions(&self) -> &[ToolDefinition] {
        &self.tool_definitions
    }

    pub fn validator(&self) -> &ToolValidator {
        &self.validator
    }

    pub fn validator_mut(&mut self) -> &mut ToolValidator {
        &mut self.validator
    }

    pub fn add_message(&mut self, role: Role, content: impl Into<String>) {
        self.history.push(Message::new(role, content));
    }

    pub fn messages(&self) -> &[Message] {
        self.history.messages()
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Run one turn with plain completions and return the final assistant
    /// message.
    ///
    /// A round's assistant message and its tool results are appended together
    /// once every call has finished, so dropping this future mid-round leaves
    /// the history as it was before that round.
    pub async fn process_turn(&mut self, max_iterations: usize) -> Result<Message, Error> {
        info!(
            conversation_id = %self.history.id,
            messages = self.history.len(),
            max_iterations,
            "Processing turn"
        );

        for iteration in 1..=max_iterations {
            debug!(iteration, "Orchestrator iteration");
            let response = self.provider.complete(self.request(false)).await?;
            let mut message = response.message;

            if !message.has_tool_calls() {
                let recovered = recover_text_tool_calls(&message.content, iteration);
                if recovered.is_empty() {
                    self.history.push(message.clone());
                    info!(iterations = iteration, "Turn complete");
                    return Ok(message);
                }
                debug!(tool_count = recovered.len(), "Recovered tool calls written as text");
                message = message.with_tool_calls(recovered);
            }

            let calls = decode_calls(&message.tool_calls);
            debug!(tool_count = calls.len(), "Executing tool calls");
            let mut round = vec![message];

            for call in &calls {
                let outcome = self.execute_call(call, None).await;
                round.push(Message::user(native_result_text(&call.name, &outcome)));
            }
            self.commit_round(round);
        }

        Ok(self.iteration_limit_reached(max_iterations))
    }

    /// Run one turn over the provider's delta stream, emitting events on `tx`.
    ///
    /// Tool-call fragments are accumulated per index and only decoded after
    /// the stream's done marker. Nothing from a round is appended to the
    /// history until its stream has completed and every requested call has
    /// finished, so dropping this future never leaves an assistant tool-call
    /// message without its results.
    pub async fn process_turn_streaming(
        &mut self,
        max_iterations: usize,
        tx: &EventSender,
    ) -> Result<Message, Error> {
        info!(
            conversation_id = %self.history.id,
            messages = self.history.len(),
            max_iterations,
            "Processing streaming turn"
        );
        let mut tool_calls_made = 0;

        for iteration in 1..=max_iterations {
            debug!(iteration, "Orchestrator iteration");
            let mut rx = match self.provider.stream(self.request(true)).await {
                Ok(rx) => rx,
                Err(e) => return Err(backend_failure(e, tx).await),
            };

            let mut content = String::new();
            let mut partials: BTreeMap<u32, PartialCall> = BTreeMap::new();
            let mut finished = false;

            while let Some(chunk) = rx.recv().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => return Err(backend_failure(e, tx).await),
                };
                if let Some(text) = chunk.content
                    && !text.is_empty()
                {
                    content.push_str(&text);
                    emit(tx, AgentStreamEvent::Content { content: text }).await;
                }
                for delta in chunk.tool_calls {
                    partials.entry(delta.index).or_default().absorb(delta);
                }
                if chunk.done {
                    finished = true;
                    break;
                }
            }
            if !finished {
                let e = ProviderError::StreamInterrupted("stream ended before done marker".into());
                return Err(backend_failure(e, tx).await);
            }

            let raw_calls: Vec<MessageToolCall> = if partials.is_empty() {
                recover_text_tool_calls(&content, iteration)
            } else {
                partials
                    .into_iter()
                    .map(|(index, partial)| partial.into_call(index))
                    .collect()
            };

            if raw_calls.is_empty() {
                let message = Message::assistant(content.clone());
                self.history.push(message.clone());
                emit(
                    tx,
                    AgentStreamEvent::Done {
                        content,
                        iterations: iteration,
                        tool_calls_made,
                    },
                )
                .await;
                info!(iterations = iteration, tool_calls_made, "Turn complete");
                return Ok(message);
            }

            let calls = decode_calls(&raw_calls);
            let mut round = vec![Message::assistant(content).with_tool_calls(raw_calls)];

            for call in &calls {
                tool_calls_made += 1;
                emit(
                    tx,
                    AgentStreamEvent::ToolCall {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        arguments: Value::Object(call.arguments.clone()),
                    },
                )
                .await;
                let outcome = self.execute_call(call, Some(tx)).await;
                round.push(Message::user(native_result_text(&call.name, &outcome)));
                report_outcome(tx, call, &outcome).await;
            }
            self.commit_round(round);
        }

        let message = self.iteration_limit_reached(max_iterations);
        emit(
            tx,
            AgentStreamEvent::Done {
                content: message.content.clone(),
                iterations: max_iterations,
                tool_calls_made,
            },
        )
        .await;
        Ok(message)
    }

    /// Run one turn in the free-text ReAct protocol.
    ///
    /// The ReAct system prompt is prepended to each request but never stored
    /// in the history, and no native tool definitions are sent. A fresh
    /// parser reads each round; once it yields a tool call the rest of that
    /// stream is discarded. The raw response and its observation are then
    /// appended as an `assistant` / `user` pair.
    pub async fn process_turn_react_streaming(
        &mut self,
        max_iterations: usize,
        tx: &EventSender,
    ) -> Result<Message, Error> {
        info!(
            conversation_id = %self.history.id,
            messages = self.history.len(),
            max_iterations,
            "Processing ReAct turn"
        );
        let system = Message::system(react_system_prompt(&self.tool_definitions));
        let mut tool_calls_made = 0;

        for iteration in 1..=max_iterations {
            debug!(iteration, "ReAct iteration");
            let mut messages = Vec::with_capacity(self.history.len() + 1);
            messages.push(system.clone());
            messages.extend(self.history.messages().iter().cloned());
            let request = ProviderRequest {
                model: self.model.clone(),
                messages,
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                tools: Vec::new(),
                stream: true,
            };

            let mut rx = match self.provider.stream(request).await {
                Ok(rx) => rx,
                Err(e) => return Err(backend_failure(e, tx).await),
            };

            let mut parser = ReActParser::new();
            let mut action: Option<(String, Map<String, Value>)> = None;
            let mut answer: Option<String> = None;
            let mut finished = false;

            while let Some(chunk) = rx.recv().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => return Err(backend_failure(e, tx).await),
                };
                if let Some(text) = chunk.content.as_deref() {
                    for event in parser.feed(text) {
                        match event {
                            ReActEvent::Thought(delta) => {
                                emit(tx, AgentStreamEvent::Thought { content: delta }).await;
                            }
                            ReActEvent::ToolCall { action: name, input } => {
                                action = Some((name, input));
                            }
                            ReActEvent::FinalAnswer(text) => answer = Some(text),
                        }
                    }
                }
                if action.is_some() || chunk.done {
                    finished = true;
                    break;
                }
            }
            drop(rx);
            if !finished {
                let e = ProviderError::StreamInterrupted("stream ended before done marker".into());
                return Err(backend_failure(e, tx).await);
            }

            let raw = parser.buffer().to_string();

            let Some((name, input)) = action else {
                let answer = answer.unwrap_or_else(|| raw.trim().to_string());
                self.history.push(Message::assistant(raw));
                emit(tx, AgentStreamEvent::FinalAnswer { content: answer.clone() }).await;
                emit(
                    tx,
                    AgentStreamEvent::Done {
                        content: answer.clone(),
                        iterations: iteration,
                        tool_calls_made,
                    },
                )
                .await;
                info!(iterations = iteration, tool_calls_made, "ReAct turn complete");
                return Ok(Message::assistant(answer));
            };

            tool_calls_made += 1;
            let call = ToolCall {
                id: format!("react_{iteration}"),
                name,
                arguments: repair_arguments(input),
            };
            emit(
                tx,
                AgentStreamEvent::ToolCall {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    arguments: Value::Object(call.arguments.clone()),
                },
            )
            .await;
            let outcome = self.execute_call(&call, Some(tx)).await;
            self.commit_round(vec![
                Message::assistant(raw),
                Message::user(observation_text(&call.name, &outcome)),
            ]);
            report_outcome(tx, &call, &outcome).await;
        }

        let message = self.iteration_limit_reached(max_iterations);
        emit(
            tx,
            AgentStreamEvent::Done {
                content: message.content.clone(),
                iterations: max_iterations,
                tool_calls_made,
            },
        )
        .await;
        Ok(message)
    }

    fn request(&self, stream: bool) -> ProviderRequest {
        ProviderRequest {
            model: self.model.clone(),
            messages: self.history.messages().to_vec(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools: if self.tools_enabled {
                self.tool_definitions.clone()
            } else {
                Vec::new()
            },
            stream,
        }
    }

    /// Validate, then execute. The tool never runs unless validation passed.
    async fn execute_call(&mut self, call: &ToolCall, tx: Option<&EventSender>) -> CallOutcome {
        if let Err(e) = self.validator.validate_call(&call.name, &call.arguments) {
            warn!(tool = %call.name, error = %e, "Tool call rejected");
            return CallOutcome::Rejected(e);
        }

        if let Some(tx) = tx {
            emit(
                tx,
                AgentStreamEvent::ActionStart {
                    id: call.id.clone(),
                    name: call.name.clone(),
                },
            )
            .await;
        }

        match self
            .executor
            .call_tool(&call.name, call.arguments.clone())
            .await
        {
            Ok(result) => {
                let check = self.validator.validate_response(&result, &call.name);
                debug!(tool = %call.name, ok = check.is_ok(), "Tool executed");
                CallOutcome::Completed { result, check }
            }
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool execution failed");
                self.validator.record_failure(&call.name);
                CallOutcome::Failed(e)
            }
        }
    }

    fn commit_round(&mut self, round: Vec<Message>) {
        for message in round {
            self.history.push(message);
        }
    }

    fn iteration_limit_reached(&mut self, max_iterations: usize) -> Message {
        warn!(max_iterations, "Max tool call iterations reached");
        let message = Message::assistant(MAX_ITERATIONS_MESSAGE);
        self.history.push(message.clone());
        message
    }
}

/// History text for a native tool-call outcome.
fn native_result_text(name: &str, outcome: &CallOutcome) -> String {
    match outcome {
        CallOutcome::Rejected(e) => format!("[Tool validation failed for {name}]: {e}"),
        CallOutcome::Failed(e) => format!("[Tool error from {name}]: {e}"),
        CallOutcome::Completed { result, .. } => {
            format!("[Tool result from {name}]: {}", format_tool_result(result))
        }
    }
}

/// History text for a ReAct tool-call outcome.
fn observation_text(name: &str, outcome: &CallOutcome) -> String {
    match outcome {
        CallOutcome::Rejected(e) => format!("Observation: Error: {e}"),
        CallOutcome::Failed(e) => format!("Observation: Error: {e}"),
        CallOutcome::Completed { result, .. } => format_observation(name, result),
    }
}

async fn report_outcome(tx: &EventSender, call: &ToolCall, outcome: &CallOutcome) {
    match outcome {
        CallOutcome::Rejected(e) => {
            emit(
                tx,
                AgentStreamEvent::ToolError {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    error: e.to_string(),
                },
            )
            .await;
        }
        CallOutcome::Failed(e) => {
            emit(
                tx,
                AgentStreamEvent::ToolError {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    error: e.to_string(),
                },
            )
            .await;
        }
        CallOutcome::Completed { result, check } => {
            if let Ok(warnings) = check {
                for message in warnings {
                    emit(
                        tx,
                        AgentStreamEvent::Warning {
                            tool: call.name.clone(),
                            message: message.clone(),
                        },
                    )
                    .await;
                }
            }
            emit(
                tx,
                AgentStreamEvent::ToolResult {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    result: result.clone(),
                    success: check.is_ok(),
                },
            )
            .await;
        }
    }
}

/// Send an event; a closed receiver only means nobody is listening.
async fn emit(tx: &EventSender, event: AgentStreamEvent) {
    let _ = tx.send(event).await;
}

async fn backend_failure(e: ProviderError, tx: &EventSender) -> Error {
    warn!(error = %e, "LLM backend failed");
    emit(
        tx,
        AgentStreamEvent::Error {
            message: e.to_string(),
        },
    )
    .await;
    Error::Provider(e)
}

/// Recover tool calls a model wrote into its text as
/// `{"name": "Tool", "parameters": {...}}` instead of using native tool calls.
///
/// Every `{` is a candidate start; a JSON value is read from there with a
/// streaming deserializer so nested objects and braces inside strings parse
/// correctly. Candidates without a string `name` and an object `parameters`
/// are skipped.
fn recover_text_tool_calls(content: &str, iteration: usize) -> Vec<MessageToolCall> {
    let mut calls = Vec::new();
    let mut offset = 0;
    while let Some(start) = content[offset..].find('{').map(|i| offset + i) {
        let mut values = serde_json::Deserializer::from_str(&content[start..]).into_iter::<Value>();
        let Some(Ok(Value::Object(mut object))) = values.next() else {
            offset = start + 1;
            continue;
        };
        let end = start + values.byte_offset();
        if let (Some(Value::String(name)), Some(parameters @ Value::Object(_))) =
            (object.remove("name"), object.remove("parameters"))
        {
            calls.push(MessageToolCall {
                id: format!("call_{iteration}_{}", calls.len()),
                name,
                arguments: parameters,
            });
            offset = end;
        } else {
            offset = start + 1;
        }
    }
    calls
}

fn decode_calls(raw: &[MessageToolCall]) -> Vec<ToolCall> {
    raw.iter()
        .map(|tc| ToolCall {
            id: tc.id.clone(),
            name: tc.name.clone(),
            arguments: decode_arguments(&tc.name, &tc.arguments),
        })
        .collect()
}

/// Decode tool-call arguments that may arrive as an object or as a
/// JSON-encoded string. Anything unparseable becomes an empty object.
pub fn decode_arguments(tool: &str, raw: &Value) -> Map<String, Value> {
    let arguments = match raw {
        Value::Object(map) => map.clone(),
        Value::String(text) if text.trim().is_empty() => Map::new(),
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => map,
            Ok(other) => {
                warn!(tool = %tool, kind = %a2ia_core::ParamType::name_of(&other), "Tool arguments are not an object");
                Map::new()
            }
            Err(e) => {
                warn!(tool = %tool, error = %e, "Tool arguments are not valid JSON");
                Map::new()
            }
        },
        _ => Map::new(),
    };
    repair_arguments(arguments)
}

/// Decode literal escape sequences left in top-level string values by
/// models that double-escape their JSON.
pub fn repair_arguments(mut arguments: Map<String, Value>) -> Map<String, Value> {
    for value in arguments.values_mut() {
        if let Value::String(text) = value
            && text.contains('\\')
        {
            *text = unescape_literals(text);
        }
    }
    arguments
}

fn unescape_literals(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('"') => out.push('"'),
            Some('\'') => out.push('\''),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

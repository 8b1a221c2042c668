//! The tool-calling conversation loop for A2IA.
//!
//! A turn runs **Request → Validate → Execute → Observe** until the model
//! stops asking for tools:
//!
//! 1. **Request** a completion (or delta stream) over the full history
//! 2. **Validate** each requested call against its schema and the throttler
//! 3. **Execute** valid calls one at a time, in the order requested
//! 4. **Observe**: append each outcome as a `user` message and loop
//!
//! The ReAct variant drives the same cycle through free-text
//! `Thought / Action / Action Input` responses instead of native tool calls.

pub mod format;
pub mod orchestrator;
pub mod prompts;
pub mod react_parser;
pub mod stream_event;
pub mod throttle;
pub mod validator;

#[cfg(test)]
mod test_helpers;

pub use format::{format_tool_result, to_spaced_json};
pub use orchestrator::{DEFAULT_MAX_ITERATIONS, MAX_ITERATIONS_MESSAGE, Orchestrator};
pub use prompts::react_system_prompt;
pub use react_parser::{
    ActionInput, ReActEvent, ReActParser, ReActPhase, ReActResponse, format_observation,
    parse_react_response,
};
pub use stream_event::AgentStreamEvent;
pub use throttle::{ThrottleReason, ThrottleStats, ToolThrottler};
pub use validator::{ToolValidator, ValidationError};

//! # A2IA Core
//!
//! Domain types, traits, and error definitions for the A2IA tool-calling agent.
//! This crate has **no framework dependencies**: it defines the conversation
//! model, the LLM backend seam, and the tool seam that every other crate
//! implements against.
//!
//! ## Seams
//!
//! - [`Provider`]: the LLM backend (plain completion and delta streaming)
//! - [`Tool`] / [`ToolExecutor`]: named capabilities with a parameter schema
//!
//! The orchestrator in `a2ia-agent` only talks to these traits, so tests can
//! drive it with scripted providers and in-memory tools.

pub mod error;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, ToolError};
pub use message::{Conversation, Message, MessageToolCall, Role};
pub use provider::{
    ParamType, ParameterSchema, PropertySchema, Provider, ProviderRequest, ProviderResponse,
    ChunkReceiver, StreamChunk, ToolCallDelta, ToolDefinition, Usage,
};
pub use tool::{Tool, ToolCall, ToolExecutor, ToolRegistry};

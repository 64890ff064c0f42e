//! Tool-calling agent for repository questions.
//!
//! This module provides the agent loop and the repository tools it exposes
//! to the model.

pub mod agent_loop;
pub mod tools;

pub use agent_loop::{AgentConfig, AgentLoop, AgentRun, EXHAUSTED_MESSAGE};
pub use tools::{tool_definitions, ToolCall, ToolDispatcher, ToolKind, ToolOutput};

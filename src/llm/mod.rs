//! Completion endpoint client.
//!
//! The agent loop only sees the [`CompletionClient`] trait; the concrete
//! client speaks the OpenAI-compatible chat completions protocol.

pub mod openai;
pub mod options;

pub use openai::OpenAiClient;
pub use options::{normalize_key, CompletionOptions, LlmValue, OverrideError};

use crate::agent::tools::ToolDefinition;
use crate::models::{Message, MessageContent, ToolCallRequest};
use anyhow::Result;
use async_trait::async_trait;

/// One assistant turn returned by the completion endpoint.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AssistantReply {
    pub content: Option<MessageContent>,
    pub tool_calls: Vec<ToolCallRequest>,
}

impl AssistantReply {
    /// A reply carrying only text.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: Some(MessageContent::Text(text.into())),
            tool_calls: Vec::new(),
        }
    }

    /// A reply requesting tool calls.
    pub fn tool_calls(tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            content: None,
            tool_calls,
        }
    }

    /// The extracted answer text (empty when there is no content).
    pub fn answer_text(&self) -> String {
        self.content
            .as_ref()
            .map(MessageContent::text)
            .unwrap_or_default()
    }

    pub fn into_message(self) -> Message {
        Message::Assistant {
            content: self.content,
            tool_calls: self.tool_calls,
        }
    }
}

/// A chat completion service that may request tool calls.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Send the full conversation plus the tool schema and return one reply.
    async fn complete(&self, messages: &[Message], tools: &[ToolDefinition])
        -> Result<AssistantReply>;
}

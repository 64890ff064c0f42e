//! OpenAI-compatible chat completions client.
//!
//! Works with any server implementing `POST {base_url}/chat/completions`
//! with function tools (OpenAI, OpenRouter, vLLM, Ollama, LiteLLM, ...).

use super::{AssistantReply, CompletionClient, CompletionOptions};
use crate::agent::tools::ToolDefinition;
use crate::models::{Message, MessageContent, ToolCallRequest};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Chat completions request body.
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "no_tools")]
    tools: &'a [ToolDefinition],
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parallel_tool_calls: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<i64>,
    #[serde(flatten)]
    extra: &'a BTreeMap<String, Value>,
}

fn no_tools(tools: &&[ToolDefinition]) -> bool {
    tools.is_empty()
}

/// Chat completions response body.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<MessageContent>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallRequest>>,
}

/// Client for an OpenAI-compatible completion endpoint.
pub struct OpenAiClient {
    options: CompletionOptions,
    api_key: Option<String>,
    http_client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(mut options: CompletionOptions) -> Result<Self> {
        for key in options.sanitize_extra() {
            warn!("Ignoring extra completion option '{}': set by the client", key);
        }

        let api_key = options
            .api_key
            .clone()
            .or_else(|| std::env::var(&options.api_key_env).ok())
            .filter(|key| !key.trim().is_empty());

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(options.timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            options,
            api_key,
            http_client,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.options.base_url.trim_end_matches('/')
        )
    }

    fn build_request<'a>(
        &'a self,
        messages: &'a [Message],
        tools: &'a [ToolDefinition],
    ) -> ChatCompletionRequest<'a> {
        let has_tools = !tools.is_empty();
        ChatCompletionRequest {
            model: &self.options.model,
            messages,
            tools,
            tool_choice: has_tools.then_some("auto"),
            parallel_tool_calls: has_tools.then_some(self.options.parallel_tool_calls),
            temperature: self.options.temperature,
            top_p: self.options.top_p,
            max_tokens: self.options.max_tokens,
            seed: self.options.seed,
            extra: &self.options.extra,
        }
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<AssistantReply> {
        let url = self.endpoint();
        let request = self.build_request(messages, tools);

        debug!(
            "Sending chat request with {} messages to {}",
            messages.len(),
            self.options.model
        );

        let mut builder = self.http_client.post(&url).json(&request);
        if let Some(ref api_key) = self.api_key {
            builder = builder.bearer_auth(api_key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                anyhow!(
                    "Completion request timed out after {}s",
                    self.options.timeout_seconds
                )
            } else if e.is_connect() {
                anyhow!("Cannot connect to completion endpoint at {}", url)
            } else {
                anyhow!("Failed to send completion request: {}", e)
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Completion endpoint error {}: {}", status, body));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .context("Failed to parse completion response")?;

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Completion response contained no choices"))?;

        debug!(
            "Completion finished (reason: {})",
            choice.finish_reason.as_deref().unwrap_or("unknown")
        );

        Ok(AssistantReply {
            content: choice.message.content,
            tool_calls: choice.message.tool_calls.unwrap_or_default(),
        })
    }
}

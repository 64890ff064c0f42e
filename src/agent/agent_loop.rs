//! Agent loop for tool-based repository questions.
//!
//! Each round sends the whole conversation to the completion endpoint. A
//! reply without tool calls ends the loop with its text; otherwise every
//! requested tool runs (concurrently, up to `max_parallel_tools` at once)
//! and each result is appended before the next round.

use crate::agent::tools::{error_payload, tool_definitions, ToolDefinition, ToolDispatcher};
use crate::config::{default_max_iterations, default_max_parallel_tools};
use crate::llm::CompletionClient;
use crate::models::{Conversation, Message, ToolCallRequest};
use crate::repo::{RepoHost, RepositoryContext};
use anyhow::Result;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Returned when the iteration budget runs out before a final answer.
pub const EXHAUSTED_MESSAGE: &str =
    "I was unable to produce an answer within the allowed number of tool-use iterations.";

/// Configuration for the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentConfig {
    /// Maximum number of completion rounds.
    pub max_iterations: usize,
    /// Maximum tool calls in flight within one round (at least 1 is used).
    pub max_parallel_tools: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_parallel_tools: default_max_parallel_tools(),
        }
    }
}

/// Outcome of one question, with the full transcript.
#[derive(Debug, Clone)]
pub struct AgentRun {
    pub answer: String,
    /// Completion requests sent.
    pub iterations: usize,
    /// True when the budget ran out.
    pub exhausted: bool,
    pub conversation: Conversation,
}

/// Drives the question-answering rounds for one repository.
pub struct AgentLoop {
    config: AgentConfig,
    llm: Arc<dyn CompletionClient>,
    host: Arc<dyn RepoHost>,
    tools: Vec<ToolDefinition>,
}

impl AgentLoop {
    pub fn new(config: AgentConfig, llm: Arc<dyn CompletionClient>, host: Arc<dyn RepoHost>) -> Self {
        Self {
            config,
            llm,
            host,
            tools: tool_definitions(),
        }
    }

    /// Answer `prompt` about the repository in `context`.
    pub async fn run(&self, context: RepositoryContext, prompt: &str) -> Result<String> {
        Ok(self.run_with_transcript(context, prompt).await?.answer)
    }

    /// Like [`AgentLoop::run`] but also returns the conversation.
    pub async fn run_with_transcript(
        &self,
        context: RepositoryContext,
        prompt: &str,
    ) -> Result<AgentRun> {
        info!(
            "Asking about {} on {} at {}",
            context.full_name(),
            context.platform,
            context.git_ref
        );

        let mut conversation = Conversation::new();
        conversation.push(Message::system(system_prompt(&context)));
        conversation.push(Message::user(prompt));

        let dispatcher = ToolDispatcher::new(Arc::clone(&self.host), Arc::new(context));

        for iteration in 1..=self.config.max_iterations {
            debug!(
                "Agent iteration {} ({} messages)",
                iteration,
                conversation.len()
            );

            let reply = self
                .llm
                .complete(conversation.messages(), &self.tools)
                .await?;

            if reply.tool_calls.is_empty() {
                let answer = reply.answer_text();
                conversation.push(reply.into_message());
                info!("Answer ready after {} iteration(s)", iteration);
                return Ok(AgentRun {
                    answer,
                    iterations: iteration,
                    exhausted: false,
                    conversation,
                });
            }

            let requests = reply.tool_calls.clone();
            conversation.push(reply.into_message());

            let results = self.dispatch_round(&dispatcher, &requests).await;
            conversation.extend(results);
        }

        warn!(
            "No answer within {} iteration(s)",
            self.config.max_iterations
        );
        Ok(AgentRun {
            answer: EXHAUSTED_MESSAGE.to_string(),
            iterations: self.config.max_iterations,
            exhausted: true,
            conversation,
        })
    }

    /// Run every request of one round and return one tool message per request,
    /// in completion order.
    async fn dispatch_round(
        &self,
        dispatcher: &ToolDispatcher,
        requests: &[ToolCallRequest],
    ) -> Vec<Message> {
        let limit = self.config.max_parallel_tools.max(1);
        debug!(
            "Dispatching {} tool call(s), up to {} at once",
            requests.len(),
            limit
        );

        stream::iter(requests)
            .map(|request| async move {
                info!("Tool {} ({})", request.name(), request.id);
                let payload = match dispatcher.dispatch(request).await {
                    Ok(output) => output.into_payload(),
                    Err(e) => {
                        warn!("Tool {} failed: {}", request.name(), e);
                        error_payload(&e)
                    }
                };
                Message::tool(request.id.clone(), payload)
            })
            .buffer_unordered(limit)
            .collect()
            .await
    }
}

/// System prompt naming the repository and asking for batched tool calls.
pub fn system_prompt(context: &RepositoryContext) -> String {
    format!(
        r#"You are an expert software engineer answering questions about the {platform} repository {owner}/{repo} at ref "{git_ref}".

Use the tools to inspect the repository before answering:
- `list_tree` shows every path; start here to learn the layout
- `list_directory` lists one directory
- `read_file` reads a file
- `search_code` finds files mentioning a term
- `get_repo_info` returns repository metadata

Tool arguments `owner`, `repo` and `ref` default to this repository and ref.

When you need several pieces of information, request all the tool calls in a single response so they run in parallel, instead of one call per response.

Base your answer on what you read. When you have enough information, reply with the final answer and no tool calls."#,
        platform = context.platform,
        owner = context.owner,
        repo = context.repo,
        git_ref = context.git_ref,
    )
}

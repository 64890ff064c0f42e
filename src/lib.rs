//! Ask natural-language questions about GitHub and GitLab repositories.
//!
//! A language model is given five read-only repository tools (metadata,
//! file read, directory listing, tree listing, code search) and calls them
//! over several rounds until it can answer.
//!
//! ```no_run
//! # async fn demo() -> anyhow::Result<()> {
//! let answer = ask_github::ask(
//!     "https://github.com/rust-lang/cargo",
//!     "What build system does this repo use?",
//!     ask_github::AskOptions::default(),
//! )
//! .await?;
//! println!("{}", answer);
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod config;
pub mod error;
pub mod llm;
pub mod models;
pub mod repo;

#[cfg(test)]
pub(crate) mod testing;

pub use agent::{AgentConfig, AgentLoop, AgentRun, EXHAUSTED_MESSAGE};
pub use config::{Config, GitHubConfig, GitLabConfig};
pub use error::{PlatformError, ToolError};
pub use llm::{CompletionClient, CompletionOptions, LlmValue, OpenAiClient};
pub use models::TreeEntry;
pub use repo::{HostRegistry, Platform, RepoHost, RepositoryContext};

use anyhow::Result;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Options for one question.
#[derive(Debug, Clone)]
pub struct AskOptions {
    pub max_iterations: usize,
    pub max_parallel_tools: usize,
    /// Platform token. Falls back to `GITHUB_TOKEN` / `GITLAB_TOKEN`.
    pub token: Option<String>,
    pub completion: CompletionOptions,
    pub github: GitHubConfig,
    pub gitlab: GitLabConfig,
}

impl Default for AskOptions {
    fn default() -> Self {
        Config::default().ask_options(None)
    }
}

impl AskOptions {
    fn agent_config(&self) -> AgentConfig {
        AgentConfig {
            max_iterations: self.max_iterations,
            max_parallel_tools: self.max_parallel_tools,
        }
    }
}

/// Answer `prompt` about the repository at `repo_url`.
pub async fn ask(repo_url: &str, prompt: &str, options: AskOptions) -> Result<String> {
    let hosts = HostRegistry::from_config(&options.github, &options.gitlab)?;
    let llm = Arc::new(OpenAiClient::new(options.completion.clone())?);
    ask_with(llm, &hosts, repo_url, prompt, &options).await
}

/// [`ask`] with an injected completion client and hosting adapters.
pub async fn ask_with(
    llm: Arc<dyn CompletionClient>,
    hosts: &HostRegistry,
    repo_url: &str,
    prompt: &str,
    options: &AskOptions,
) -> Result<String> {
    let (host, context) = hosts.resolve(repo_url, options.token.as_deref()).await?;
    let agent = AgentLoop::new(options.agent_config(), llm, host);
    agent.run(context, prompt).await
}

/// List the repository tree at the URL's ref (or the default branch)
/// without involving the model.
pub async fn list_tree(
    repo_url: &str,
    recursive: bool,
    token: Option<&str>,
) -> Result<Vec<TreeEntry>> {
    let hosts = HostRegistry::from_config(&GitHubConfig::default(), &GitLabConfig::default())?;
    list_tree_with(&hosts, repo_url, recursive, token).await
}

/// [`list_tree`] with injected hosting adapters.
pub async fn list_tree_with(
    hosts: &HostRegistry,
    repo_url: &str,
    recursive: bool,
    token: Option<&str>,
) -> Result<Vec<TreeEntry>> {
    let (host, context) = hosts.resolve(repo_url, token).await?;
    let entries = host
        .list_tree(
            &context.owner,
            &context.repo,
            &context.git_ref,
            recursive,
            context.token(),
        )
        .await?;

    let mut seen = HashSet::new();
    let entries: Vec<TreeEntry> = entries
        .into_iter()
        .filter(|entry| seen.insert(entry.path.clone()))
        .collect();
    debug!("{} tree entries at {}", entries.len(), context.git_ref);
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::AssistantReply;
    use crate::testing::{tool_call, MemoryHost, ScriptedCompletion};
    use serde_json::json;

    fn registry(host: Arc<MemoryHost>) -> HostRegistry {
        HostRegistry::new(host.clone(), host)
    }

    fn options() -> AskOptions {
        AskOptions {
            token: Some("ghp_test".to_string()),
            ..AskOptions::default()
        }
    }

    fn build_system_script() -> Vec<AssistantReply> {
        vec![
            AssistantReply::tool_calls(vec![
                tool_call("t1", "list_tree", json!({})),
                tool_call("t2", "list_directory", json!({})),
            ]),
            AssistantReply::tool_calls(vec![tool_call(
                "t3",
                "read_file",
                json!({"path": "Cargo.toml"}),
            )]),
            AssistantReply::text("Cargo."),
        ]
    }

    #[test]
    fn test_default_options() {
        let options = AskOptions::default();
        assert_eq!(options.max_iterations, 20);
        assert_eq!(options.max_parallel_tools, 15);
        assert!(options.token.is_none());
    }

    #[tokio::test]
    async fn test_default_branch_used_for_every_tool_call() {
        let host = Arc::new(MemoryHost::new(Some("trunk")).with_file("Cargo.toml", "[package]"));
        let llm = Arc::new(ScriptedCompletion::new(build_system_script()));

        let answer = ask_with(
            llm.clone(),
            &registry(host.clone()),
            "https://github.com/acme/widget",
            "What build system does this repo use?",
            &options(),
        )
        .await
        .unwrap();

        assert_eq!(answer, "Cargo.");
        assert_eq!(host.repo_info_calls(), 1);
        assert_eq!(host.refs_seen(), vec!["trunk"; 3]);
        assert!(host
            .tokens_seen()
            .iter()
            .all(|t| t.as_deref() == Some("ghp_test")));
    }

    #[tokio::test]
    async fn test_url_ref_skips_metadata() {
        let host = Arc::new(MemoryHost::new(Some("trunk")).with_file("Cargo.toml", "[package]"));
        let llm = Arc::new(ScriptedCompletion::new(build_system_script()));

        ask_with(
            llm,
            &registry(host.clone()),
            "https://github.com/acme/widget/tree/dev",
            "Q",
            &options(),
        )
        .await
        .unwrap();

        assert_eq!(host.repo_info_calls(), 0);
        assert_eq!(host.refs_seen(), vec!["dev"; 3]);
    }

    #[tokio::test]
    async fn test_invalid_url_fails_before_the_loop() {
        let host = Arc::new(MemoryHost::new(Some("main")));
        let llm = Arc::new(ScriptedCompletion::new(vec![AssistantReply::text("x")]));

        let err = ask_with(
            llm.clone(),
            &registry(host),
            "https://github.com/acme",
            "Q",
            &options(),
        )
        .await
        .unwrap_err();

        assert!(err.to_string().contains("Invalid GitHub URL"));
        assert_eq!(llm.request_count(), 0);
    }

    #[tokio::test]
    async fn test_gitlab_url_reaches_the_gitlab_adapter() {
        let github = Arc::new(MemoryHost::new(Some("main")));
        let gitlab = Arc::new(
            MemoryHost::new(Some("master"))
                .with_platform(Platform::GitLab)
                .with_file("Cargo.toml", "[package]"),
        );
        let hosts = HostRegistry::new(github.clone(), gitlab.clone());
        let llm = Arc::new(ScriptedCompletion::new(build_system_script()));

        let answer = ask_with(
            llm,
            &hosts,
            "https://gitlab.com/acme/tools/widget",
            "What build system does this repo use?",
            &AskOptions {
                token: Some("glpat_test".to_string()),
                ..AskOptions::default()
            },
        )
        .await
        .unwrap();

        assert_eq!(answer, "Cargo.");
        assert_eq!(gitlab.repo_info_calls(), 1);
        assert_eq!(gitlab.refs_seen(), vec!["master"; 3]);
        assert!(gitlab
            .tokens_seen()
            .iter()
            .all(|t| t.as_deref() == Some("glpat_test")));
        assert_eq!(github.repo_info_calls(), 0);
        assert!(github.refs_seen().is_empty());

        let (host, context) = hosts
            .resolve("https://gitlab.com/acme/tools/widget/-/tree/dev", Some("t"))
            .await
            .unwrap();
        assert_eq!(host.platform(), Platform::GitLab);
        assert_eq!(context.platform, Platform::GitLab);
        assert_eq!(context.owner, "acme/tools");
        assert_eq!(context.repo, "widget");
        assert_eq!(context.git_ref, "dev");
    }

    #[test]
    fn test_list_tree_without_model() {
        let host = Arc::new(
            MemoryHost::new(Some("trunk"))
                .with_file("Cargo.toml", "")
                .with_file("src/lib.rs", ""),
        );

        let entries = tokio_test::block_on(list_tree_with(
            &registry(host.clone()),
            "https://github.com/acme/widget",
            true,
            Some("t"),
        ))
        .unwrap();

        let paths: Vec<_> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["src", "Cargo.toml", "src/lib.rs"]);
        assert_eq!(host.refs_seen(), vec!["trunk"]);
    }
}

//! Tool definitions for the repository question agent.
//!
//! This module defines the five read-only tools the model can call, parses
//! the model's tool requests into typed calls, and dispatches them against
//! the repository hosting platform.

use crate::error::ToolError;
use crate::models::{DirectoryEntry, SearchResults, ToolCallRequest, TreeEntry};
use crate::repo::{RepoHost, RepositoryContext};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Tool definition in the chat-completions `tools` format.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionDefinition,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// The fixed set of tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    GetRepoInfo,
    ReadFile,
    ListDirectory,
    ListTree,
    SearchCode,
}

impl ToolKind {
    pub const ALL: [ToolKind; 5] = [
        ToolKind::GetRepoInfo,
        ToolKind::ReadFile,
        ToolKind::ListDirectory,
        ToolKind::ListTree,
        ToolKind::SearchCode,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::GetRepoInfo => "get_repo_info",
            ToolKind::ReadFile => "read_file",
            ToolKind::ListDirectory => "list_directory",
            ToolKind::ListTree => "list_tree",
            ToolKind::SearchCode => "search_code",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Optional repository override shared by every tool.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RepoArgs {
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub repo: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReadFileArgs {
    #[serde(flatten)]
    pub target: RepoArgs,
    pub path: String,
    #[serde(default, rename = "ref")]
    pub git_ref: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ListDirectoryArgs {
    #[serde(flatten)]
    pub target: RepoArgs,
    #[serde(default)]
    pub path: String,
    #[serde(default, rename = "ref")]
    pub git_ref: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ListTreeArgs {
    #[serde(flatten)]
    pub target: RepoArgs,
    #[serde(default, rename = "ref")]
    pub git_ref: Option<String>,
    #[serde(default = "default_recursive")]
    pub recursive: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SearchCodeArgs {
    #[serde(flatten)]
    pub target: RepoArgs,
    pub query: String,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
    #[serde(default = "default_page")]
    pub page: u32,
}

fn default_recursive() -> bool {
    true
}

fn default_per_page() -> u32 {
    30
}

fn default_page() -> u32 {
    1
}

/// A parsed tool request.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCall {
    GetRepoInfo(RepoArgs),
    ReadFile(ReadFileArgs),
    ListDirectory(ListDirectoryArgs),
    ListTree(ListTreeArgs),
    SearchCode(SearchCodeArgs),
}

impl ToolCall {
    /// Parse a tool name and its JSON-encoded arguments.
    pub fn parse(name: &str, arguments: &str) -> Result<Self, ToolError> {
        let kind =
            ToolKind::from_name(name).ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        let arguments = if arguments.trim().is_empty() {
            "{}"
        } else {
            arguments
        };

        let invalid = |source| ToolError::InvalidArguments {
            tool: kind.name().to_string(),
            source,
        };

        Ok(match kind {
            ToolKind::GetRepoInfo => {
                ToolCall::GetRepoInfo(serde_json::from_str(arguments).map_err(invalid)?)
            }
            ToolKind::ReadFile => {
                ToolCall::ReadFile(serde_json::from_str(arguments).map_err(invalid)?)
            }
            ToolKind::ListDirectory => {
                ToolCall::ListDirectory(serde_json::from_str(arguments).map_err(invalid)?)
            }
            ToolKind::ListTree => {
                ToolCall::ListTree(serde_json::from_str(arguments).map_err(invalid)?)
            }
            ToolKind::SearchCode => {
                ToolCall::SearchCode(serde_json::from_str(arguments).map_err(invalid)?)
            }
        })
    }

    pub fn kind(&self) -> ToolKind {
        match self {
            ToolCall::GetRepoInfo(_) => ToolKind::GetRepoInfo,
            ToolCall::ReadFile(_) => ToolKind::ReadFile,
            ToolCall::ListDirectory(_) => ToolKind::ListDirectory,
            ToolCall::ListTree(_) => ToolKind::ListTree,
            ToolCall::SearchCode(_) => ToolKind::SearchCode,
        }
    }
}

/// Result of executing a tool.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    Content(String),
    Directory(Vec<DirectoryEntry>),
    Tree(Vec<TreeEntry>),
    Search(SearchResults),
    RepoInfo(Value),
}

impl ToolOutput {
    /// Render the tool message payload: raw text for file content, JSON otherwise.
    pub fn into_payload(self) -> String {
        let rendered = match self {
            ToolOutput::Content(text) => return text,
            ToolOutput::Directory(entries) => serde_json::to_string(&entries),
            ToolOutput::Tree(entries) => serde_json::to_string(&entries),
            ToolOutput::Search(results) => serde_json::to_string(&results),
            ToolOutput::RepoInfo(metadata) => serde_json::to_string(&metadata),
        };
        rendered.unwrap_or_else(|e| error_payload(&e))
    }
}

/// `{"error": "<message>"}`.
pub fn error_payload(error: &dyn fmt::Display) -> String {
    json!({ "error": error.to_string() }).to_string()
}

/// Executes tool calls against one repository snapshot.
#[derive(Clone)]
pub struct ToolDispatcher {
    host: Arc<dyn RepoHost>,
    context: Arc<RepositoryContext>,
}

impl ToolDispatcher {
    pub fn new(host: Arc<dyn RepoHost>, context: Arc<RepositoryContext>) -> Self {
        Self { host, context }
    }

    /// Parse and execute one tool request.
    pub async fn dispatch(&self, request: &ToolCallRequest) -> Result<ToolOutput, ToolError> {
        let call = ToolCall::parse(request.name(), &request.function.arguments)?;
        debug!("Executing tool {} with {:?}", call.kind(), call);
        self.execute(call).await
    }

    /// Execute a parsed call, filling omitted arguments from the context.
    pub async fn execute(&self, call: ToolCall) -> Result<ToolOutput, ToolError> {
        let ctx = self.context.as_ref();
        let token = ctx.token();

        let output = match call {
            ToolCall::GetRepoInfo(target) => {
                let (owner, repo) = self.target(&target);
                let info = self.host.get_repo_info(owner, repo, token).await?;
                ToolOutput::RepoInfo(info.metadata)
            }
            ToolCall::ReadFile(args) => {
                let (owner, repo) = self.target(&args.target);
                let git_ref = args.git_ref.as_deref().unwrap_or(&ctx.git_ref);
                let content = self
                    .host
                    .read_file(owner, repo, &args.path, Some(git_ref), token)
                    .await?;
                ToolOutput::Content(content)
            }
            ToolCall::ListDirectory(args) => {
                let (owner, repo) = self.target(&args.target);
                let git_ref = args.git_ref.as_deref().unwrap_or(&ctx.git_ref);
                let entries = self
                    .host
                    .list_directory(owner, repo, &args.path, Some(git_ref), token)
                    .await?;
                ToolOutput::Directory(entries)
            }
            ToolCall::ListTree(args) => {
                let (owner, repo) = self.target(&args.target);
                let git_ref = args.git_ref.as_deref().unwrap_or(&ctx.git_ref);
                let entries = self
                    .host
                    .list_tree(owner, repo, git_ref, args.recursive, token)
                    .await?;
                ToolOutput::Tree(entries)
            }
            ToolCall::SearchCode(args) => {
                let (owner, repo) = self.target(&args.target);
                let results = self
                    .host
                    .search_code(owner, repo, &args.query, args.per_page, args.page, token)
                    .await?;
                ToolOutput::Search(results)
            }
        };

        Ok(output)
    }

    fn target<'a>(&'a self, args: &'a RepoArgs) -> (&'a str, &'a str) {
        (
            args.owner.as_deref().unwrap_or(&self.context.owner),
            args.repo.as_deref().unwrap_or(&self.context.repo),
        )
    }
}

fn function_tool(name: ToolKind, description: &str, parameters: Value) -> ToolDefinition {
    ToolDefinition {
        tool_type: "function".to_string(),
        function: FunctionDefinition {
            name: name.name().to_string(),
            description: description.to_string(),
            parameters,
        },
    }
}

/// Get the tool definitions for the completion endpoint.
pub fn tool_definitions() -> Vec<ToolDefinition> {
    let owner = json!({
        "type": "string",
        "description": "Repository owner or namespace. Defaults to the repository being asked about."
    });
    let repo = json!({
        "type": "string",
        "description": "Repository name. Defaults to the repository being asked about."
    });
    let git_ref = json!({
        "type": "string",
        "description": "Branch, tag or commit. Defaults to the resolved ref."
    });

    vec![
        function_tool(
            ToolKind::GetRepoInfo,
            "Get repository metadata: description, default branch, languages, topics, stars.",
            json!({
                "type": "object",
                "properties": {"owner": owner, "repo": repo},
                "required": []
            }),
        ),
        function_tool(
            ToolKind::ReadFile,
            "Read the contents of a file in the repository.",
            json!({
                "type": "object",
                "properties": {
                    "owner": owner,
                    "repo": repo,
                    "path": {
                        "type": "string",
                        "description": "Path to the file relative to the repository root"
                    },
                    "ref": git_ref
                },
                "required": ["path"]
            }),
        ),
        function_tool(
            ToolKind::ListDirectory,
            "List the files and directories directly inside one directory.",
            json!({
                "type": "object",
                "properties": {
                    "owner": owner,
                    "repo": repo,
                    "path": {
                        "type": "string",
                        "description": "Directory path relative to the repository root. Empty for the root."
                    },
                    "ref": git_ref
                },
                "required": []
            }),
        ),
        function_tool(
            ToolKind::ListTree,
            "List every path in the repository. Use this first to see the project layout.",
            json!({
                "type": "object",
                "properties": {
                    "owner": owner,
                    "repo": repo,
                    "ref": git_ref,
                    "recursive": {
                        "type": "boolean",
                        "description": "Descend into subdirectories (default: true)"
                    }
                },
                "required": []
            }),
        ),
        function_tool(
            ToolKind::SearchCode,
            "Search the repository's code. Returns matching file paths.",
            json!({
                "type": "object",
                "properties": {
                    "owner": owner,
                    "repo": repo,
                    "query": {
                        "type": "string",
                        "description": "Search terms"
                    },
                    "per_page": {
                        "type": "integer",
                        "description": "Results per page (default: 30)"
                    },
                    "page": {
                        "type": "integer",
                        "description": "Page number, starting at 1"
                    }
                },
                "required": ["query"]
            }),
        ),
    ]
}

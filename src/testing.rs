//! In-memory fakes for the hosting platform and the completion endpoint.

use crate::agent::tools::ToolDefinition;
use crate::error::PlatformError;
use crate::llm::{AssistantReply, CompletionClient};
use crate::models::{
    DirectoryEntry, Message, RepoInfo, SearchHit, SearchResults, ToolCallRequest, TreeEntry,
};
use crate::repo::{github, gitlab, Platform, RepoHost, RepoLocation};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// A repository held in memory, recording how it was called.
pub(crate) struct MemoryHost {
    platform: Platform,
    default_branch: Option<String>,
    files: BTreeMap<String, String>,
    delay: Option<Duration>,
    repo_info_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    refs: Mutex<Vec<String>>,
    tokens: Mutex<Vec<Option<String>>>,
}

impl MemoryHost {
    pub(crate) fn new(default_branch: Option<&str>) -> Self {
        Self {
            platform: Platform::GitHub,
            default_branch: default_branch.map(String::from),
            files: BTreeMap::new(),
            delay: None,
            repo_info_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            refs: Mutex::new(Vec::new()),
            tokens: Mutex::new(Vec::new()),
        }
    }

    /// Answer as `platform`, using its URL grammar.
    pub(crate) fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub(crate) fn with_file(mut self, path: &str, content: &str) -> Self {
        self.files.insert(path.to_string(), content.to_string());
        self
    }

    /// Make every file operation take this long.
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn repo_info_calls(&self) -> usize {
        self.repo_info_calls.load(Ordering::SeqCst)
    }

    /// Highest number of file operations observed running at once.
    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn refs_seen(&self) -> Vec<String> {
        self.refs.lock().unwrap().clone()
    }

    pub(crate) fn tokens_seen(&self) -> Vec<Option<String>> {
        self.tokens.lock().unwrap().clone()
    }

    async fn enter(&self, git_ref: Option<&str>, token: Option<&str>) {
        self.refs
            .lock()
            .unwrap()
            .push(git_ref.unwrap_or_default().to_string());
        self.tokens.lock().unwrap().push(token.map(String::from));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    fn directories(&self) -> BTreeSet<String> {
        self.files
            .keys()
            .flat_map(|path| {
                let parts: Vec<&str> = path.split('/').collect();
                (1..parts.len())
                    .map(|n| parts[..n].join("/"))
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}

fn parent(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

fn file_name(path: &str) -> &str {
    path.rsplit_once('/').map(|(_, name)| name).unwrap_or(path)
}

#[async_trait]
impl RepoHost for MemoryHost {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn parse_url(&self, repo_url: &str) -> Result<RepoLocation, PlatformError> {
        match self.platform {
            Platform::GitHub => github::parse_repo_url(repo_url),
            Platform::GitLab => gitlab::parse_repo_url(repo_url),
        }
    }

    async fn get_repo_info(
        &self,
        owner: &str,
        repo: &str,
        token: Option<&str>,
    ) -> Result<RepoInfo, PlatformError> {
        self.repo_info_calls.fetch_add(1, Ordering::SeqCst);
        self.tokens.lock().unwrap().push(token.map(String::from));
        Ok(RepoInfo::from_metadata(json!({
            "full_name": format!("{}/{}", owner, repo),
            "default_branch": self.default_branch.clone().map(Value::String).unwrap_or(Value::Null),
        })))
    }

    async fn read_file(
        &self,
        _owner: &str,
        _repo: &str,
        path: &str,
        git_ref: Option<&str>,
        token: Option<&str>,
    ) -> Result<String, PlatformError> {
        self.enter(git_ref, token).await;
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| PlatformError::NotAFile(path.to_string()))
    }

    async fn list_directory(
        &self,
        _owner: &str,
        _repo: &str,
        path: &str,
        git_ref: Option<&str>,
        token: Option<&str>,
    ) -> Result<Vec<DirectoryEntry>, PlatformError> {
        self.enter(git_ref, token).await;
        let dir = path.trim_matches('/');
        let directories = self.directories();
        if !dir.is_empty() && !directories.contains(dir) {
            return Err(PlatformError::NotADirectory(path.to_string()));
        }

        let dirs = directories
            .iter()
            .filter(|d| parent(d) == dir)
            .map(|d| (d.as_str(), "dir"));
        let files = self
            .files
            .keys()
            .filter(|f| parent(f) == dir)
            .map(|f| (f.as_str(), "file"));

        Ok(dirs
            .chain(files)
            .map(|(path, kind)| DirectoryEntry {
                name: file_name(path).to_string(),
                entry_type: kind.to_string(),
                path: path.to_string(),
            })
            .collect())
    }

    async fn list_tree(
        &self,
        _owner: &str,
        _repo: &str,
        git_ref: &str,
        recursive: bool,
        token: Option<&str>,
    ) -> Result<Vec<TreeEntry>, PlatformError> {
        self.enter(Some(git_ref), token).await;
        let dirs = self
            .directories()
            .into_iter()
            .map(|path| (path, "tree"))
            .collect::<Vec<_>>();
        let files = self.files.keys().map(|path| (path.clone(), "blob"));

        Ok(dirs
            .into_iter()
            .chain(files)
            .filter(|(path, _)| recursive || !path.contains('/'))
            .map(|(path, kind)| TreeEntry {
                path,
                entry_type: kind.to_string(),
            })
            .collect())
    }

    async fn search_code(
        &self,
        _owner: &str,
        _repo: &str,
        query: &str,
        per_page: u32,
        page: u32,
        token: Option<&str>,
    ) -> Result<SearchResults, PlatformError> {
        self.enter(None, token).await;
        let matches: Vec<SearchHit> = self
            .files
            .iter()
            .filter(|(_, content)| content.contains(query))
            .map(|(path, _)| SearchHit {
                path: path.clone(),
                name: file_name(path).to_string(),
                url: format!("memory://{}", path),
            })
            .collect();

        let skip = (page.saturating_sub(1) * per_page) as usize;
        Ok(SearchResults {
            total_count: matches.len() as u64,
            items: matches
                .into_iter()
                .skip(skip)
                .take(per_page as usize)
                .collect(),
        })
    }
}

/// A completion endpoint that replays canned replies in order.
pub(crate) struct ScriptedCompletion {
    replies: Mutex<VecDeque<AssistantReply>>,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedCompletion {
    pub(crate) fn new(replies: Vec<AssistantReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Conversations sent so far, one per request.
    pub(crate) fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionClient for ScriptedCompletion {
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<AssistantReply> {
        assert_eq!(tools.len(), 5, "every request carries the tool schema");
        self.requests.lock().unwrap().push(messages.to_vec());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow!("no scripted reply left"))
    }
}

/// Shorthand for a model tool request.
pub(crate) fn tool_call(id: &str, name: &str, arguments: Value) -> ToolCallRequest {
    ToolCallRequest::new(id, name, arguments.to_string())
}

//! Repository hosting platforms.
//!
//! Each platform adapter implements the same five read-only operations
//! against one hosting service's REST API, plus the URL grammar used to
//! recover owner, repository and ref from a browser URL.

pub mod context;
pub mod github;
pub mod gitlab;

pub use context::{resolve_context, resolve_token, resolve_token_with, RepositoryContext};
pub use github::GitHubClient;
pub use gitlab::GitLabClient;

use crate::config::{GitHubConfig, GitLabConfig};
use crate::error::PlatformError;
use crate::models::{DirectoryEntry, RepoInfo, SearchResults, TreeEntry};
use anyhow::Result;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// Supported hosting platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    GitHub,
    GitLab,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::GitHub => write!(f, "GitHub"),
            Platform::GitLab => write!(f, "GitLab"),
        }
    }
}

impl Platform {
    /// Pick the platform from a repository URL's host.
    ///
    /// Unrecognized hosts fall back to GitHub.
    pub fn detect(repo_url: &str) -> Self {
        let host = normalize_url(repo_url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_ascii_lowercase))
            .unwrap_or_default();

        if host.contains("gitlab.com") {
            Platform::GitLab
        } else {
            Platform::GitHub
        }
    }

    /// Environment variable consulted for a token when none is given.
    pub fn token_env_var(&self) -> &'static str {
        match self {
            Platform::GitHub => "GITHUB_TOKEN",
            Platform::GitLab => "GITLAB_TOKEN",
        }
    }
}

/// Owner, repository and optional ref parsed from a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoLocation {
    pub owner: String,
    pub repo: String,
    pub git_ref: Option<String>,
}

/// The five read-only repository operations, implemented once per platform.
///
/// Adapters are stateless: the token is passed on every call.
#[async_trait]
pub trait RepoHost: Send + Sync {
    fn platform(&self) -> Platform;

    /// Parse a browser URL into owner, repository and optional ref.
    fn parse_url(&self, repo_url: &str) -> Result<RepoLocation, PlatformError>;

    async fn get_repo_info(
        &self,
        owner: &str,
        repo: &str,
        token: Option<&str>,
    ) -> Result<RepoInfo, PlatformError>;

    async fn read_file(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        git_ref: Option<&str>,
        token: Option<&str>,
    ) -> Result<String, PlatformError>;

    async fn list_directory(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        git_ref: Option<&str>,
        token: Option<&str>,
    ) -> Result<Vec<DirectoryEntry>, PlatformError>;

    async fn list_tree(
        &self,
        owner: &str,
        repo: &str,
        git_ref: &str,
        recursive: bool,
        token: Option<&str>,
    ) -> Result<Vec<TreeEntry>, PlatformError>;

    async fn search_code(
        &self,
        owner: &str,
        repo: &str,
        query: &str,
        per_page: u32,
        page: u32,
        token: Option<&str>,
    ) -> Result<SearchResults, PlatformError>;
}

/// One adapter per platform.
#[derive(Clone)]
pub struct HostRegistry {
    github: Arc<dyn RepoHost>,
    gitlab: Arc<dyn RepoHost>,
}

impl HostRegistry {
    pub fn new(github: Arc<dyn RepoHost>, gitlab: Arc<dyn RepoHost>) -> Self {
        Self { github, gitlab }
    }

    /// Build the real REST adapters.
    pub fn from_config(github: &GitHubConfig, gitlab: &GitLabConfig) -> Result<Self> {
        Ok(Self::new(
            Arc::new(GitHubClient::new(github)?),
            Arc::new(GitLabClient::new(gitlab)?),
        ))
    }

    pub fn get(&self, platform: Platform) -> Arc<dyn RepoHost> {
        match platform {
            Platform::GitHub => Arc::clone(&self.github),
            Platform::GitLab => Arc::clone(&self.gitlab),
        }
    }

    /// Detect the platform, then resolve the full repository context.
    pub async fn resolve(
        &self,
        repo_url: &str,
        token: Option<&str>,
    ) -> Result<(Arc<dyn RepoHost>, RepositoryContext), PlatformError> {
        let platform = Platform::detect(repo_url);
        debug!("Detected platform {} for {}", platform, repo_url);

        let host = self.get(platform);
        let token = resolve_token(platform, token);
        let context = resolve_context(host.as_ref(), repo_url, token).await?;
        Ok((host, context))
    }
}

/// Parse a repository URL, assuming `https://` when no scheme is given.
pub(crate) fn normalize_url(repo_url: &str) -> Result<Url, url::ParseError> {
    let trimmed = repo_url.trim();
    if trimmed.contains("://") {
        Url::parse(trimmed)
    } else {
        Url::parse(&format!("https://{}", trimmed))
    }
}

/// Non-empty path segments of a repository URL.
pub(crate) fn url_path_segments(repo_url: &str) -> Option<Vec<String>> {
    let url = normalize_url(repo_url).ok()?;
    let segments = url
        .path_segments()?
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();
    Some(segments)
}

/// Strip a trailing `.git` from a repository name.
pub(crate) fn trim_git_suffix(repo: &str) -> String {
    repo.strip_suffix(".git").unwrap_or(repo).to_string()
}

/// Repository-relative path with `.` and surrounding slashes removed.
pub(crate) fn normalize_repo_path(path: &str) -> &str {
    let trimmed = path.trim().trim_matches('/');
    if trimmed == "." {
        ""
    } else {
        trimmed
    }
}

/// Append path segments to a base API URL.
pub(crate) fn join_segments<I>(base: &Url, segments: I) -> Url
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

/// Parse a configured API base URL.
pub(crate) fn parse_base_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).map_err(|e| anyhow::anyhow!("Invalid base URL {}: {}", raw, e))?;
    if url.cannot_be_a_base() {
        anyhow::bail!("Invalid base URL {}: not a hierarchical URL", raw);
    }
    Ok(url)
}

/// Send a request and turn non-success statuses into errors.
pub(crate) async fn send(
    request: reqwest::RequestBuilder,
    url: &str,
) -> Result<reqwest::Response, PlatformError> {
    let response = request.send().await.map_err(|source| PlatformError::Request {
        url: url.to_string(),
        source,
    })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(PlatformError::Status {
            status,
            url: url.to_string(),
            body,
        });
    }

    Ok(response)
}

/// Read a response body as JSON.
pub(crate) async fn read_json(
    response: reqwest::Response,
    url: &str,
) -> Result<serde_json::Value, PlatformError> {
    response
        .json()
        .await
        .map_err(|e| PlatformError::decode(url, e))
}

/// Decode base64 file content (hosting APIs wrap it at 60 columns).
pub(crate) fn decode_base64_content(encoded: &str, url: &str) -> Result<String, PlatformError> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = BASE64
        .decode(compact)
        .map_err(|e| PlatformError::decode(url, e))?;
    String::from_utf8(bytes).map_err(|e| PlatformError::decode(url, e))
}

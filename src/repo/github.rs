//! GitHub REST adapter.

use super::{
    decode_base64_content, join_segments, normalize_repo_path, parse_base_url, read_json, send,
    trim_git_suffix, url_path_segments, Platform, RepoHost, RepoLocation,
};
use crate::config::GitHubConfig;
use crate::error::PlatformError;
use crate::models::{DirectoryEntry, RepoInfo, SearchHit, SearchResults, TreeEntry};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// Fine-grained personal access tokens use the Bearer scheme.
const FINE_GRAINED_PREFIX: &str = "github_pat_";

/// Parse a GitHub browser URL.
///
/// Supports:
/// - `https://github.com/owner/repo`
/// - `https://github.com/owner/repo/tree/branch`
/// - `https://github.com/owner/repo/blob/branch/path`
/// - `https://github.com/owner/repo/commit/sha`
pub fn parse_repo_url(repo_url: &str) -> Result<RepoLocation, PlatformError> {
    let invalid = || PlatformError::InvalidUrl {
        platform: Platform::GitHub,
        url: repo_url.to_string(),
    };

    let segments = url_path_segments(repo_url).ok_or_else(invalid)?;
    if segments.len() < 2 {
        return Err(invalid());
    }

    let git_ref = match segments.get(2).map(String::as_str) {
        Some("tree" | "blob" | "commit") => segments.get(3).cloned(),
        _ => None,
    };

    Ok(RepoLocation {
        owner: segments[0].clone(),
        repo: trim_git_suffix(&segments[1]),
        git_ref,
    })
}

/// `Authorization` header value for a GitHub token.
pub fn authorization_header(token: &str) -> String {
    let scheme = if token.starts_with(FINE_GRAINED_PREFIX) {
        "Bearer"
    } else {
        "token"
    };
    format!("{} {}", scheme, token)
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    #[serde(default)]
    tree: Option<Vec<TreeEntry>>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Debug, Deserialize)]
struct CodeSearchResponse {
    #[serde(default)]
    total_count: u64,
    #[serde(default)]
    items: Vec<CodeSearchItem>,
}

#[derive(Debug, Deserialize)]
struct CodeSearchItem {
    path: String,
    name: String,
    #[serde(default)]
    html_url: String,
}

/// Client for the GitHub REST API.
pub struct GitHubClient {
    http: reqwest::Client,
    api_base: Url,
}

impl GitHubClient {
    pub fn new(config: &GitHubConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("ask-github/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to create GitHub HTTP client")?;

        Ok(Self {
            http,
            api_base: parse_base_url(&config.api_base)?,
        })
    }

    fn endpoint<I>(&self, segments: I) -> Url
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        join_segments(&self.api_base, segments)
    }

    fn contents_url(&self, owner: &str, repo: &str, path: &str) -> Url {
        let path = normalize_repo_path(path);
        self.endpoint(
            ["repos", owner, repo, "contents"]
                .into_iter()
                .chain(path.split('/').filter(|s| !s.is_empty())),
        )
    }

    async fn get_json(
        &self,
        url: Url,
        query: &[(&str, String)],
        token: Option<&str>,
    ) -> Result<Value, PlatformError> {
        let url_str = url.to_string();
        let mut request = self
            .http
            .get(url)
            .header("Accept", "application/vnd.github+json")
            .query(query);
        if let Some(token) = token {
            request = request.header("Authorization", authorization_header(token));
        }

        let response = send(request, &url_str).await?;
        read_json(response, &url_str).await
    }
}

fn ref_query(git_ref: Option<&str>) -> Vec<(&'static str, String)> {
    git_ref
        .map(|r| vec![("ref", r.to_string())])
        .unwrap_or_default()
}

#[async_trait]
impl RepoHost for GitHubClient {
    fn platform(&self) -> Platform {
        Platform::GitHub
    }

    fn parse_url(&self, repo_url: &str) -> Result<RepoLocation, PlatformError> {
        parse_repo_url(repo_url)
    }

    async fn get_repo_info(
        &self,
        owner: &str,
        repo: &str,
        token: Option<&str>,
    ) -> Result<RepoInfo, PlatformError> {
        let url = self.endpoint(["repos", owner, repo]);
        debug!("[get_repo_info] GET {}", url);

        let info = RepoInfo::from_metadata(self.get_json(url, &[], token).await?);
        debug!("[get_repo_info] Got default_branch: {:?}", info.default_branch);
        Ok(info)
    }

    async fn read_file(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        git_ref: Option<&str>,
        token: Option<&str>,
    ) -> Result<String, PlatformError> {
        let url = self.contents_url(owner, repo, path);
        let url_str = url.to_string();
        debug!("[read_file] GET {}", url);

        let data = self.get_json(url, &ref_query(git_ref), token).await?;
        // Files over 1 MB come back without inline content.
        if data.get("encoding").and_then(Value::as_str) == Some("none") {
            let size = data.get("size").and_then(Value::as_u64).unwrap_or_default();
            return Err(PlatformError::decode(
                &url_str,
                format!("file is too large to read through the contents API ({} bytes)", size),
            ));
        }
        match data.get("content").and_then(Value::as_str) {
            Some(encoded) if data.is_object() => {
                let content = decode_base64_content(encoded, &url_str)?;
                debug!("[read_file] Read {} chars", content.len());
                Ok(content)
            }
            _ => Err(PlatformError::NotAFile(path.to_string())),
        }
    }

    async fn list_directory(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        git_ref: Option<&str>,
        token: Option<&str>,
    ) -> Result<Vec<DirectoryEntry>, PlatformError> {
        let url = self.contents_url(owner, repo, path);
        let url_str = url.to_string();
        debug!("[list_directory] GET {}", url);

        let data = self.get_json(url, &ref_query(git_ref), token).await?;
        if !data.is_array() {
            return Err(PlatformError::NotADirectory(path.to_string()));
        }

        let entries: Vec<DirectoryEntry> =
            serde_json::from_value(data).map_err(|e| PlatformError::decode(&url_str, e))?;
        debug!("[list_directory] Found {} items", entries.len());
        Ok(entries)
    }

    async fn list_tree(
        &self,
        owner: &str,
        repo: &str,
        git_ref: &str,
        recursive: bool,
        token: Option<&str>,
    ) -> Result<Vec<TreeEntry>, PlatformError> {
        let url = self.endpoint(["repos", owner, repo, "git", "trees", git_ref]);
        let url_str = url.to_string();
        debug!("[list_tree] GET {}", url);

        let query = if recursive {
            vec![("recursive", "1".to_string())]
        } else {
            Vec::new()
        };

        let data = self.get_json(url, &query, token).await?;
        let response: TreeResponse =
            serde_json::from_value(data).map_err(|e| PlatformError::decode(&url_str, e))?;

        if response.truncated {
            warn!(
                "Tree for {}/{}@{} was truncated by GitHub; listing is incomplete",
                owner, repo, git_ref
            );
        }

        let entries = response.tree.unwrap_or_default();
        debug!("[list_tree] Found {} items", entries.len());
        Ok(entries)
    }

    async fn search_code(
        &self,
        owner: &str,
        repo: &str,
        query: &str,
        per_page: u32,
        page: u32,
        token: Option<&str>,
    ) -> Result<SearchResults, PlatformError> {
        let url = self.endpoint(["search", "code"]);
        let url_str = url.to_string();
        debug!("[search_code] GET {} (q={})", url, query);

        let params = [
            ("q", format!("{} repo:{}/{}", query, owner, repo)),
            ("per_page", per_page.to_string()),
            ("page", page.to_string()),
        ];

        let data = self.get_json(url, &params, token).await?;
        let response: CodeSearchResponse =
            serde_json::from_value(data).map_err(|e| PlatformError::decode(&url_str, e))?;

        let results = SearchResults {
            total_count: response.total_count,
            items: response
                .items
                .into_iter()
                .map(|item| SearchHit {
                    path: item.path,
                    name: item.name,
                    url: item.html_url,
                })
                .collect(),
        };
        debug!("[search_code] Found {} results", results.total_count);
        Ok(results)
    }
}

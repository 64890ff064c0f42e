//! GitLab REST adapter.
//!
//! GitLab addresses projects by their URL-encoded full path
//! (`group%2Fsubgroup%2Fproject`) and paginates tree listings, so listings
//! follow the `x-next-page` header until it is empty.

use super::{
    decode_base64_content, join_segments, normalize_repo_path, parse_base_url, read_json, send,
    trim_git_suffix, url_path_segments, Platform, RepoHost, RepoLocation,
};
use crate::config::GitLabConfig;
use crate::error::PlatformError;
use crate::models::{DirectoryEntry, RepoInfo, SearchHit, SearchResults, TreeEntry};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;
use url::Url;

pub const DEFAULT_API_BASE: &str = "https://gitlab.com/api/v4";
pub const DEFAULT_WEB_BASE: &str = "https://gitlab.com";

const PAGE_SIZE: &str = "100";

/// GitLab requires a ref on file and tree endpoints.
const DEFAULT_REF: &str = "HEAD";

/// Parse a GitLab browser URL.
///
/// Supports nested groups and the `/-/` separator:
/// - `https://gitlab.com/owner/repo`
/// - `https://gitlab.com/group/subgroup/repo`
/// - `https://gitlab.com/owner/repo/-/tree/branch`
/// - `https://gitlab.com/owner/repo/-/blob/branch/path`
/// - `https://gitlab.com/owner/repo/-/commit/sha`
pub fn parse_repo_url(repo_url: &str) -> Result<RepoLocation, PlatformError> {
    let invalid = || PlatformError::InvalidUrl {
        platform: Platform::GitLab,
        url: repo_url.to_string(),
    };

    let segments = url_path_segments(repo_url).ok_or_else(invalid)?;
    let separator = segments.iter().position(|s| s == "-");
    let project_path = &segments[..separator.unwrap_or(segments.len())];
    if project_path.len() < 2 {
        return Err(invalid());
    }

    let git_ref = separator.and_then(|idx| match segments.get(idx + 1).map(String::as_str) {
        Some("tree" | "blob" | "commit") => segments.get(idx + 2).cloned(),
        _ => None,
    });

    let (repo, namespace) = project_path.split_last().ok_or_else(invalid)?;
    Ok(RepoLocation {
        owner: namespace.join("/"),
        repo: trim_git_suffix(repo),
        git_ref,
    })
}

#[derive(Debug, Deserialize)]
struct BlobSearchItem {
    #[serde(default)]
    path: String,
    #[serde(default)]
    filename: String,
    #[serde(default, rename = "ref")]
    git_ref: Option<String>,
}

/// Client for the GitLab REST API (v4).
pub struct GitLabClient {
    http: reqwest::Client,
    api_base: Url,
    web_base: Url,
}

impl GitLabClient {
    pub fn new(config: &GitLabConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("ask-github/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to create GitLab HTTP client")?;

        Ok(Self {
            http,
            api_base: parse_base_url(&config.api_base)?,
            web_base: parse_base_url(&config.web_base)?,
        })
    }

    /// `/projects/{owner%2Frepo}/...`
    fn project_url(&self, owner: &str, repo: &str, rest: &[&str]) -> Url {
        let project = format!("{}/{}", owner, repo);
        join_segments(
            &self.api_base,
            ["projects", project.as_str()]
                .into_iter()
                .chain(rest.iter().copied()),
        )
    }

    fn request(
        &self,
        url: Url,
        query: &[(&str, String)],
        token: Option<&str>,
    ) -> reqwest::RequestBuilder {
        let mut request = self.http.get(url).query(query);
        if let Some(token) = token {
            request = request.header("PRIVATE-TOKEN", token);
        }
        request
    }

    async fn get_json(
        &self,
        url: Url,
        query: &[(&str, String)],
        token: Option<&str>,
    ) -> Result<(reqwest::header::HeaderMap, Value), PlatformError> {
        let url_str = url.to_string();
        let response = send(self.request(url, query, token), &url_str).await?;
        let headers = response.headers().clone();
        Ok((headers, read_json(response, &url_str).await?))
    }

    /// Fetch every page of a list endpoint.
    ///
    /// Returns `None` when the first page is not a JSON array.
    async fn get_paginated(
        &self,
        url: Url,
        query: &[(&str, String)],
        token: Option<&str>,
    ) -> Result<Option<Vec<Value>>, PlatformError> {
        let mut items = Vec::new();
        let mut page: u32 = 1;

        loop {
            let mut params = query.to_vec();
            params.push(("per_page", PAGE_SIZE.to_string()));
            params.push(("page", page.to_string()));

            let (headers, data) = self.get_json(url.clone(), &params, token).await?;
            let batch = match data {
                Value::Array(batch) => batch,
                _ if page == 1 => return Ok(None),
                _ => break,
            };

            if batch.is_empty() {
                break;
            }
            items.extend(batch);

            let has_next = headers
                .get("x-next-page")
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| !v.trim().is_empty());
            if !has_next {
                break;
            }

            page += 1;
        }

        debug!("Fetched {} items over {} page(s)", items.len(), page);
        Ok(Some(items))
    }

    fn blob_url(&self, owner: &str, repo: &str, git_ref: &str, path: &str) -> String {
        join_segments(
            &self.web_base,
            owner
                .split('/')
                .chain([repo, "-", "blob", git_ref])
                .chain(path.split('/')),
        )
        .to_string()
    }
}

#[async_trait]
impl RepoHost for GitLabClient {
    fn platform(&self) -> Platform {
        Platform::GitLab
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
        let url = self.project_url(owner, repo, &[]);
        debug!("[get_repo_info] GET {}", url);

        let (_, data) = self.get_json(url, &[], token).await?;
        let info = RepoInfo::from_metadata(data);
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
        let file_path = normalize_repo_path(path);
        let url = self.project_url(owner, repo, &["repository", "files", file_path]);
        let url_str = url.to_string();
        debug!("[read_file] GET {}", url);

        let query = [("ref", git_ref.unwrap_or(DEFAULT_REF).to_string())];
        let (_, data) = self.get_json(url, &query, token).await?;

        match data.get("content").and_then(Value::as_str) {
            Some(encoded) => {
                let content = decode_base64_content(encoded, &url_str)?;
                debug!("[read_file] Read {} chars", content.len());
                Ok(content)
            }
            None => Err(PlatformError::NotAFile(path.to_string())),
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
        let url = self.project_url(owner, repo, &["repository", "tree"]);
        let url_str = url.to_string();
        debug!("[list_directory] GET {}", url);

        let mut query = vec![("ref", git_ref.unwrap_or(DEFAULT_REF).to_string())];
        let dir = normalize_repo_path(path);
        if !dir.is_empty() {
            query.push(("path", dir.to_string()));
        }

        let items = self
            .get_paginated(url, &query, token)
            .await?
            .ok_or_else(|| PlatformError::NotADirectory(path.to_string()))?;

        let entries: Vec<DirectoryEntry> = serde_json::from_value(Value::Array(items))
            .map_err(|e| PlatformError::decode(&url_str, e))?;
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
        let url = self.project_url(owner, repo, &["repository", "tree"]);
        let url_str = url.to_string();
        debug!("[list_tree] GET {}", url);

        let mut query = vec![("ref", git_ref.to_string())];
        if recursive {
            query.push(("recursive", "true".to_string()));
        }

        let Some(items) = self.get_paginated(url, &query, token).await? else {
            return Ok(Vec::new());
        };

        let entries: Vec<TreeEntry> = serde_json::from_value(Value::Array(items))
            .map_err(|e| PlatformError::decode(&url_str, e))?;

        // Pages can overlap when the tree changes between requests.
        let mut seen = HashSet::new();
        let entries: Vec<TreeEntry> = entries
            .into_iter()
            .filter(|entry| seen.insert(entry.path.clone()))
            .collect();
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
        let url = self.project_url(owner, repo, &["search"]);
        let url_str = url.to_string();
        debug!("[search_code] GET {} (search={})", url, query);

        let params = [
            ("scope", "blobs".to_string()),
            ("search", query.to_string()),
            ("per_page", per_page.to_string()),
            ("page", page.to_string()),
        ];

        let (headers, data) = self.get_json(url, &params, token).await?;
        let items: Vec<BlobSearchItem> = if data.is_array() {
            serde_json::from_value(data).map_err(|e| PlatformError::decode(&url_str, e))?
        } else {
            Vec::new()
        };

        let hits: Vec<SearchHit> = items
            .into_iter()
            .map(|item| {
                let git_ref = item.git_ref.as_deref().unwrap_or(DEFAULT_REF);
                SearchHit {
                    url: self.blob_url(owner, repo, git_ref, &item.path),
                    path: item.path,
                    name: item.filename,
                }
            })
            .collect();

        // GitLab reports the total in a header rather than the body.
        let total_count = headers
            .get("x-total")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(hits.len() as u64);

        debug!("[search_code] Found {} results", total_count);
        Ok(SearchResults {
            total_count,
            items: hits,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn setup() -> (MockServer, GitLabClient) {
        let server = MockServer::start().await;
        let client = GitLabClient::new(&GitLabConfig {
            api_base: format!("{}/api/v4", server.uri()),
            web_base: "https://gitlab.example.com".to_string(),
            timeout_seconds: 5,
        })
        .unwrap();
        (server, client)
    }

    #[test]
    fn test_parse_plain_url() {
        let location = parse_repo_url("https://gitlab.com/gitlab-org/gitlab").unwrap();
        assert_eq!(location.owner, "gitlab-org");
        assert_eq!(location.repo, "gitlab");
        assert_eq!(location.git_ref, None);
    }

    #[test]
    fn test_parse_url_refs() {
        let tree = parse_repo_url("https://gitlab.com/o/r/-/tree/dev").unwrap();
        assert_eq!(tree.git_ref.as_deref(), Some("dev"));

        let blob = parse_repo_url("https://gitlab.com/o/r/-/blob/v2/README.md").unwrap();
        assert_eq!(blob.git_ref.as_deref(), Some("v2"));

        let commit = parse_repo_url("https://gitlab.com/o/r/-/commit/deadbeef").unwrap();
        assert_eq!(commit.git_ref.as_deref(), Some("deadbeef"));

        let issues = parse_repo_url("https://gitlab.com/o/r/-/issues/1").unwrap();
        assert_eq!(issues.git_ref, None);
    }

    #[test]
    fn test_parse_nested_groups() {
        let location =
            parse_repo_url("https://gitlab.com/group/subgroup/project.git/-/tree/main").unwrap();
        assert_eq!(location.owner, "group/subgroup");
        assert_eq!(location.repo, "project");
        assert_eq!(location.git_ref.as_deref(), Some("main"));
    }

    #[test]
    fn test_parse_invalid_url() {
        assert!(parse_repo_url("https://gitlab.com/lonely").is_err());
        assert!(parse_repo_url("https://gitlab.com/lonely/-/tree/main").is_err());
    }

    #[tokio::test]
    async fn test_get_repo_info_uses_encoded_project_path() {
        let (server, client) = setup().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/projects/acme%2Fwidget"))
            .and(header("PRIVATE-TOKEN", "glpat-x"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"id": 7, "default_branch": "develop"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let info = client
            .get_repo_info("acme", "widget", Some("glpat-x"))
            .await
            .unwrap();
        assert_eq!(info.default_branch.as_deref(), Some("develop"));
    }

    #[tokio::test]
    async fn test_read_file() {
        let (server, client) = setup().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/projects/acme%2Fwidget/repository/files/src%2Fmain.rs"))
            .and(query_param("ref", "main"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "file_name": "main.rs",
                "encoding": "base64",
                "content": "W3BhY2thZ2VdCg=="
            })))
            .mount(&server)
            .await;

        let content = client
            .read_file("acme", "widget", "src/main.rs", Some("main"), None)
            .await
            .unwrap();
        assert_eq!(content, "[package]\n");
    }

    #[tokio::test]
    async fn test_read_file_without_ref_sends_head() {
        let (server, client) = setup().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/projects/acme%2Fwidget/repository/files/README.md"))
            .and(query_param("ref", "HEAD"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"content": ""})))
            .expect(1)
            .mount(&server)
            .await;

        let content = client
            .read_file("acme", "widget", "README.md", None, None)
            .await
            .unwrap();
        assert_eq!(content, "");
    }

    #[tokio::test]
    async fn test_list_directory() {
        let (server, client) = setup().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/projects/acme%2Fwidget/repository/tree"))
            .and(query_param("path", "src"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "a", "name": "main.rs", "type": "blob", "path": "src/main.rs", "mode": "100644"}
            ])))
            .mount(&server)
            .await;

        let entries = client
            .list_directory("acme", "widget", "src", Some("main"), None)
            .await
            .unwrap();
        assert_eq!(
            entries,
            vec![DirectoryEntry {
                name: "main.rs".to_string(),
                entry_type: "blob".to_string(),
                path: "src/main.rs".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_list_tree_follows_pagination_without_duplicates() {
        let (server, client) = setup().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/projects/acme%2Fwidget/repository/tree"))
            .and(query_param("recursive", "true"))
            .and(query_param("page", "1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-next-page", "2")
                    .set_body_json(json!([
                        {"path": "Cargo.toml", "type": "blob"},
                        {"path": "src", "type": "tree"}
                    ])),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v4/projects/acme%2Fwidget/repository/tree"))
            .and(query_param("page", "2"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-next-page", "")
                    .set_body_json(json!([
                        {"path": "src", "type": "tree"},
                        {"path": "src/main.rs", "type": "blob"}
                    ])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let tree = client
            .list_tree("acme", "widget", "main", true, None)
            .await
            .unwrap();
        let paths: Vec<_> = tree.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["Cargo.toml", "src", "src/main.rs"]);
    }

    #[tokio::test]
    async fn test_list_tree_empty_first_page() {
        let (server, client) = setup().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/projects/acme%2Fwidget/repository/tree"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let tree = client
            .list_tree("acme", "widget", "main", false, None)
            .await
            .unwrap();
        assert!(tree.is_empty());
    }

    #[tokio::test]
    async fn test_search_code_builds_blob_urls() {
        let (server, client) = setup().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/projects/acme%2Fwidget/search"))
            .and(query_param("scope", "blobs"))
            .and(query_param("search", "tokio"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-total", "42")
                    .set_body_json(json!([{
                        "basename": "main",
                        "data": "use tokio;",
                        "path": "src/main.rs",
                        "filename": "main.rs",
                        "ref": "main",
                        "startline": 1,
                        "project_id": 7
                    }])),
            )
            .mount(&server)
            .await;

        let results = client
            .search_code("acme", "widget", "tokio", 30, 1, None)
            .await
            .unwrap();
        assert_eq!(results.total_count, 42);
        assert_eq!(results.items[0].name, "main.rs");
        assert_eq!(
            results.items[0].url,
            "https://gitlab.example.com/acme/widget/-/blob/main/src/main.rs"
        );
    }
}

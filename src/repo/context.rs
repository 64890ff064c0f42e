//! Repository context resolution.
//!
//! Resolution runs once per question, before the agent loop starts: the URL
//! is parsed, a token is picked, and the ref is fixed. The resulting
//! [`RepositoryContext`] never changes afterwards.

use super::{Platform, RepoHost};
use crate::error::PlatformError;
use tracing::{debug, info, warn};

/// Ref used when the platform reports no default branch (empty repositories).
pub const FALLBACK_REF: &str = "HEAD";

/// Everything the tools need to address one repository snapshot.
#[derive(Clone, PartialEq, Eq)]
pub struct RepositoryContext {
    pub platform: Platform,
    pub owner: String,
    pub repo: String,
    pub git_ref: String,
    pub token: Option<String>,
}

// Keep tokens out of debug logs.
impl std::fmt::Debug for RepositoryContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryContext")
            .field("platform", &self.platform)
            .field("owner", &self.owner)
            .field("repo", &self.repo)
            .field("git_ref", &self.git_ref)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl RepositoryContext {
    /// `owner/repo`.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }
}

/// Explicit token, then the platform's environment variable, then none.
pub fn resolve_token(platform: Platform, explicit: Option<&str>) -> Option<String> {
    resolve_token_with(platform, explicit, |name| std::env::var(name).ok())
}

/// [`resolve_token`] with an injectable environment lookup.
pub fn resolve_token_with<F>(platform: Platform, explicit: Option<&str>, lookup: F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |value: String| {
        let value = value.trim().to_string();
        (!value.is_empty()).then_some(value)
    };

    explicit
        .map(String::from)
        .and_then(non_empty)
        .or_else(|| lookup(platform.token_env_var()).and_then(non_empty))
}

/// Parse the URL with the host's grammar and pin the ref.
///
/// A ref in the URL is used as-is. Otherwise the default branch is looked
/// up exactly once through the repository metadata.
pub async fn resolve_context(
    host: &dyn RepoHost,
    repo_url: &str,
    token: Option<String>,
) -> Result<RepositoryContext, PlatformError> {
    let location = host.parse_url(repo_url)?;
    debug!(
        "Parsed {} -> {}/{} (ref: {:?})",
        repo_url, location.owner, location.repo, location.git_ref
    );

    let git_ref = match location.git_ref {
        Some(git_ref) => git_ref,
        None => {
            let info = host
                .get_repo_info(&location.owner, &location.repo, token.as_deref())
                .await?;
            match info.default_branch {
                Some(branch) => {
                    info!("Using default branch {}", branch);
                    branch
                }
                None => {
                    warn!(
                        "{}/{} reports no default branch, using {}",
                        location.owner, location.repo, FALLBACK_REF
                    );
                    FALLBACK_REF.to_string()
                }
            }
        }
    };

    Ok(RepositoryContext {
        platform: host.platform(),
        owner: location.owner,
        repo: location.repo,
        git_ref,
        token,
    })
}

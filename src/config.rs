//! Configuration file handling.
//!
//! This module handles loading configuration from `.ask-github.toml`
//! files and turning it into the options used by [`crate::ask`].

use crate::llm::CompletionOptions;
use crate::repo::{github, gitlab};
use crate::AskOptions;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = ".ask-github.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Agent loop settings.
    #[serde(default)]
    pub agent: AgentSettings,

    /// Completion endpoint settings.
    #[serde(default)]
    pub llm: CompletionOptions,

    /// GitHub API settings.
    #[serde(default)]
    pub github: GitHubConfig,

    /// GitLab API settings.
    #[serde(default)]
    pub gitlab: GitLabConfig,
}

/// Agent loop budget settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Maximum number of completion rounds.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Maximum tool calls executed concurrently within one round.
    #[serde(default = "default_max_parallel_tools")]
    pub max_parallel_tools: usize,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_parallel_tools: default_max_parallel_tools(),
        }
    }
}

pub(crate) fn default_max_iterations() -> usize {
    20
}

pub(crate) fn default_max_parallel_tools() -> usize {
    15
}

/// GitHub REST API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// API base URL (GitHub Enterprise uses `https://host/api/v3`).
    #[serde(default = "default_github_api_base")]
    pub api_base: String,

    /// Request timeout in seconds.
    #[serde(default = "default_host_timeout")]
    pub timeout_seconds: u64,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_base: default_github_api_base(),
            timeout_seconds: default_host_timeout(),
        }
    }
}

fn default_github_api_base() -> String {
    github::DEFAULT_API_BASE.to_string()
}

/// GitLab REST API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitLabConfig {
    /// API base URL.
    #[serde(default = "default_gitlab_api_base")]
    pub api_base: String,

    /// Web base URL used for search result links.
    #[serde(default = "default_gitlab_web_base")]
    pub web_base: String,

    /// Request timeout in seconds.
    #[serde(default = "default_host_timeout")]
    pub timeout_seconds: u64,
}

impl Default for GitLabConfig {
    fn default() -> Self {
        Self {
            api_base: default_gitlab_api_base(),
            web_base: default_gitlab_web_base(),
            timeout_seconds: default_host_timeout(),
        }
    }
}

fn default_gitlab_api_base() -> String {
    gitlab::DEFAULT_API_BASE.to_string()
}

fn default_gitlab_web_base() -> String {
    gitlab::DEFAULT_WEB_BASE.to_string()
}

fn default_host_timeout() -> u64 {
    30
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        Self::load_from_dir(Path::new("."))
    }

    /// Try to load `.ask-github.toml` from a directory.
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>> {
        let config_path = dir.join(CONFIG_FILE_NAME);

        if config_path.exists() {
            Ok(Some(Self::load(&config_path)?))
        } else {
            Ok(None)
        }
    }

    /// Build the options for one question.
    pub fn ask_options(&self, token: Option<String>) -> AskOptions {
        AskOptions {
            max_iterations: self.agent.max_iterations,
            max_parallel_tools: self.agent.max_parallel_tools,
            token,
            completion: self.llm.clone(),
            github: self.github.clone(),
            gitlab: self.gitlab.clone(),
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap, plus the
//! free-form `--llm-<key> <value>` options that are split off before clap
//! sees the command line.

use ask_github::config::Config;
use ask_github::llm::{normalize_key, LlmValue, OverrideError};
use clap::Parser;
use std::ffi::OsString;
use std::path::PathBuf;
use thiserror::Error;

const LLM_PREFIX: &str = "--llm-";

/// Ask questions about GitHub and GitLab repositories
///
/// A language model explores the repository with read-only tools (tree
/// listing, file reads, code search) and answers your question.
///
/// Any `--llm-<key> <value>` option is passed to the completion endpoint,
/// e.g. `--llm-model gpt-4o --llm-temperature 0.2`.
///
/// Examples:
///   ask-github https://github.com/owner/repo "What build system does this use?"
///   ask-github https://gitlab.com/group/project/-/tree/dev "Where is auth handled?"
///   ask-github https://github.com/owner/repo --tree
///   ask-github --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Repository URL (GitHub or GitLab), optionally with /tree/<ref>
    #[arg(value_name = "REPO_URL", required_unless_present = "init_config")]
    pub repo_url: Option<String>,

    /// Question to ask about the repository
    #[arg(value_name = "PROMPT", required_unless_present_any = ["init_config", "tree"])]
    pub prompt: Option<String>,

    /// Maximum number of completion rounds [default: 20]
    #[arg(long, value_name = "N")]
    pub max_iterations: Option<usize>,

    /// Maximum tool calls run at once within a round [default: 15]
    #[arg(long, value_name = "N")]
    pub max_parallel_tools: Option<usize>,

    /// GitHub or GitLab token
    ///
    /// Falls back to GITHUB_TOKEN or GITLAB_TOKEN for the detected platform.
    #[arg(long, env = "ASK_GITHUB_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .ask-github.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (errors only, no spinner)
    #[arg(short, long)]
    pub quiet: bool,

    /// Print the repository tree instead of asking a question
    #[arg(long)]
    pub tree: bool,

    /// Generate a default .ask-github.toml configuration file
    #[arg(long)]
    pub init_config: bool,

    /// Completion options collected from `--llm-<key> <value>` pairs.
    #[arg(skip)]
    pub llm_overrides: Vec<(String, LlmValue)>,
}

/// Command line could not be parsed.
#[derive(Debug, Error)]
pub enum ArgsError {
    #[error(transparent)]
    Clap(#[from] clap::Error),

    #[error(transparent)]
    Override(#[from] OverrideError),
}

/// Split `--llm-<key> <value>` and `--llm-<key>=<value>` pairs out of argv.
///
/// Everything after a bare `--` is left alone.
pub fn split_llm_overrides<I>(argv: I) -> Result<(Vec<String>, Vec<(String, LlmValue)>), OverrideError>
where
    I: IntoIterator<Item = String>,
{
    let mut rest = Vec::new();
    let mut overrides = Vec::new();
    let mut argv = argv.into_iter();

    while let Some(arg) = argv.next() {
        if arg == "--" {
            rest.push(arg);
            rest.extend(argv.by_ref());
            break;
        }

        let Some(option) = arg.strip_prefix(LLM_PREFIX) else {
            rest.push(arg);
            continue;
        };

        let (key, raw) = match option.split_once('=') {
            Some((key, value)) => (key.to_string(), value.to_string()),
            None => {
                let value = match argv.next() {
                    Some(value) if !value.starts_with("--") => value,
                    _ => return Err(OverrideError::MissingValue(option.to_string())),
                };
                (option.to_string(), value)
            }
        };

        let key = normalize_key(&key);
        if key.is_empty() {
            return Err(OverrideError::EmptyKey);
        }
        overrides.push((key, LlmValue::parse(&raw)));
    }

    Ok((rest, overrides))
}

/// Arguments as text; invalid UTF-8 is replaced rather than panicking.
fn lossy_argv<I>(argv: I) -> Vec<String>
where
    I: IntoIterator<Item = OsString>,
{
    argv.into_iter()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect()
}

impl Args {
    /// Parse command-line arguments, exiting on clap errors.
    pub fn parse_args() -> Result<Self, OverrideError> {
        match Self::from_argv(lossy_argv(std::env::args_os())) {
            Ok(args) => Ok(args),
            Err(ArgsError::Clap(e)) => e.exit(),
            Err(ArgsError::Override(e)) => Err(e),
        }
    }

    /// Parse an explicit argv (program name first).
    pub fn from_argv<I>(argv: I) -> Result<Self, ArgsError>
    where
        I: IntoIterator<Item = String>,
    {
        let (rest, overrides) = split_llm_overrides(argv)?;
        let mut args = Self::try_parse_from(rest)?;
        args.llm_overrides = overrides;
        Ok(args)
    }

    pub fn repo_url(&self) -> &str {
        self.repo_url.as_deref().unwrap_or("")
    }

    pub fn prompt(&self) -> &str {
        self.prompt.as_deref().unwrap_or("")
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config {
            return Ok(());
        }

        if self.repo_url().trim().is_empty() {
            return Err("Repository URL must not be empty".to_string());
        }

        if !self.tree && self.prompt().trim().is_empty() {
            return Err("Prompt must not be empty".to_string());
        }

        if self.max_parallel_tools == Some(0) {
            return Err("--max-parallel-tools must be at least 1".to_string());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        Ok(())
    }

    /// The spinner owns stderr while a question is being answered.
    pub fn shows_spinner(&self) -> bool {
        !self.quiet && !self.verbose && !self.tree && !self.init_config
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else if self.shows_spinner() {
            tracing::Level::WARN
        } else {
            tracing::Level::INFO
        }
    }

    /// Apply flags over a loaded config, then the `--llm-*` overrides.
    pub fn merge_into(&self, config: &mut Config) -> Result<(), OverrideError> {
        if let Some(max_iterations) = self.max_iterations {
            config.agent.max_iterations = max_iterations;
        }
        if let Some(max_parallel_tools) = self.max_parallel_tools {
            config.agent.max_parallel_tools = max_parallel_tools;
        }
        config.llm.apply_overrides(&self.llm_overrides)
    }
}

//! Typed errors for the hosting adapters and the tool dispatcher.

use crate::repo::Platform;
use thiserror::Error;

/// Failures raised by a repository hosting adapter.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("Invalid {platform} URL: {url}")]
    InvalidUrl { platform: Platform, url: String },

    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{status} from {url}: {body}")]
    Status {
        status: reqwest::StatusCode,
        url: String,
        body: String,
    },

    #[error("Path {0} is not a file")]
    NotAFile(String),

    #[error("Path {0} is not a directory")]
    NotADirectory(String),

    #[error("Failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },
}

impl PlatformError {
    pub(crate) fn decode(url: impl Into<String>, message: impl ToString) -> Self {
        PlatformError::Decode {
            url: url.into(),
            message: message.to_string(),
        }
    }
}

/// Failures raised while turning a tool call into an adapter call.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for {tool}: {source}")]
    InvalidArguments {
        tool: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Platform(#[from] PlatformError),
}

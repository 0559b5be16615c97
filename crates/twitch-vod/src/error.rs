use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("upstream timeout: {0}")]
    UpstreamTimeout(String),
    #[error("video not found: {0}")]
    NotFound(String),
    #[error("parse error: {0}")]
    ParseError(String),
    #[error("no url found in recovery output")]
    MatchNotFound,
    #[error("recovery timed out after {0:?}")]
    RecoveryTimeout(Duration),
    #[error("container error: {0}")]
    Container(#[from] ContainerError),
    #[error("http error: {0}")]
    Http(reqwest::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for ResolveError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::UpstreamTimeout(err.to_string())
        } else {
            Self::Http(err)
        }
    }
}

/// Failures of the container engine seam.
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("failed to spawn container engine: {0}")]
    Spawn(std::io::Error),
    #[error("{op} failed: {message}")]
    Command { op: &'static str, message: String },
    #[error("attached stream closed before a result was produced")]
    StreamClosed,
    #[error("stream io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ContainerError {
    pub fn command(op: &'static str, message: impl Into<String>) -> Self {
        Self::Command {
            op,
            message: message.into(),
        }
    }
}

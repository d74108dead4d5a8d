use std::path::PathBuf;

use thiserror::Error;

/// Reasons a download is refused before any process is spawned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidRequest {
    #[error("Please enter a video URL")]
    EmptyUrl,

    #[error("Please enter a valid HTTP/HTTPS URL")]
    NotHttp,

    #[error("{0} links are not supported by this build")]
    UnsupportedPlatform(String),

    #[error("{0} is not available yet, please wait for setup to complete")]
    ToolNotReady(String),

    #[error("Required tools are still being prepared")]
    ToolsNotReady,

    #[error("Select 'video only' and/or 'audio only', or enable combined video + audio")]
    NoStreamSelected,

    #[error("Separate video/audio downloads are disabled")]
    SeparateStreamsDisabled,

    #[error("Unknown quality '{0}' (expected best, worst or audio-only)")]
    UnknownQuality(String),

    #[error("A download is already running")]
    Busy,
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("settings file {path} is corrupt: {reason}")]
    ConfigCorrupt { path: PathBuf, reason: String },

    #[error("failed to download {tool} after {attempts} attempt(s): {last_error}")]
    ToolFetchFailed {
        tool: String,
        attempts: usize,
        last_error: String,
    },

    #[error("failed to extract {tool}: {reason}")]
    ArchiveExtractFailed { tool: String, reason: String },

    #[error("archive utility is missing, cannot unpack {tool}")]
    ArchiveUtilityMissing { tool: String },

    #[error(transparent)]
    InvalidRequest(#[from] InvalidRequest),

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("http error: {0}")]
    Http(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for CoreError {
    fn from(e: reqwest::Error) -> Self {
        CoreError::Http(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

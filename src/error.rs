//! Error type shared by the backend client, the download routine and the
//! manager. The registry only sees the outcome (`failed` / `cancelled`); the
//! variants exist for logs and for callers that want to react.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("resolving transfer url for video {video_id}: {source}")]
    Resolve {
        video_id: u64,
        #[source]
        source: reqwest::Error,
    },

    #[error("backend returned an unusable transfer url for video {video_id}: {value:?}")]
    UnusableUrl { video_id: u64, value: String },

    #[error("loading details for video {video_id}: {source}")]
    Metadata {
        video_id: u64,
        #[source]
        source: reqwest::Error,
    },

    #[error("opening transfer stream: {0}")]
    Open(#[source] reqwest::Error),

    #[error("reading transfer stream: {0}")]
    Stream(#[source] reqwest::Error),

    #[error("saving {path}: {source}")]
    Assembly {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("download of video {0} was cancelled")]
    Cancelled(u64),

    #[error("video {0} is already downloading")]
    AlreadyActive(u64),

    #[error("building http client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("download task for video {video_id} stopped unexpectedly: {reason}")]
    Task { video_id: u64, reason: String },
}

impl DownloadError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    pub(crate) fn assembly(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Assembly {
            path: path.into(),
            source,
        }
    }
}

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::metadata::VideoMetadata;

/// Lifecycle of a single download attempt. Every state but `Downloading` is
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    Downloading,
    Completed,
    Failed,
    Cancelled,
}

impl DownloadStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Downloading)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Downloading => "downloading",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Tracked state of one video download, as rendered by the Downloads page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRecord {
    pub id: u64,
    pub title: String,
    pub thumbnail_url: String,
    pub channel_name: String,
    pub duration: String,
    /// Whole percent, 0..=100.
    pub progress: u8,
    /// Expected payload size in bytes; 0 when the server did not say.
    pub file_size: u64,
    pub status: DownloadStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_to: Option<PathBuf>,
}

impl DownloadRecord {
    /// Fresh record for an attempt that is about to stream: progress 0,
    /// status `downloading`.
    pub fn new(id: u64, metadata: &VideoMetadata, file_size: u64) -> Self {
        Self {
            id,
            title: metadata.title.clone(),
            thumbnail_url: metadata.thumbnail_url.clone(),
            channel_name: metadata.channel_name.clone(),
            duration: metadata.duration.clone(),
            progress: 0,
            file_size,
            status: DownloadStatus::Downloading,
            started_at: Utc::now(),
            finished_at: None,
            saved_to: None,
        }
    }
}

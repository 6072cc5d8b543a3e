//! Video metadata as the backend serves it and as download records keep it.
//!
//! The backend's video entity carries far more than a download needs; only
//! the fields shown on the Downloads page are lifted into [`VideoMetadata`].
//! Field names on the wire follow the backend (`tile` is not a typo on our
//! side), so the serde renames below must stay in sync with it.

use serde::{Deserialize, Serialize};

/// Longest file stem we produce from a title, in characters.
const MAX_STEM_CHARS: usize = 120;
const FALLBACK_STEM: &str = "video";

/// Video entity returned by `GET /api/get-video-by-id/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoDetails {
    #[serde(rename = "tile", default)]
    pub title: String,
    #[serde(default)]
    pub video_thumbnail: String,
    #[serde(default)]
    pub video_channel_name: String,
    #[serde(default)]
    pub duration: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<i64>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl VideoDetails {
    pub fn metadata(&self) -> VideoMetadata {
        VideoMetadata {
            title: self.title.clone(),
            thumbnail_url: self.video_thumbnail.clone(),
            channel_name: self.video_channel_name.clone(),
            duration: self.duration.clone(),
        }
    }
}

/// Descriptive data copied into a download record when it is created.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoMetadata {
    pub title: String,
    pub thumbnail_url: String,
    pub channel_name: String,
    pub duration: String,
}

impl VideoMetadata {
    /// Filesystem-safe name for the saved video, without extension.
    ///
    /// Path separators, control characters and the characters Windows rejects
    /// become `_`; leading dots are stripped so the file is never hidden.
    pub fn file_stem(&self) -> String {
        let cleaned: String = self
            .title
            .chars()
            .map(|c| match c {
                '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
                c if c.is_control() => '_',
                c => c,
            })
            .take(MAX_STEM_CHARS)
            .collect();
        let trimmed = cleaned.trim().trim_start_matches('.').trim();
        if trimmed.is_empty() {
            FALLBACK_STEM.to_string()
        } else {
            trimmed.to_string()
        }
    }
}

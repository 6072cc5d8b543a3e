//! One end-to-end download: resolve the transfer URL, stream the payload,
//! report progress into the registry and save the file.

use std::path::PathBuf;

use reqwest::header::CONTENT_TYPE;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::progress::ProgressTracker;
use super::record::{DownloadRecord, DownloadStatus};
use super::registry::DownloadRegistry;
use super::sink::{ChunkSink, extension_for};
use crate::api::ApiClient;
use crate::config::Settings;
use crate::error::DownloadError;
use crate::metadata::VideoMetadata;

/// What the watch page knows about the video it wants to download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub video_id: u64,
    pub metadata: VideoMetadata,
}

impl DownloadRequest {
    pub fn new(video_id: u64, metadata: VideoMetadata) -> Self {
        Self { video_id, metadata }
    }
}

/// Runs a download to a terminal state.
///
/// Every error is caught here once. If the record was already registered by
/// this run it is moved to `failed`, or `cancelled` when `cancel` fired, and
/// keeps its last progress. Errors raised before registration leave the
/// registry untouched.
pub async fn run_download(
    api: &ApiClient,
    registry: &DownloadRegistry,
    settings: &Settings,
    request: &DownloadRequest,
    cancel: &CancellationToken,
) -> Result<PathBuf, DownloadError> {
    let id = request.video_id;
    let mut registered = false;

    let result = transfer(api, registry, settings, request, cancel, &mut registered).await;

    match &result {
        Ok(path) => {
            registry.mark_saved(id, path.clone());
            info!(video_id = id, path = %path.display(), "download completed");
        }
        Err(err) => {
            let status = if err.is_cancelled() {
                DownloadStatus::Cancelled
            } else {
                DownloadStatus::Failed
            };
            if registered {
                registry.update_status(id, status);
            }
            warn!(video_id = id, registered, error = %err, "download {}", status.label());
        }
    }
    result
}

/// Races `fut` against the cancellation token.
async fn or_cancel<T>(
    cancel: &CancellationToken,
    video_id: u64,
    fut: impl Future<Output = Result<T, DownloadError>>,
) -> Result<T, DownloadError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(DownloadError::Cancelled(video_id)),
        result = fut => result,
    }
}

async fn transfer(
    api: &ApiClient,
    registry: &DownloadRegistry,
    settings: &Settings,
    request: &DownloadRequest,
    cancel: &CancellationToken,
    registered: &mut bool,
) -> Result<PathBuf, DownloadError> {
    let id = request.video_id;
    info!(video_id = id, title = %request.metadata.title, "starting download");

    let url = or_cancel(cancel, id, api.download_url(id)).await?;
    let mut response = or_cancel(cancel, id, api.open_transfer(url)).await?;

    let total = response.content_length().unwrap_or(0);
    let ext = extension_for(
        response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok()),
    );

    registry.add_download(DownloadRecord::new(id, &request.metadata, total));
    *registered = true;

    let mut sink = ChunkSink::open(settings.buffering, &settings.download_dir, total).await?;
    let mut tracker = ProgressTracker::new(total);

    loop {
        let next = or_cancel(cancel, id, async {
            response.chunk().await.map_err(DownloadError::Stream)
        })
        .await?;
        let Some(chunk) = next else { break };

        sink.write(&chunk).await?;
        let progress = tracker.advance(chunk.len());
        registry.update_progress(id, progress);
    }
    debug!(
        video_id = id,
        received = tracker.received(),
        expected = tracker.total(),
        "stream finished"
    );

    if cancel.is_cancelled() {
        return Err(DownloadError::Cancelled(id));
    }
    sink.finish(&request.metadata.file_stem(), ext).await
}

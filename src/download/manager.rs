//! Entry point used by the UI: start a download for a video, cancel it, and
//! read the shared registry.

use std::{collections::HashMap, path::PathBuf, sync::Arc};

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::registry::DownloadRegistry;
use super::routine::{DownloadRequest, run_download};
use crate::api::ApiClient;
use crate::config::Settings;
use crate::error::DownloadError;

type ActiveTokens = Arc<Mutex<HashMap<u64, CancellationToken>>>;

#[derive(Debug, Clone)]
pub struct DownloadManager {
    api: ApiClient,
    registry: DownloadRegistry,
    settings: Arc<Settings>,
    active: ActiveTokens,
    shutdown: CancellationToken,
}

/// A running download. Dropping the handle detaches the task; it keeps
/// running and still settles its registry record.
#[derive(Debug)]
pub struct DownloadHandle {
    id: u64,
    cancel: CancellationToken,
    task: JoinHandle<Result<PathBuf, DownloadError>>,
}

impl DownloadHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Waits for the routine and returns where the file was saved.
    pub async fn wait(self) -> Result<PathBuf, DownloadError> {
        let video_id = self.id;
        self.task.await.map_err(|err| DownloadError::Task {
            video_id,
            reason: err.to_string(),
        })?
    }
}

/// Removes the active-token entry once the task ends, however it ends.
struct ActiveGuard {
    id: u64,
    active: ActiveTokens,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.active.lock().remove(&self.id);
    }
}

impl DownloadManager {
    pub fn new(api: ApiClient, registry: DownloadRegistry, settings: Settings) -> Self {
        Self {
            api,
            registry,
            settings: Arc::new(settings),
            active: Arc::new(Mutex::new(HashMap::new())),
            shutdown: CancellationToken::new(),
        }
    }

    /// Builds the API client from `settings` and starts with an empty
    /// registry.
    pub fn from_settings(settings: Settings) -> Result<Self, DownloadError> {
        let api = ApiClient::new(&settings)?;
        Ok(Self::new(api, DownloadRegistry::new(), settings))
    }

    pub fn registry(&self) -> &DownloadRegistry {
        &self.registry
    }

    /// Spawns the download routine for `request` on the current runtime.
    ///
    /// Only one download per video id runs at a time; a second start while
    /// the first is in flight fails with [`DownloadError::AlreadyActive`].
    /// After [`DownloadManager::shutdown`] every start fails as cancelled.
    pub fn start(&self, request: DownloadRequest) -> Result<DownloadHandle, DownloadError> {
        let id = request.video_id;
        if self.shutdown.is_cancelled() {
            return Err(DownloadError::Cancelled(id));
        }
        let cancel = self.shutdown.child_token();
        {
            let mut active = self.active.lock();
            if active.contains_key(&id) {
                return Err(DownloadError::AlreadyActive(id));
            }
            active.insert(id, cancel.clone());
        }

        let guard = ActiveGuard {
            id,
            active: self.active.clone(),
        };
        let api = self.api.clone();
        let registry = self.registry.clone();
        let settings = self.settings.clone();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            let _guard = guard;
            run_download(&api, &registry, &settings, &request, &token).await
        });
        debug!(video_id = id, "download task spawned");

        Ok(DownloadHandle { id, cancel, task })
    }

    /// Looks the video up on the backend and starts downloading it.
    pub async fn start_for_video(&self, video_id: u64) -> Result<DownloadHandle, DownloadError> {
        let details = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return Err(DownloadError::Cancelled(video_id)),
            details = self.api.video(video_id) => details?,
        };
        self.start(DownloadRequest::new(video_id, details.metadata()))
    }

    /// Signals the download of `video_id` to stop. Returns false when nothing
    /// is running for it.
    pub fn cancel(&self, video_id: u64) -> bool {
        match self.active.lock().get(&video_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) -> usize {
        let active = self.active.lock();
        for token in active.values() {
            token.cancel();
        }
        active.len()
    }

    /// Cancels every running download, interrupts pending lookups and
    /// refuses new starts. Returns how many downloads were running.
    pub fn shutdown(&self) -> usize {
        let running = self.active.lock().len();
        self.shutdown.cancel();
        running
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub fn active_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.active.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn is_active(&self, video_id: u64) -> bool {
        self.active.lock().contains_key(&video_id)
    }
}

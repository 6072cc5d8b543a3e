//! Client-side download management.
//!
//! - `registry`: observable store of download records for the session
//! - `routine`: one streamed download driving a record to a terminal state
//! - `manager`: spawns and cancels routines, one per video id at a time
//! - `sink`: in-memory or on-disk accumulation and the final save
//! - `progress`: percentage bookkeeping

mod manager;
mod progress;
mod record;
mod registry;
mod routine;
mod sink;

pub use manager::{DownloadHandle, DownloadManager};
pub use progress::{ProgressTracker, percent};
pub use record::{DownloadRecord, DownloadStatus};
pub use registry::{
    DownloadFilter, DownloadRegistry, DownloadSort, DownloadsPartition, DownloadsSummary,
    RegistryAction, format_bytes, reduce,
};
pub use routine::{DownloadRequest, run_download};
pub use sink::{ChunkSink, extension_for};

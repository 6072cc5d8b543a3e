//! Session-wide store of download records.
//!
//! The store is a `watch` channel over the full record list. Every mutation
//! goes through [`reduce`], a pure transition over the list, and subscribers
//! are only woken when a transition actually changed something. Records are
//! keyed by video id: adding an id that is already present replaces that
//! record in place, so restarting a download reuses its row.

use std::{path::PathBuf, sync::Arc};

use chrono::Utc;
use tokio::sync::watch;

use super::record::{DownloadRecord, DownloadStatus};

/// A single transition of the record list.
#[derive(Debug, Clone, PartialEq)]
pub enum RegistryAction {
    Add(DownloadRecord),
    UpdateProgress { id: u64, progress: u8 },
    MarkCompleted { id: u64, saved_to: Option<PathBuf> },
    UpdateStatus { id: u64, status: DownloadStatus },
    Remove(Vec<u64>),
    ClearFinished,
}

/// Applies `action` to `records`, returning whether anything changed.
pub fn reduce(records: &mut Vec<DownloadRecord>, action: RegistryAction) -> bool {
    match action {
        RegistryAction::Add(record) => {
            match records.iter().position(|existing| existing.id == record.id) {
                Some(index) => records[index] = record,
                None => records.push(record),
            }
            true
        }
        RegistryAction::UpdateProgress { id, progress } => {
            let progress = progress.min(100);
            match find_mut(records, id) {
                Some(record) if record.progress != progress => {
                    record.progress = progress;
                    true
                }
                _ => false,
            }
        }
        RegistryAction::MarkCompleted { id, saved_to } => match find_mut(records, id) {
            Some(record) => {
                record.status = DownloadStatus::Completed;
                record.progress = 100;
                record.finished_at = Some(Utc::now());
                if saved_to.is_some() {
                    record.saved_to = saved_to;
                }
                true
            }
            None => false,
        },
        RegistryAction::UpdateStatus { id, status } => match find_mut(records, id) {
            Some(record) if record.status != status => {
                record.status = status;
                record.finished_at = status.is_terminal().then(Utc::now);
                true
            }
            _ => false,
        },
        RegistryAction::Remove(ids) => {
            let before = records.len();
            records.retain(|record| !ids.contains(&record.id));
            records.len() != before
        }
        RegistryAction::ClearFinished => {
            let before = records.len();
            records.retain(|record| !record.status.is_terminal());
            records.len() != before
        }
    }
}

fn find_mut(records: &mut [DownloadRecord], id: u64) -> Option<&mut DownloadRecord> {
    records.iter_mut().find(|record| record.id == id)
}

/// Which records a Downloads view shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DownloadFilter {
    #[default]
    All,
    Completed,
    Downloading,
    Failed,
}

impl DownloadFilter {
    fn matches(self, record: &DownloadRecord) -> bool {
        match self {
            Self::All => true,
            Self::Completed => record.status == DownloadStatus::Completed,
            Self::Downloading => record.status == DownloadStatus::Downloading,
            Self::Failed => matches!(
                record.status,
                DownloadStatus::Failed | DownloadStatus::Cancelled
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DownloadSort {
    /// Newest first.
    #[default]
    Recent,
    Oldest,
    /// Title A-Z, case-insensitive.
    Name,
    /// Largest first.
    Size,
}

/// Records split the way the Downloads page lays them out.
#[derive(Debug, Clone, Default)]
pub struct DownloadsPartition {
    pub active: Vec<DownloadRecord>,
    pub completed: Vec<DownloadRecord>,
    pub failed: Vec<DownloadRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DownloadsSummary {
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
    /// Sum of `file_size` over completed records.
    pub completed_bytes: u64,
}

/// Cloneable handle onto the shared record list.
#[derive(Debug, Clone)]
pub struct DownloadRegistry {
    tx: Arc<watch::Sender<Vec<DownloadRecord>>>,
}

impl Default for DownloadRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DownloadRegistry {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Vec::new());
        Self { tx: Arc::new(tx) }
    }

    /// Applies an action and notifies subscribers if the list changed.
    pub fn dispatch(&self, action: RegistryAction) -> bool {
        self.tx.send_if_modified(|records| reduce(records, action))
    }

    pub fn add_download(&self, record: DownloadRecord) {
        self.dispatch(RegistryAction::Add(record));
    }

    pub fn update_progress(&self, id: u64, progress: u8) {
        self.dispatch(RegistryAction::UpdateProgress { id, progress });
    }

    pub fn mark_completed(&self, id: u64) {
        self.dispatch(RegistryAction::MarkCompleted { id, saved_to: None });
    }

    /// Completes the record and remembers where the file was written.
    pub fn mark_saved(&self, id: u64, path: PathBuf) {
        self.dispatch(RegistryAction::MarkCompleted {
            id,
            saved_to: Some(path),
        });
    }

    pub fn update_status(&self, id: u64, status: DownloadStatus) {
        self.dispatch(RegistryAction::UpdateStatus { id, status });
    }

    pub fn remove(&self, id: u64) -> bool {
        self.dispatch(RegistryAction::Remove(vec![id]))
    }

    pub fn remove_many(&self, ids: impl IntoIterator<Item = u64>) -> bool {
        self.dispatch(RegistryAction::Remove(ids.into_iter().collect()))
    }

    /// Drops every record in a terminal state.
    pub fn clear_finished(&self) -> bool {
        self.dispatch(RegistryAction::ClearFinished)
    }

    /// Live view of the list. The receiver starts with the current value
    /// marked as seen.
    pub fn subscribe(&self) -> watch::Receiver<Vec<DownloadRecord>> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> Vec<DownloadRecord> {
        self.tx.borrow().clone()
    }

    pub fn get(&self, id: u64) -> Option<DownloadRecord> {
        self.tx.borrow().iter().find(|record| record.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.tx.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.borrow().is_empty()
    }

    pub fn view(&self, filter: DownloadFilter, sort: DownloadSort) -> Vec<DownloadRecord> {
        let mut records: Vec<DownloadRecord> = self
            .tx
            .borrow()
            .iter()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect();
        match sort {
            DownloadSort::Recent => records.sort_by(|a, b| b.started_at.cmp(&a.started_at)),
            DownloadSort::Oldest => records.sort_by(|a, b| a.started_at.cmp(&b.started_at)),
            DownloadSort::Name => {
                records.sort_by_cached_key(|record| record.title.to_lowercase())
            }
            DownloadSort::Size => records.sort_by(|a, b| b.file_size.cmp(&a.file_size)),
        }
        records
    }

    pub fn partition(&self) -> DownloadsPartition {
        let mut partition = DownloadsPartition::default();
        for record in self.tx.borrow().iter() {
            let bucket = match record.status {
                DownloadStatus::Downloading => &mut partition.active,
                DownloadStatus::Completed => &mut partition.completed,
                DownloadStatus::Failed | DownloadStatus::Cancelled => &mut partition.failed,
            };
            bucket.push(record.clone());
        }
        partition
    }

    pub fn summary(&self) -> DownloadsSummary {
        self.tx
            .borrow()
            .iter()
            .fold(DownloadsSummary::default(), |mut summary, record| {
                match record.status {
                    DownloadStatus::Downloading => summary.active += 1,
                    DownloadStatus::Completed => {
                        summary.completed += 1;
                        summary.completed_bytes += record.file_size;
                    }
                    DownloadStatus::Failed | DownloadStatus::Cancelled => summary.failed += 1,
                }
                summary
            })
    }
}

/// Human-readable byte count: `0 B`, `512 B`, `1.5 KB`, `2.25 GB`.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 B".to_string();
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = format!("{value:.2}");
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", trimmed, UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::VideoMetadata;
    use chrono::Duration;

    fn record(id: u64, file_size: u64) -> DownloadRecord {
        let meta = VideoMetadata {
            title: format!("video {id}"),
            ..Default::default()
        };
        DownloadRecord::new(id, &meta, file_size)
    }

    #[test]
    fn progress_then_complete_ends_at_hundred() {
        let registry = DownloadRegistry::new();
        registry.add_download(record(7, 1000));
        registry.update_progress(7, 50);
        assert_eq!(registry.get(7).unwrap().progress, 50);
        registry.mark_completed(7);

        let done = registry.get(7).unwrap();
        assert_eq!(done.progress, 100);
        assert_eq!(done.status, DownloadStatus::Completed);
        assert!(done.finished_at.is_some());
    }

    #[test]
    fn progress_for_unknown_id_is_noop() {
        let registry = DownloadRegistry::new();
        registry.add_download(record(1, 10));
        registry.update_progress(37, 37);
        registry.mark_completed(37);
        registry.update_status(37, DownloadStatus::Failed);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(1).unwrap().progress, 0);
    }

    #[test]
    fn re_adding_an_id_replaces_in_place() {
        let registry = DownloadRegistry::new();
        registry.add_download(record(9, 10));
        registry.add_download(record(3, 10));
        registry.update_status(9, DownloadStatus::Failed);
        registry.add_download(record(9, 20));

        let ids: Vec<u64> = registry.snapshot().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![9, 3]);
        let restarted = registry.get(9).unwrap();
        assert_eq!(restarted.status, DownloadStatus::Downloading);
        assert_eq!(restarted.file_size, 20);
    }

    #[test]
    fn failure_keeps_last_progress() {
        let registry = DownloadRegistry::new();
        registry.add_download(record(4, 100));
        registry.update_progress(4, 42);
        registry.update_status(4, DownloadStatus::Failed);
        let failed = registry.get(4).unwrap();
        assert_eq!(failed.status, DownloadStatus::Failed);
        assert_eq!(failed.progress, 42);
    }

    #[test]
    fn progress_update_does_not_touch_status() {
        let mut records = vec![record(1, 10)];
        records[0].status = DownloadStatus::Completed;
        assert!(reduce(
            &mut records,
            RegistryAction::UpdateProgress { id: 1, progress: 30 }
        ));
        assert_eq!(records[0].status, DownloadStatus::Completed);
    }

    #[test]
    fn progress_is_clamped() {
        let mut records = vec![record(1, 10)];
        reduce(
            &mut records,
            RegistryAction::UpdateProgress { id: 1, progress: 250 },
        );
        assert_eq!(records[0].progress, 100);
    }

    #[test]
    fn unchanged_progress_reports_no_change() {
        let mut records = vec![record(1, 10)];
        assert!(!reduce(
            &mut records,
            RegistryAction::UpdateProgress { id: 1, progress: 0 }
        ));
    }

    #[test]
    fn subscribers_see_updates() {
        let registry = DownloadRegistry::new();
        let mut rx = registry.subscribe();
        assert!(!rx.has_changed().unwrap());

        registry.add_download(record(1, 10));
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().len(), 1);

        registry.update_progress(99, 5);
        assert!(!rx.has_changed().unwrap());

        registry.update_progress(1, 5);
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update()[0].progress, 5);
    }

    #[test]
    fn clones_share_state() {
        let registry = DownloadRegistry::new();
        let other = registry.clone();
        other.add_download(record(5, 1));
        assert_eq!(registry.get(5).unwrap().id, 5);
    }

    #[test]
    fn remove_and_clear_finished() {
        let registry = DownloadRegistry::new();
        for id in 1..=4 {
            registry.add_download(record(id, 10));
        }
        registry.mark_completed(1);
        registry.update_status(2, DownloadStatus::Cancelled);

        assert!(registry.remove(3));
        assert!(!registry.remove(3));
        assert!(registry.clear_finished());

        let ids: Vec<u64> = registry.snapshot().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![4]);

        assert!(registry.remove_many([4, 8]));
        assert!(registry.is_empty());
    }

    #[test]
    fn partition_and_summary_split_by_status() {
        let registry = DownloadRegistry::new();
        registry.add_download(record(1, 1000));
        registry.add_download(record(2, 2000));
        registry.add_download(record(3, 500));
        registry.mark_completed(1);
        registry.mark_completed(2);
        registry.update_status(3, DownloadStatus::Failed);
        registry.add_download(record(4, 10));

        let partition = registry.partition();
        assert_eq!(partition.active.len(), 1);
        assert_eq!(partition.completed.len(), 2);
        assert_eq!(partition.failed.len(), 1);

        let summary = registry.summary();
        assert_eq!(summary.active, 1);
        assert_eq!(summary.completed, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.completed_bytes, 3000);
    }

    #[test]
    fn view_filters_and_sorts() {
        let registry = DownloadRegistry::new();
        let base = Utc::now();
        for (id, title, size, age) in [(1, "beta", 30, 3), (2, "Alpha", 10, 1), (3, "gamma", 20, 2)]
        {
            let mut r = record(id, size);
            r.title = title.to_string();
            r.started_at = base - Duration::minutes(age);
            registry.add_download(r);
        }
        registry.mark_completed(3);

        let ids = |records: Vec<DownloadRecord>| records.iter().map(|r| r.id).collect::<Vec<_>>();
        assert_eq!(ids(registry.view(DownloadFilter::All, DownloadSort::Recent)), vec![2, 3, 1]);
        assert_eq!(ids(registry.view(DownloadFilter::All, DownloadSort::Oldest)), vec![1, 3, 2]);
        assert_eq!(ids(registry.view(DownloadFilter::All, DownloadSort::Name)), vec![2, 1, 3]);
        assert_eq!(ids(registry.view(DownloadFilter::All, DownloadSort::Size)), vec![1, 3, 2]);
        assert_eq!(
            ids(registry.view(DownloadFilter::Downloading, DownloadSort::Size)),
            vec![1, 2]
        );
        assert_eq!(
            ids(registry.view(DownloadFilter::Completed, DownloadSort::Recent)),
            vec![3]
        );
        assert!(registry.view(DownloadFilter::Failed, DownloadSort::Recent).is_empty());
    }

    #[test]
    fn format_bytes_picks_units() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(1024 * 1024), "1 MB");
        assert_eq!(format_bytes(5 * 1024 * 1024 * 1024 / 2), "2.5 GB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024 * 1024), "3072 GB");
    }
}

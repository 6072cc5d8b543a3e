/// Whole percent of `total` covered by `received`, rounded down and capped at
/// 100. An unknown total (`0`) always reports 0.
pub fn percent(received: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = (received as u128 * 100) / total as u128;
    pct.min(100) as u8
}

/// Running byte count for one transfer.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProgressTracker {
    received: u64,
    total: u64,
    last: u8,
}

impl ProgressTracker {
    pub fn new(total: u64) -> Self {
        Self {
            received: 0,
            total,
            last: 0,
        }
    }

    /// Records a chunk and returns the percentage to report. Never lower than
    /// a previous return value.
    pub fn advance(&mut self, chunk_len: usize) -> u8 {
        self.received = self.received.saturating_add(chunk_len as u64);
        self.last = self.last.max(percent(self.received, self.total));
        self.last
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn total(&self) -> u64 {
        self.total
    }
}

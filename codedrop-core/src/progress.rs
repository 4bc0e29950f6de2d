//! Advisory transfer progress.
//!
//! Progress never gates protocol transitions. It is derived from counts the
//! sender driver and receiver already track.

/// Sender progress once file `file_index` (0-based) of `total_files` is sent.
pub fn sender_percent(file_index: usize, total_files: usize) -> f64 {
    percent(file_index.saturating_add(1), total_files)
}

/// Receiver progress once `received` of `total` items arrived.
pub fn receiver_percent(received: usize, total: usize) -> f64 {
    percent(received, total)
}

fn percent(done: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    if done >= total {
        return 100.0;
    }
    (done as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
}

/// Monotonic progress over a fixed number of items.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    total: usize,
    completed: usize,
}

impl ProgressTracker {
    /// Track `total` items.
    pub fn new(total: usize) -> Self {
        Self {
            total,
            completed: 0,
        }
    }

    /// Record that `completed` items are done and return the percentage.
    ///
    /// Lower counts than previously recorded are ignored.
    pub fn record(&mut self, completed: usize) -> f64 {
        self.completed = self.completed.max(completed.min(self.total));
        self.percent()
    }

    /// Record one more completed item.
    pub fn advance(&mut self) -> f64 {
        self.record(self.completed + 1)
    }

    /// Number of items tracked.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Current percentage in `[0, 100]`.
    pub fn percent(&self) -> f64 {
        receiver_percent(self.completed, self.total)
    }

    /// Whether every item is done.
    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.completed >= self.total
    }
}

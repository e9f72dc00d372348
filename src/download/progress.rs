//! Per-file progress reporting.
//!
//! The fetcher publishes a [`ProgressUpdate`] after every chunk it writes.
//! Observers are shared by all workers, so implementations must be
//! `Send + Sync` and cheap to call.

use tracing::{debug, trace};

use super::FetchOutcome;

/// Snapshot of one in-flight transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressUpdate<'a> {
    /// Descriptor filename.
    pub filename: &'a str,
    /// Bytes present in the local file, including the resumed baseline.
    pub bytes_transferred: u64,
    /// Remote size, when known.
    pub total_bytes: Option<u64>,
}

impl ProgressUpdate<'_> {
    /// Completion percentage, when the total is known and non-zero.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn percent(&self) -> Option<f64> {
        self.total_bytes
            .filter(|total| *total > 0)
            .map(|total| (self.bytes_transferred as f64 / total as f64) * 100.0)
    }
}

/// Receives progress for every fetch in a run.
pub trait ProgressObserver: Send + Sync {
    /// Called once by the worker pool before any fetch is dispatched.
    fn on_batch_start(&self, _total_files: usize) {}

    /// Called once before the first chunk of a transfer.
    fn on_start(&self, _filename: &str, _total_bytes: Option<u64>, _resumed_from: u64) {}

    /// Called after each chunk is written.
    fn on_progress(&self, update: &ProgressUpdate<'_>);

    /// Called exactly once per descriptor with its terminal outcome.
    fn on_complete(&self, _outcome: &FetchOutcome) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {
    fn on_progress(&self, _update: &ProgressUpdate<'_>) {}
}

/// Observer that forwards progress to `tracing` at trace/debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ProgressObserver for TracingObserver {
    fn on_batch_start(&self, total_files: usize) {
        debug!(total_files, "batch started");
    }

    fn on_start(&self, filename: &str, total_bytes: Option<u64>, resumed_from: u64) {
        debug!(filename, ?total_bytes, resumed_from, "transfer started");
    }

    fn on_progress(&self, update: &ProgressUpdate<'_>) {
        trace!(
            filename = update.filename,
            bytes = update.bytes_transferred,
            total = ?update.total_bytes,
            percent = ?update.percent(),
            "transfer progress"
        );
    }

    fn on_complete(&self, outcome: &FetchOutcome) {
        debug!(
            filename = outcome.filename(),
            status = outcome.status().as_str(),
            bytes = outcome.bytes_transferred(),
            "transfer finished"
        );
    }
}

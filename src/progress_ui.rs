//! Progress bars for download runs.

use std::collections::HashMap;
use std::sync::Mutex;

use archive_fetch::{FetchOutcome, FetchStatus, ProgressObserver, ProgressUpdate};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

const BAR_TEMPLATE: &str =
    "{spinner} {wide_msg} {bytes}/{total_bytes} ({bytes_per_sec}, {eta}) [{bar:30}]";
const SPINNER_TEMPLATE: &str = "{spinner} {wide_msg} {bytes} ({bytes_per_sec})";
const OVERALL_TEMPLATE: &str = "[{pos}/{len}] files {msg}";

/// One bar per in-flight file plus an overall file counter.
pub(crate) struct ProgressUi {
    multi: MultiProgress,
    overall: ProgressBar,
    bars: Mutex<HashMap<String, ProgressBar>>,
}

impl ProgressUi {
    pub(crate) fn new() -> Self {
        Self::with_draw_target(ProgressDrawTarget::stderr())
    }

    fn with_draw_target(target: ProgressDrawTarget) -> Self {
        let multi = MultiProgress::with_draw_target(target);
        let overall = multi.add(ProgressBar::new(0));
        overall.set_style(
            ProgressStyle::with_template(OVERALL_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        Self {
            multi,
            overall,
            bars: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn finish(&self) {
        self.overall.finish_and_clear();
        let _ = self.multi.clear();
    }

    fn file_bar(filename: &str, total_bytes: Option<u64>, resumed_from: u64) -> ProgressBar {
        let (bar, template) = match total_bytes {
            Some(total) => (ProgressBar::new(total), BAR_TEMPLATE),
            None => (ProgressBar::new_spinner(), SPINNER_TEMPLATE),
        };
        bar.set_style(
            ProgressStyle::with_template(template)
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar.set_message(filename.to_string());
        bar.set_position(resumed_from);
        bar
    }
}

impl ProgressObserver for ProgressUi {
    fn on_batch_start(&self, total_files: usize) {
        self.overall.set_length(total_files as u64);
    }

    fn on_start(&self, filename: &str, total_bytes: Option<u64>, resumed_from: u64) {
        let bar = self
            .multi
            .insert_before(&self.overall, Self::file_bar(filename, total_bytes, resumed_from));
        if let Ok(mut bars) = self.bars.lock() {
            bars.insert(filename.to_string(), bar);
        }
    }

    fn on_progress(&self, update: &ProgressUpdate<'_>) {
        if let Ok(bars) = self.bars.lock()
            && let Some(bar) = bars.get(update.filename)
        {
            bar.set_position(update.bytes_transferred);
        }
    }

    fn on_complete(&self, outcome: &FetchOutcome) {
        if let Ok(mut bars) = self.bars.lock()
            && let Some(bar) = bars.remove(outcome.filename())
        {
            bar.finish_and_clear();
            self.multi.remove(&bar);
        }
        if outcome.status() == FetchStatus::Error {
            let _ = self
                .multi
                .println(format!("failed: {}", outcome.filename()));
        }
        self.overall.inc(1);
    }
}

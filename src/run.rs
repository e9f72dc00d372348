//! End-to-end orchestration of one invocation.
//!
//! [`ArchiveDownloader::download_all`] creates the destination directory,
//! reads the item listing, fans the descriptors out to the worker pool and
//! writes the manifest once every descriptor has an outcome.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::download::{FetchStatus, Fetcher, ProgressObserver, TracingObserver};
use crate::listing::fetch_listing;
use crate::manifest::{MANIFEST_FILE_NAME, Manifest, ManifestError};
use crate::scheduler::{ConcurrencyPolicy, CpuSampler, ProcStatSampler, SchedulerError, WorkerPool};
use crate::source::ArchiveSource;
use crate::transport::Transport;

/// Fatal run errors. Per-file failures never surface here.
#[derive(Debug, Error)]
pub enum RunError {
    /// The destination directory could not be created.
    #[error("cannot create destination directory {path}: {source}")]
    CreateDir {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The manifest could not be written.
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    /// The concurrency policy produced an unusable worker count.
    #[error(transparent)]
    InvalidConcurrency(#[from] SchedulerError),
}

/// Counts reported after a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Item identifier.
    pub identifier: String,
    /// Directory the files were written to.
    pub destination_dir: PathBuf,
    /// Manifest location; `None` when the listing yielded no files.
    pub manifest_path: Option<PathBuf>,
    /// Number of descriptors in the listing.
    pub total_files: usize,
    /// Files transferred in this run.
    pub downloaded: usize,
    /// Files that were already complete.
    pub already_downloaded: usize,
    /// Files that failed.
    pub failed: usize,
    /// Worker count used (0 when nothing was scheduled).
    pub workers: usize,
    /// Whether the interrupt flag was raised during the run.
    pub interrupted: bool,
}

impl RunSummary {
    /// Whether every descriptor ended in a success status.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed == 0 && !self.interrupted
    }
}

/// Downloads every file of one archive item.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use archive_fetch::{ArchiveDownloader, ArchiveSource, HttpTransport};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let source = ArchiveSource::parse("https://archive.org/details/quran-recitation")?;
/// let downloader = ArchiveDownloader::new(source, "./downloads", Arc::new(HttpTransport::new()));
/// let summary = downloader.download_all().await?;
/// println!("{} of {} files failed", summary.failed, summary.total_files);
/// # Ok(())
/// # }
/// ```
pub struct ArchiveDownloader {
    source: ArchiveSource,
    destination_root: PathBuf,
    transport: Arc<dyn Transport>,
    observer: Arc<dyn ProgressObserver>,
    sampler: Arc<dyn CpuSampler>,
    policy: ConcurrencyPolicy,
    interrupted: Arc<AtomicBool>,
}

impl std::fmt::Debug for ArchiveDownloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveDownloader")
            .field("source", &self.source)
            .field("destination_root", &self.destination_root)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl ArchiveDownloader {
    /// Creates a downloader with the adaptive policy, `/proc/stat` sampling
    /// and tracing-only progress.
    #[must_use]
    pub fn new(
        source: ArchiveSource,
        destination_root: impl Into<PathBuf>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            source,
            destination_root: destination_root.into(),
            transport,
            observer: Arc::new(TracingObserver),
            sampler: Arc::new(ProcStatSampler::default()),
            policy: ConcurrencyPolicy::default(),
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Replaces the worker-count policy (adaptive at 90% CPU by default).
    #[must_use]
    pub fn with_policy(mut self, policy: ConcurrencyPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replaces the CPU sampler used by adaptive policies.
    #[must_use]
    pub fn with_sampler(mut self, sampler: Arc<dyn CpuSampler>) -> Self {
        self.sampler = sampler;
        self
    }

    /// Replaces the progress observer (tracing by default).
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Shares an interrupt flag (raised by the binary on Ctrl+C).
    #[must_use]
    pub fn with_interrupt(mut self, interrupted: Arc<AtomicBool>) -> Self {
        self.interrupted = interrupted;
        self
    }

    /// Item being mirrored.
    #[must_use]
    pub fn source(&self) -> &ArchiveSource {
        &self.source
    }

    /// `<destination_root>/<identifier>`.
    #[must_use]
    pub fn destination_dir(&self) -> PathBuf {
        self.destination_root.join(self.source.identifier())
    }

    /// `<destination_root>/<identifier>/index.json`.
    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.destination_dir().join(MANIFEST_FILE_NAME)
    }

    /// Runs the whole pipeline.
    ///
    /// An unreachable or malformed listing is logged and treated as an empty
    /// item: nothing is downloaded and no manifest is written.
    ///
    /// # Errors
    ///
    /// Returns [`RunError`] if the destination directory cannot be created,
    /// the worker count is invalid, or the manifest cannot be written.
    #[instrument(skip(self), fields(identifier = %self.source.identifier()))]
    pub async fn download_all(&self) -> Result<RunSummary, RunError> {
        let destination_dir = self.destination_dir();
        tokio::fs::create_dir_all(&destination_dir)
            .await
            .map_err(|source| RunError::CreateDir {
                path: destination_dir.clone(),
                source,
            })?;

        let descriptors = match fetch_listing(self.transport.as_ref(), &self.source).await {
            Ok(descriptors) => descriptors,
            Err(e) => {
                warn!(error = %e, "cannot read file listing");
                Vec::new()
            }
        };

        if descriptors.is_empty() {
            warn!(url = %self.source.download_url(), "no files found");
            return Ok(self.summary(destination_dir, None, None, 0));
        }
        info!(files = descriptors.len(), "listing parsed");

        let fetcher = Fetcher::new(Arc::clone(&self.transport), Arc::clone(&self.observer))
            .with_interrupt(Arc::clone(&self.interrupted));
        let pool = WorkerPool::from_policy(fetcher, &self.policy, self.sampler.as_ref()).await?;
        let completed = pool.run_all(&descriptors, &destination_dir).await;

        let manifest = Manifest::from_run(&self.source, completed);
        let manifest_path = self.manifest_path();
        manifest.write(&manifest_path)?;
        info!(
            path = %manifest_path.display(),
            total = manifest.total_files,
            failed = manifest.count(FetchStatus::Error),
            "manifest written"
        );

        Ok(self.summary(
            destination_dir,
            Some(manifest_path),
            Some(&manifest),
            pool.workers(),
        ))
    }

    fn summary(
        &self,
        destination_dir: PathBuf,
        manifest_path: Option<PathBuf>,
        manifest: Option<&Manifest>,
        workers: usize,
    ) -> RunSummary {
        let count = |status| manifest.map_or(0, |m| m.count(status));
        RunSummary {
            identifier: self.source.identifier().to_string(),
            destination_dir,
            manifest_path,
            total_files: manifest.map_or(0, |m| m.total_files),
            downloaded: count(FetchStatus::Downloaded),
            already_downloaded: count(FetchStatus::AlreadyDownloaded),
            failed: count(FetchStatus::Error),
            workers,
            interrupted: self.interrupted.load(Ordering::SeqCst),
        }
    }
}

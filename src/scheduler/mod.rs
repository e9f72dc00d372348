//! Bounded worker pool for fetching many descriptors.
//!
//! # Concurrency Model
//!
//! - Each fetch runs in its own Tokio task
//! - A semaphore permit is acquired before each task is spawned, so at most
//!   `workers` fetches are in flight
//! - Permits are released automatically when fetches complete (RAII)
//! - Every worker writes a disjoint local path; the only shared state is the
//!   `JoinSet` drained by the pool and the progress observer
//! - [`WorkerPool::run_all`] is a join barrier: it returns only after every
//!   descriptor has an outcome
//!
//! # Interruption
//!
//! When the fetcher's interrupt flag is raised, descriptors not yet
//! dispatched receive an `error` outcome immediately and in-flight fetches
//! stop at their next chunk boundary, keeping their partial files.

mod policy;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use crate::descriptor::FileDescriptor;
use crate::download::{FetchOutcome, FetchStatus, Fetcher};

pub use policy::{
    ConcurrencyPolicy, CpuSample, CpuSampler, DEFAULT_SAMPLE_INTERVAL, DEFAULT_TARGET_UTILIZATION,
    FixedSampler, MAX_WORKERS, MIN_WORKERS, ProcStatSampler, adaptive_worker_count, logical_cores,
};

const INTERRUPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Error type for worker pool construction.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// Invalid worker count provided.
    #[error("invalid worker count {value}: must be between {MIN_WORKERS} and {MAX_WORKERS}")]
    InvalidWorkerCount {
        /// The invalid value that was provided.
        value: usize,
    },
}

/// An outcome tagged with the position of its descriptor in the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedFetch {
    /// Index of the descriptor in the slice passed to `run_all`.
    pub index: usize,
    /// Terminal outcome.
    pub outcome: FetchOutcome,
}

/// Restores descriptor order from completion order.
#[must_use]
pub fn in_descriptor_order(mut completed: Vec<CompletedFetch>) -> Vec<FetchOutcome> {
    completed.sort_by_key(|fetch| fetch.index);
    completed.into_iter().map(|fetch| fetch.outcome).collect()
}

/// Worker pool dispatching fetches under a concurrency bound.
#[derive(Debug)]
pub struct WorkerPool {
    fetcher: Fetcher,
    workers: usize,
}

impl WorkerPool {
    /// Creates a pool running at most `workers` fetches at once.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidWorkerCount`] if the value is outside
    /// the valid range (1-100).
    ///
    /// # Example
    ///
    /// ```
    /// use std::sync::Arc;
    /// use archive_fetch::{Fetcher, HttpTransport, NoopObserver, WorkerPool};
    ///
    /// let fetcher = Fetcher::new(Arc::new(HttpTransport::new()), Arc::new(NoopObserver));
    /// let pool = WorkerPool::new(fetcher, 4).unwrap();
    /// assert_eq!(pool.workers(), 4);
    /// ```
    pub fn new(fetcher: Fetcher, workers: usize) -> Result<Self, SchedulerError> {
        if !(MIN_WORKERS..=MAX_WORKERS).contains(&workers) {
            return Err(SchedulerError::InvalidWorkerCount { value: workers });
        }
        debug!(workers, "creating worker pool");
        Ok(Self { fetcher, workers })
    }

    /// Creates a pool sized by `policy`, sampling host load once.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidWorkerCount`] for a fixed policy
    /// outside 1-100.
    pub async fn from_policy(
        fetcher: Fetcher,
        policy: &ConcurrencyPolicy,
        sampler: &dyn CpuSampler,
    ) -> Result<Self, SchedulerError> {
        let workers = policy.resolve(sampler).await;
        Self::new(fetcher, workers)
    }

    /// Returns the configured concurrency limit.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Fetches every descriptor into `destination_dir`.
    ///
    /// Returns exactly one [`CompletedFetch`] per descriptor, in the order the
    /// pool observed completions. Use [`in_descriptor_order`] for a stable order.
    #[instrument(skip(self, descriptors), fields(files = descriptors.len(), workers = self.workers, destination = %destination_dir.display()))]
    pub async fn run_all(
        &self,
        descriptors: &[FileDescriptor],
        destination_dir: &Path,
    ) -> Vec<CompletedFetch> {
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let interrupted = Arc::clone(self.fetcher.interrupt_flag());
        let mut tasks: JoinSet<CompletedFetch> = JoinSet::new();
        let mut collector = Collector::new(descriptors.len());

        info!("starting downloads");
        self.fetcher.observer().on_batch_start(descriptors.len());

        for (index, descriptor) in descriptors.iter().enumerate() {
            while let Some(joined) = tasks.try_join_next() {
                collector.accept(joined);
            }

            let permit = if interrupted.load(Ordering::SeqCst) {
                None
            } else {
                tokio::select! {
                    biased;
                    () = wait_for_interrupt(&interrupted) => None,
                    permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
                }
            };
            // A freed permit can win the race against the poll interval.
            let permit = permit.filter(|_| !interrupted.load(Ordering::SeqCst));

            let Some(permit) = permit else {
                let outcome = FetchOutcome::failed_with_message(
                    descriptor,
                    "interrupted before download started",
                );
                self.fetcher.observer().on_complete(&outcome);
                collector.push(CompletedFetch { index, outcome });
                continue;
            };

            let fetcher = self.fetcher.clone();
            let descriptor = descriptor.clone();
            let destination_dir = destination_dir.to_path_buf();
            tasks.spawn(async move {
                let _permit = permit;
                let outcome = fetcher.fetch(&descriptor, &destination_dir).await;
                CompletedFetch { index, outcome }
            });
        }

        debug!(in_flight = tasks.len(), "waiting for downloads to complete");
        while let Some(joined) = tasks.join_next().await {
            collector.accept(joined);
        }

        let completed = collector.finish(descriptors, self.fetcher.observer().as_ref());
        let failed = completed
            .iter()
            .filter(|fetch| fetch.outcome.status() == FetchStatus::Error)
            .count();
        info!(total = completed.len(), failed, "downloads finished");
        completed
    }
}

/// Completion-order aggregation with one slot per descriptor.
struct Collector {
    seen: Vec<bool>,
    completed: Vec<CompletedFetch>,
}

impl Collector {
    fn new(len: usize) -> Self {
        Self {
            seen: vec![false; len],
            completed: Vec::with_capacity(len),
        }
    }

    fn accept(&mut self, joined: Result<CompletedFetch, tokio::task::JoinError>) {
        match joined {
            Ok(fetch) => self.push(fetch),
            // The slot stays empty and is filled in `finish`.
            Err(e) => warn!(error = %e, "download task panicked"),
        }
    }

    fn push(&mut self, fetch: CompletedFetch) {
        if let Some(seen) = self.seen.get_mut(fetch.index) {
            *seen = true;
        }
        self.completed.push(fetch);
    }

    fn finish(
        mut self,
        descriptors: &[FileDescriptor],
        observer: &dyn crate::download::ProgressObserver,
    ) -> Vec<CompletedFetch> {
        for (index, descriptor) in descriptors.iter().enumerate() {
            if !self.seen[index] {
                let outcome = FetchOutcome::failed_with_message(
                    descriptor,
                    "download task terminated without a result",
                );
                observer.on_complete(&outcome);
                self.completed.push(CompletedFetch { index, outcome });
            }
        }
        self.completed
    }
}

async fn wait_for_interrupt(interrupted: &AtomicBool) {
    while !interrupted.load(Ordering::SeqCst) {
        tokio::time::sleep(INTERRUPT_POLL_INTERVAL).await;
    }
}

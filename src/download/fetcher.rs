//! Resume-aware single-file fetcher.
//!
//! [`Fetcher::fetch`] turns one [`FileDescriptor`] into one local file:
//!
//! 1. measure the local file (0 if absent);
//! 2. probe the remote size with HEAD (failure degrades to "unknown");
//! 3. skip the transfer when both sizes agree;
//! 4. otherwise GET, with `Range: bytes=<local>-` when a partial file exists,
//!    appending on 206 and rewriting from zero on 200;
//! 5. stream the body to disk chunk by chunk, reporting progress.
//!
//! Partial files are never deleted, so a later run can resume them.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::StreamExt;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument, warn};

use super::constants::{MAX_CHUNK_BYTES, RANGE_NOT_SATISFIABLE, WRITE_BUFFER_BYTES};
use super::{FetchError, FetchOutcome, ProgressObserver, ProgressUpdate};
use crate::descriptor::FileDescriptor;
use crate::transport::{BodyStream, Transport, TransportResponse};

/// Downloads descriptors into a destination directory.
///
/// Cloning is cheap; every worker of a run holds its own clone sharing the
/// same transport, observer and interrupt flag.
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use std::sync::Arc;
/// use archive_fetch::{FileDescriptor, Fetcher, HttpTransport, TracingObserver};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let fetcher = Fetcher::new(Arc::new(HttpTransport::new()), Arc::new(TracingObserver));
/// let descriptor = FileDescriptor::new("001.mp3", "https://archive.org/download/item/001.mp3")?;
/// let outcome = fetcher.fetch(&descriptor, Path::new("./downloads/item")).await;
/// println!("{}: {}", outcome.filename(), outcome.status().as_str());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Fetcher {
    transport: Arc<dyn Transport>,
    observer: Arc<dyn ProgressObserver>,
    interrupted: Arc<AtomicBool>,
}

impl std::fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fetcher")
            .field("interrupted", &self.interrupted.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl Fetcher {
    /// Creates a fetcher with its own (never raised) interrupt flag.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, observer: Arc<dyn ProgressObserver>) -> Self {
        Self {
            transport,
            observer,
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shares an interrupt flag; once raised, transfers stop at the next chunk boundary.
    #[must_use]
    pub fn with_interrupt(mut self, interrupted: Arc<AtomicBool>) -> Self {
        self.interrupted = interrupted;
        self
    }

    /// Returns the interrupt flag checked between chunks.
    #[must_use]
    pub fn interrupt_flag(&self) -> &Arc<AtomicBool> {
        &self.interrupted
    }

    /// Returns the observer receiving progress and outcomes.
    #[must_use]
    pub fn observer(&self) -> &Arc<dyn ProgressObserver> {
        &self.observer
    }

    /// Fetches one descriptor into `destination_dir`.
    ///
    /// Never fails: transport and filesystem errors become an `error`
    /// outcome so the caller can keep processing other descriptors. The
    /// observer's `on_complete` is called with the returned outcome.
    #[instrument(skip(self, descriptor, destination_dir), fields(filename = %descriptor.filename()))]
    pub async fn fetch(&self, descriptor: &FileDescriptor, destination_dir: &Path) -> FetchOutcome {
        let outcome = match self.try_fetch(descriptor, destination_dir).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(url = %descriptor.url(), error = %e, "download failed");
                FetchOutcome::failed(descriptor, &e)
            }
        };
        self.observer.on_complete(&outcome);
        outcome
    }

    async fn try_fetch(
        &self,
        descriptor: &FileDescriptor,
        destination_dir: &Path,
    ) -> Result<FetchOutcome, FetchError> {
        let local_path = descriptor.local_path(destination_dir);
        let url = descriptor.url().as_str();

        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| FetchError::io(parent, e))?;
        }

        let existing_size = tokio::fs::metadata(&local_path)
            .await
            .map(|meta| meta.len())
            .unwrap_or(0);

        let total_size = match self.transport.head_size(url).await {
            Ok(size) => size.filter(|size| *size > 0),
            Err(e) => {
                warn!(url, error = %e, "metadata probe failed; continuing with unknown size");
                None
            }
        };

        if let Some(total) = total_size
            && existing_size == total
        {
            info!(path = %local_path.display(), bytes = total, "already downloaded");
            return Ok(FetchOutcome::already_downloaded(descriptor, &local_path));
        }

        let resume_from = match total_size {
            Some(total) if existing_size > total => {
                warn!(
                    existing_size,
                    total, "local file larger than remote; restarting from zero"
                );
                0
            }
            _ => existing_size,
        };

        let (response, resume_from) = self.open_stream(url, resume_from).await?;
        let append = resume_from > 0 && response.partial;
        if resume_from > 0 && !response.partial {
            warn!(url, "server ignored range request; rewriting file from zero");
        }
        let baseline = if append { resume_from } else { 0 };
        let progress_total = total_size
            .or_else(|| response.content_length.map(|len| baseline.saturating_add(len)))
            .or(descriptor.expected_size());

        let file = if append {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&local_path)
                .await
                .map_err(|e| FetchError::io(&local_path, e))?
        } else {
            File::create(&local_path)
                .await
                .map_err(|e| FetchError::io(&local_path, e))?
        };

        self.observer
            .on_start(descriptor.filename(), progress_total, baseline);
        let bytes_written = self
            .stream_to_file(
                file,
                response.body,
                descriptor.filename(),
                &local_path,
                baseline,
                progress_total,
            )
            .await?;

        let final_size = baseline.saturating_add(bytes_written);
        // The listing's size stands in when the probe could not learn one.
        if let Some(expected) = total_size.or(descriptor.expected_size())
            && expected != final_size
        {
            return Err(FetchError::integrity(&local_path, expected, final_size));
        }

        info!(
            path = %local_path.display(),
            bytes = final_size,
            resumed = append,
            "download complete"
        );
        Ok(FetchOutcome::downloaded(descriptor, &local_path, bytes_written))
    }

    /// Issues the GET, falling back to a full download when the range is
    /// rejected with 416. Returns the response and the effective resume offset.
    async fn open_stream(
        &self,
        url: &str,
        resume_from: u64,
    ) -> Result<(TransportResponse, u64), FetchError> {
        if resume_from == 0 {
            return Ok((self.transport.get_stream(url, None).await?, 0));
        }

        debug!(url, resume_from, "requesting byte range");
        match self.transport.get_stream(url, Some(resume_from)).await {
            Ok(response) => Ok((response, resume_from)),
            Err(e) if e.status() == Some(RANGE_NOT_SATISFIABLE) => {
                warn!(url, resume_from, "range not satisfiable; downloading from zero");
                Ok((self.transport.get_stream(url, None).await?, 0))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Streams the body to disk, returning the bytes written by this call.
    ///
    /// Completed chunks are flushed even when the stream fails or the run is
    /// interrupted, so the partial file stays a valid prefix.
    async fn stream_to_file(
        &self,
        file: File,
        mut body: BodyStream,
        filename: &str,
        path: &Path,
        baseline: u64,
        total_bytes: Option<u64>,
    ) -> Result<u64, FetchError> {
        let mut writer = BufWriter::with_capacity(WRITE_BUFFER_BYTES, file);
        let mut bytes_written: u64 = 0;

        let streamed: Result<(), FetchError> = 'stream: loop {
            if self.interrupted.load(Ordering::SeqCst) {
                break Err(FetchError::interrupted(filename, bytes_written));
            }
            let Some(chunk) = body.next().await else {
                break Ok(());
            };
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => break Err(e.into()),
            };

            for piece in chunk.chunks(MAX_CHUNK_BYTES) {
                if let Err(e) = writer.write_all(piece).await {
                    break 'stream Err(FetchError::io(path, e));
                }
                bytes_written += piece.len() as u64;
                self.observer.on_progress(&ProgressUpdate {
                    filename,
                    bytes_transferred: baseline.saturating_add(bytes_written),
                    total_bytes,
                });
            }
        };

        let flushed = writer.flush().await.map_err(|e| FetchError::io(path, e));
        if let Err(e) = &streamed {
            debug!(path = %path.display(), bytes_written, error = %e, "keeping partial file");
        }
        streamed?;
        flushed?;
        Ok(bytes_written)
    }
}

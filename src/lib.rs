//! Archive Fetch Core Library
//!
//! This library mirrors a directory-style archive listing (such as an
//! archive.org `/download/<identifier>` page) into a local directory,
//! resuming partial transfers and recording the result in an `index.json`
//! manifest.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`source`] - Item URL parsing (identifier and download-index URL)
//! - [`descriptor`] - Validated descriptors of remote files
//! - [`transport`] - HTTP capability consumed by the core, with a reqwest implementation
//! - [`listing`] - Directory-index parsing into file descriptors
//! - [`download`] - Resume-aware single-file fetcher and progress reporting
//! - [`scheduler`] - Load-aware worker pool that fans descriptors out to the fetcher
//! - [`manifest`] - Durable run manifest
//! - [`run`] - End-to-end orchestration of a single invocation

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod descriptor;
pub mod download;
pub mod listing;
pub mod manifest;
pub mod run;
pub mod scheduler;
pub mod source;
pub mod transport;

// Re-export commonly used types
pub use descriptor::{DescriptorError, FileDescriptor};
pub use download::{
    FetchError, FetchOutcome, FetchStatus, Fetcher, NoopObserver, ProgressObserver,
    ProgressUpdate, TracingObserver,
};
pub use listing::{ListingError, fetch_listing, parse_listing};
pub use manifest::{MANIFEST_FILE_NAME, Manifest, ManifestEntry, ManifestError};
pub use run::{ArchiveDownloader, RunError, RunSummary};
pub use scheduler::{
    CompletedFetch, ConcurrencyPolicy, CpuSample, CpuSampler, DEFAULT_TARGET_UTILIZATION,
    FixedSampler, ProcStatSampler, SchedulerError, WorkerPool,
};
pub use source::{ArchiveSource, SourceError};
pub use transport::{BodyStream, HttpTransport, Transport, TransportError, TransportResponse};

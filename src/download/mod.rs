//! Resume-aware file downloads.
//!
//! This module materializes [`FileDescriptor`](crate::FileDescriptor)s as
//! local files over an injected [`Transport`](crate::Transport).
//!
//! # Features
//!
//! - Streaming downloads in bounded chunks (memory use independent of file size)
//! - Byte-range resume of partial files, with full-download fallback when the
//!   server ignores or rejects the range
//! - Idempotent reruns: complete files are detected with a HEAD probe only
//! - Per-chunk progress through a [`ProgressObserver`]
//! - Cooperative interruption between chunks
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use archive_fetch::download::{Fetcher, NoopObserver};
//! use archive_fetch::{FileDescriptor, HttpTransport};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let fetcher = Fetcher::new(Arc::new(HttpTransport::new()), Arc::new(NoopObserver));
//! let descriptor = FileDescriptor::new("a.mp3", "https://archive.org/download/item/a.mp3")?;
//! let outcome = fetcher.fetch(&descriptor, Path::new("./downloads")).await;
//! assert!(outcome.status().is_success());
//! # Ok(())
//! # }
//! ```

mod constants;
mod error;
mod fetcher;
mod outcome;
mod progress;

pub use constants::{MAX_CHUNK_BYTES, WRITE_BUFFER_BYTES};
pub use error::FetchError;
pub use fetcher::Fetcher;
pub use outcome::{FetchOutcome, FetchStatus};
pub use progress::{NoopObserver, ProgressObserver, ProgressUpdate, TracingObserver};

// Note: we do NOT define module-local Result aliases.
// Use `Result<T, FetchError>` explicitly in function signatures.

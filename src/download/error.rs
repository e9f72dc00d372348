//! Error types for the download module.
//!
//! A [`FetchError`] never escapes [`Fetcher::fetch`](super::Fetcher::fetch);
//! it is rendered into the `error` field of a failed
//! [`FetchOutcome`](super::FetchOutcome) so the run can continue.

use std::path::PathBuf;

use thiserror::Error;

use crate::transport::TransportError;

/// Errors that can occur while materializing one file.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The transport failed (network, non-success status, broken body).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// File system error while creating or writing the local file.
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Local file size does not match the size the server reported.
    #[error(
        "integrity check failed for {path}: expected {expected_bytes} bytes, got {actual_bytes}"
    )]
    Integrity {
        /// Local file that failed verification.
        path: PathBuf,
        /// Size reported by the metadata probe.
        expected_bytes: u64,
        /// Size on disk after the transfer.
        actual_bytes: u64,
    },

    /// The interrupt flag was raised between chunks.
    #[error("download of {filename} interrupted after {bytes_written} bytes; partial file kept")]
    Interrupted {
        /// Descriptor filename.
        filename: String,
        /// Bytes written by this call before stopping.
        bytes_written: u64,
    },
}

impl FetchError {
    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an integrity mismatch error.
    pub fn integrity(path: impl Into<PathBuf>, expected_bytes: u64, actual_bytes: u64) -> Self {
        Self::Integrity {
            path: path.into(),
            expected_bytes,
            actual_bytes,
        }
    }

    /// Creates an interruption error.
    pub fn interrupted(filename: impl Into<String>, bytes_written: u64) -> Self {
        Self::Interrupted {
            filename: filename.into(),
            bytes_written,
        }
    }
}

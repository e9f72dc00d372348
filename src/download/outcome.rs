//! Terminal result of fetching one descriptor.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::FetchError;
use crate::descriptor::FileDescriptor;

/// Status recorded for each file in the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    /// Bytes were transferred and the file is complete.
    Downloaded,
    /// The local file already matched the remote size; nothing was transferred.
    AlreadyDownloaded,
    /// The fetch failed; see the error detail.
    Error,
}

impl FetchStatus {
    /// Returns the stable string label used in the manifest.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Downloaded => "downloaded",
            Self::AlreadyDownloaded => "already_downloaded",
            Self::Error => "error",
        }
    }

    /// Returns true for `downloaded` and `already_downloaded`.
    #[must_use]
    pub fn is_success(self) -> bool {
        !matches!(self, Self::Error)
    }
}

/// Result of attempting to materialize one [`FileDescriptor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    filename: String,
    url: String,
    status: FetchStatus,
    local_path: Option<PathBuf>,
    error: Option<String>,
    bytes_transferred: u64,
}

impl FetchOutcome {
    /// A completed transfer of `bytes_transferred` new bytes.
    #[must_use]
    pub fn downloaded(descriptor: &FileDescriptor, local_path: &Path, bytes_transferred: u64) -> Self {
        Self::success(descriptor, FetchStatus::Downloaded, local_path, bytes_transferred)
    }

    /// A file that was already complete on disk.
    #[must_use]
    pub fn already_downloaded(descriptor: &FileDescriptor, local_path: &Path) -> Self {
        Self::success(descriptor, FetchStatus::AlreadyDownloaded, local_path, 0)
    }

    /// A failed fetch.
    #[must_use]
    pub fn failed(descriptor: &FileDescriptor, error: &FetchError) -> Self {
        Self::failed_with_message(descriptor, error.to_string())
    }

    /// A failed fetch with a free-form cause (task panics, never-started work).
    #[must_use]
    pub fn failed_with_message(descriptor: &FileDescriptor, message: impl Into<String>) -> Self {
        Self {
            filename: descriptor.filename().to_string(),
            url: descriptor.url().to_string(),
            status: FetchStatus::Error,
            local_path: None,
            error: Some(message.into()),
            bytes_transferred: 0,
        }
    }

    fn success(
        descriptor: &FileDescriptor,
        status: FetchStatus,
        local_path: &Path,
        bytes_transferred: u64,
    ) -> Self {
        Self {
            filename: descriptor.filename().to_string(),
            url: descriptor.url().to_string(),
            status,
            local_path: Some(local_path.to_path_buf()),
            error: None,
            bytes_transferred,
        }
    }

    /// Descriptor filename.
    #[must_use]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Descriptor URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Terminal status.
    #[must_use]
    pub fn status(&self) -> FetchStatus {
        self.status
    }

    /// Local path, set only on success states.
    #[must_use]
    pub fn local_path(&self) -> Option<&Path> {
        self.local_path.as_deref()
    }

    /// Human-readable failure cause, set only on `error`.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Bytes written to disk by this fetch (0 when nothing was transferred).
    #[must_use]
    pub fn bytes_transferred(&self) -> u64 {
        self.bytes_transferred
    }
}

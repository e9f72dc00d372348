//! Run manifest (`index.json`).
//!
//! One manifest is written per invocation into the item's destination
//! directory. It lists every descriptor of the run, in listing order, with
//! its terminal status. Writes go to a temporary sibling file which is synced
//! and renamed over the target, so readers never observe a half-written
//! manifest.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::download::{FetchOutcome, FetchStatus};
use crate::scheduler::{CompletedFetch, in_descriptor_order};
use crate::source::ArchiveSource;

/// File name of the manifest inside the destination directory.
pub const MANIFEST_FILE_NAME: &str = "index.json";

const TEMP_SUFFIX: &str = ".tmp";

/// Errors produced while writing or reading a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// Filesystem failure on the manifest or its temporary file.
    #[error("manifest I/O error at {path}: {source}")]
    Io {
        /// Path being written or read.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// JSON encoding or decoding failure.
    #[error("manifest JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ManifestError {
    /// Creates an I/O error for `path`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// One file entry of the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Relative filename inside the destination directory.
    pub filename: String,
    /// Absolute source URL.
    pub url: String,
    /// Terminal status.
    pub status: FetchStatus,
    /// Local path, present for successful files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<String>,
    /// Error description, present for failed files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&FetchOutcome> for ManifestEntry {
    fn from(outcome: &FetchOutcome) -> Self {
        Self {
            filename: outcome.filename().to_string(),
            url: outcome.url().to_string(),
            status: outcome.status(),
            local_path: outcome
                .local_path()
                .map(|path| path.to_string_lossy().into_owned()),
            error: outcome.error().map(str::to_string),
        }
    }
}

/// Aggregate record of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Item identifier.
    pub identifier: String,
    /// Item URL as given by the user.
    pub base_url: String,
    /// Directory-index URL the listing was read from.
    pub download_url: String,
    /// Number of entries in `files`.
    pub total_files: usize,
    /// One entry per descriptor, in listing order.
    pub files: Vec<ManifestEntry>,
}

impl Manifest {
    /// Builds a manifest from outcomes already in listing order.
    #[must_use]
    pub fn new(source: &ArchiveSource, outcomes: &[FetchOutcome]) -> Self {
        let files: Vec<ManifestEntry> = outcomes.iter().map(ManifestEntry::from).collect();
        Self {
            identifier: source.identifier().to_string(),
            base_url: source.base_url().to_string(),
            download_url: source.download_url().to_string(),
            total_files: files.len(),
            files,
        }
    }

    /// Builds a manifest from completion-ordered results, restoring listing order.
    #[must_use]
    pub fn from_run(source: &ArchiveSource, completed: Vec<CompletedFetch>) -> Self {
        Self::new(source, &in_descriptor_order(completed))
    }

    /// Number of entries with the given status.
    #[must_use]
    pub fn count(&self, status: FetchStatus) -> usize {
        self.files.iter().filter(|entry| entry.status == status).count()
    }

    /// Atomically writes the manifest as pretty JSON to `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError`] if the temporary file cannot be written,
    /// synced or renamed. The temporary file is removed on failure.
    #[instrument(skip(self), fields(path = %path.display(), files = self.total_files))]
    pub fn write(&self, path: &Path) -> Result<(), ManifestError> {
        let tmp_path = temp_path(path);
        let result = self
            .write_temp(&tmp_path)
            .and_then(|()| fs::rename(&tmp_path, path).map_err(|e| ManifestError::io(path, e)));
        if result.is_err() {
            let _ = fs::remove_file(&tmp_path);
        }
        result?;
        debug!("manifest written");
        Ok(())
    }

    fn write_temp(&self, tmp_path: &Path) -> Result<(), ManifestError> {
        let file = fs::File::create(tmp_path).map_err(|e| ManifestError::io(tmp_path, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer
            .write_all(b"\n")
            .map_err(|e| ManifestError::io(tmp_path, e))?;
        let file = writer
            .into_inner()
            .map_err(|e| ManifestError::io(tmp_path, e.into_error()))?;
        file.sync_all().map_err(|e| ManifestError::io(tmp_path, e))
    }

    /// Reads a manifest written by [`Manifest::write`].
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let content = fs::read_to_string(path).map_err(|e| ManifestError::io(path, e))?;
        Ok(serde_json::from_str(&content)?)
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_else(|| MANIFEST_FILE_NAME.into());
    name.push(TEMP_SUFFIX);
    path.with_file_name(name)
}

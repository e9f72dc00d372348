//! Descriptors of remote files discovered in a listing.
//!
//! A [`FileDescriptor`] can only be built through [`FileDescriptor::new`],
//! which rejects filenames that would escape the destination directory.
//! Everything downstream (fetcher, scheduler, manifest) can therefore join
//! `filename` onto a local directory without further checks.

use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use url::Url;

/// Errors raised when a descriptor would be unsafe or meaningless.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DescriptorError {
    /// Filename is empty or whitespace.
    #[error("empty filename for {url}")]
    EmptyFilename {
        /// URL the descriptor pointed at.
        url: String,
    },

    /// Filename is absolute, contains `..` or names no file at all.
    #[error("unsafe filename '{filename}': must be a relative path without parent components")]
    UnsafeFilename {
        /// The rejected filename.
        filename: String,
    },

    /// URL is not absolute.
    #[error("invalid file URL: {url}")]
    InvalidUrl {
        /// The rejected URL.
        url: String,
    },
}

/// One remote artifact to materialize locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    filename: String,
    url: Url,
    expected_size: Option<u64>,
    last_modified: Option<String>,
}

impl FileDescriptor {
    /// Creates a descriptor after validating the filename and URL.
    ///
    /// Nested relative names (`disc1/001.mp3`) are accepted and stored in
    /// normalized form (`disc1//./001.mp3` becomes `disc1/001.mp3`); absolute
    /// paths, backslash separators and `..` components are not.
    ///
    /// # Errors
    ///
    /// Returns [`DescriptorError`] when the filename is empty or unsafe, or the
    /// URL does not parse as an absolute URL.
    ///
    /// # Example
    ///
    /// ```
    /// use archive_fetch::FileDescriptor;
    ///
    /// assert!(FileDescriptor::new("001.mp3", "https://example.com/001.mp3").is_ok());
    /// assert!(FileDescriptor::new("../../etc/passwd", "https://example.com/x").is_err());
    /// ```
    pub fn new(filename: impl Into<String>, url: &str) -> Result<Self, DescriptorError> {
        let filename = filename.into();
        let parsed = Url::parse(url).map_err(|_| DescriptorError::InvalidUrl {
            url: url.to_string(),
        })?;

        if filename.trim().is_empty() {
            return Err(DescriptorError::EmptyFilename {
                url: url.to_string(),
            });
        }
        let Some(filename) = normalize_relative_path(&filename) else {
            return Err(DescriptorError::UnsafeFilename { filename });
        };

        Ok(Self {
            filename,
            url: parsed,
            expected_size: None,
            last_modified: None,
        })
    }

    /// Attaches the size advertised by the listing.
    #[must_use]
    pub fn with_expected_size(mut self, size: Option<u64>) -> Self {
        self.expected_size = size;
        self
    }

    /// Attaches the listing's last-modified text (kept verbatim).
    #[must_use]
    pub fn with_last_modified(mut self, last_modified: Option<String>) -> Self {
        self.last_modified = last_modified;
        self
    }

    /// Relative filename under the destination directory.
    #[must_use]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Absolute download URL.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Size advertised by the listing, if it was an exact byte count.
    #[must_use]
    pub fn expected_size(&self) -> Option<u64> {
        self.expected_size
    }

    /// Last-modified text from the listing.
    #[must_use]
    pub fn last_modified(&self) -> Option<&str> {
        self.last_modified.as_deref()
    }

    /// Local path for this descriptor inside `destination_dir`.
    #[must_use]
    pub fn local_path(&self, destination_dir: &Path) -> PathBuf {
        destination_dir.join(&self.filename)
    }
}

/// Rebuilds `name` from its normal components, joined with `/`.
///
/// Returns `None` for names that are absolute, contain `..`, backslashes or
/// NUL, or have no normal component at all. Repeated separators and interior
/// `.` segments collapse, so aliases of one path share one spelling.
fn normalize_relative_path(name: &str) -> Option<String> {
    if name.contains('\\') || name.contains('\0') {
        return None;
    }
    let mut parts = Vec::new();
    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

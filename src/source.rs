//! Item URL parsing.
//!
//! Users hand the tool the URL of an archive item, either its landing page
//! (`https://archive.org/details/<identifier>`) or its download index
//! (`https://archive.org/download/<identifier>`). Both forms resolve to the
//! same [`ArchiveSource`].

use std::fmt;

use thiserror::Error;
use url::Url;

const DETAILS_SEGMENT: &str = "details";
const DOWNLOAD_SEGMENT: &str = "download";

/// Errors that can occur while interpreting an item URL.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SourceError {
    /// The input is not an absolute http(s) URL.
    #[error("invalid item URL: {url}")]
    InvalidUrl {
        /// The rejected input.
        url: String,
    },

    /// The URL path has no `/details/<identifier>` or `/download/<identifier>` segment.
    #[error("item URL must contain '/details/<identifier>' or '/download/<identifier>': {url}")]
    MissingIdentifier {
        /// The rejected input.
        url: String,
    },
}

/// A remote archive item: where the user pointed us and where its files live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSource {
    base_url: String,
    download_url: Url,
    identifier: String,
}

impl ArchiveSource {
    /// Parses an item URL.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::InvalidUrl`] for unparsable or non-http(s) input
    /// and [`SourceError::MissingIdentifier`] when no identifier segment exists.
    ///
    /// # Example
    ///
    /// ```
    /// use archive_fetch::ArchiveSource;
    ///
    /// let source = ArchiveSource::parse("https://archive.org/details/quran-recitation").unwrap();
    /// assert_eq!(source.identifier(), "quran-recitation");
    /// assert_eq!(
    ///     source.download_url().as_str(),
    ///     "https://archive.org/download/quran-recitation"
    /// );
    /// ```
    pub fn parse(input: &str) -> Result<Self, SourceError> {
        let trimmed = input.trim();
        let parsed = Url::parse(trimmed).map_err(|_| SourceError::InvalidUrl {
            url: trimmed.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(SourceError::InvalidUrl {
                url: trimmed.to_string(),
            });
        }

        let segments: Vec<&str> = parsed
            .path_segments()
            .map(|segments| segments.collect())
            .unwrap_or_default();
        let position = segments
            .iter()
            .position(|segment| *segment == DETAILS_SEGMENT || *segment == DOWNLOAD_SEGMENT)
            .ok_or_else(|| SourceError::MissingIdentifier {
                url: trimmed.to_string(),
            })?;
        let identifier = segments
            .get(position + 1)
            .filter(|segment| !segment.is_empty())
            .ok_or_else(|| SourceError::MissingIdentifier {
                url: trimmed.to_string(),
            })?
            .to_string();

        let mut download_path: Vec<&str> = segments[..position].to_vec();
        download_path.push(DOWNLOAD_SEGMENT);
        download_path.push(&identifier);

        let mut download_url = parsed.clone();
        download_url.set_query(None);
        download_url.set_fragment(None);
        download_url.set_path(&format!("/{}", download_path.join("/")));

        Ok(Self {
            base_url: trimmed.to_string(),
            download_url,
            identifier,
        })
    }

    /// The URL exactly as the user supplied it.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The directory-index URL that lists the item's files.
    #[must_use]
    pub fn download_url(&self) -> &Url {
        &self.download_url
    }

    /// The item identifier; also the name of the local destination directory.
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }
}

impl fmt::Display for ArchiveSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.identifier, self.download_url)
    }
}

//! Error types for listing discovery.

use thiserror::Error;

use crate::transport::TransportError;

/// Errors raised while discovering the files of an item.
///
/// Both variants are non-fatal: the run logs them and proceeds with an empty
/// descriptor set.
#[derive(Debug, Error)]
pub enum ListingError {
    /// The directory index could not be fetched.
    #[error("directory index {url} unreachable: {source}")]
    Unreachable {
        /// Index URL.
        url: String,
        /// Underlying transport failure.
        #[source]
        source: TransportError,
    },

    /// The document contains no table rows to read.
    #[error("directory index {url} is not a file table")]
    Malformed {
        /// Index URL.
        url: String,
    },
}

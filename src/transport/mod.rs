//! HTTP capability consumed by the core.
//!
//! The listing parser, fetcher and scheduler never talk to reqwest directly;
//! they go through the [`Transport`] trait so tests can inject instrumented
//! stubs. [`HttpTransport`] is the production implementation.
//!
//! # Contract
//!
//! - [`Transport::head_size`] is a metadata-only probe returning the remote
//!   size, or `None` when the server does not advertise one.
//! - [`Transport::get_stream`] issues a GET, optionally with
//!   `Range: bytes=<start>-`, and reports whether the server answered with
//!   partial content (206) or the full body (200).
//! - Non-success statuses are returned as [`TransportError::HttpStatus`].

mod error;
mod http;

use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::Stream;

pub use error::TransportError;
pub use http::{CONNECT_TIMEOUT_SECS, HttpTransport, READ_TIMEOUT_SECS};

/// Streaming response body.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

/// Response to a streaming GET.
pub struct TransportResponse {
    /// `true` when the server acknowledged a range request with 206 Partial Content.
    pub partial: bool,
    /// Length of this response body, if advertised.
    pub content_length: Option<u64>,
    /// Body chunks.
    pub body: BodyStream,
}

impl fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportResponse")
            .field("partial", &self.partial)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// HTTP operations required by the downloader.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetches a whole document as text (used for the directory index).
    async fn get_text(&self, url: &str) -> Result<String, TransportError>;

    /// Returns the remote size of `url` without transferring the body.
    async fn head_size(&self, url: &str) -> Result<Option<u64>, TransportError>;

    /// Starts a streaming GET, requesting bytes from `range_start` onwards when given.
    async fn get_stream(
        &self,
        url: &str,
        range_start: Option<u64>,
    ) -> Result<TransportResponse, TransportError>;
}

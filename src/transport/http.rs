//! reqwest-backed [`Transport`].
//!
//! One client is created per run and shared by every worker, taking
//! advantage of connection pooling.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{CONTENT_LENGTH, RANGE};
use reqwest::{Client, StatusCode};
use tracing::{debug, instrument};

use super::{Transport, TransportError, TransportResponse};

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default idle read timeout (5 minutes).
pub const READ_TIMEOUT_SECS: u64 = 300;

const USER_AGENT: &str = concat!("archive-fetch/", env!("CARGO_PKG_VERSION"));

/// HTTP transport with streaming and byte-range support.
///
/// # Example
///
/// ```no_run
/// use archive_fetch::{HttpTransport, Transport};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let transport = HttpTransport::new();
/// let size = transport.head_size("https://archive.org/download/item/001.mp3").await?;
/// println!("remote size: {size:?}");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTransport {
    /// Creates a transport with default timeouts.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    pub fn new() -> Self {
        Self::with_timeouts(CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// Creates a transport with explicit timeout values.
    ///
    /// The read timeout bounds each read from the socket, not the whole
    /// transfer, so large files are not cut off while data keeps flowing.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the supplied
    /// timeout configuration.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn with_timeouts(connect_timeout_secs: u64, read_timeout_secs: u64) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .read_timeout(Duration::from_secs(read_timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self { client }
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        url: &str,
    ) -> Result<reqwest::Response, TransportError> {
        let response = request.send().await.map_err(|e| map_request_error(url, e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::http_status(url, status.as_u16()));
        }
        Ok(response)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[instrument(level = "debug", skip(self))]
    async fn get_text(&self, url: &str) -> Result<String, TransportError> {
        let response = self.send(self.client.get(url), url).await?;
        response.text().await.map_err(|e| map_request_error(url, e))
    }

    #[instrument(level = "debug", skip(self))]
    async fn head_size(&self, url: &str) -> Result<Option<u64>, TransportError> {
        let response = self.send(self.client.head(url), url).await?;
        // `Response::content_length` reflects the (empty) HEAD body, not the header.
        let size = header_content_length(&response);
        debug!(?size, "metadata probe complete");
        Ok(size)
    }

    #[instrument(level = "debug", skip(self))]
    async fn get_stream(
        &self,
        url: &str,
        range_start: Option<u64>,
    ) -> Result<TransportResponse, TransportError> {
        let mut request = self.client.get(url);
        if let Some(start) = range_start {
            request = request.header(RANGE, format!("bytes={start}-"));
        }
        let response = self.send(request, url).await?;

        let partial = response.status() == StatusCode::PARTIAL_CONTENT;
        let content_length = header_content_length(&response);
        debug!(
            status = response.status().as_u16(),
            partial,
            ?content_length,
            "response headers received"
        );

        let owned_url = url.to_string();
        let body = response
            .bytes_stream()
            .map(move |chunk| chunk.map_err(|e| map_request_error(&owned_url, e)));

        Ok(TransportResponse {
            partial,
            content_length,
            body: Box::pin(body),
        })
    }
}

fn map_request_error(url: &str, error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::timeout(url)
    } else {
        TransportError::network(url, error)
    }
}

fn header_content_length(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
}

//! In-memory `Transport` with request counters and an in-flight gauge.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use archive_fetch::{BodyStream, Transport, TransportError, TransportResponse};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream;

/// Body chunk size used by the stub; small so every file spans several chunks.
pub const STUB_CHUNK_BYTES: usize = 4;

/// How the stub serves one URL.
#[derive(Debug, Clone)]
pub struct StubFile {
    pub body: Vec<u8>,
    /// Answer ranged GETs with 206 and the tail of the body.
    pub honor_range: bool,
    /// Answer ranged GETs with 416.
    pub reject_range: bool,
    /// Size reported by HEAD; defaults to the body length.
    pub reported_size: Option<u64>,
    pub head_fails: bool,
    /// Status returned for every GET instead of a body.
    pub get_status: Option<u16>,
    /// Emit this many bytes, then a body error.
    pub fail_after: Option<usize>,
    /// Delay before the GET response is returned.
    pub delay: Duration,
}

impl StubFile {
    pub fn new(body: &[u8]) -> Self {
        Self {
            body: body.to_vec(),
            honor_range: true,
            reject_range: false,
            reported_size: Some(body.len() as u64),
            head_fails: false,
            get_status: None,
            fail_after: None,
            delay: Duration::ZERO,
        }
    }

    pub fn ignoring_range(mut self) -> Self {
        self.honor_range = false;
        self
    }

    pub fn rejecting_range(mut self) -> Self {
        self.reject_range = true;
        self
    }

    pub fn reporting_size(mut self, size: Option<u64>) -> Self {
        self.reported_size = size;
        self
    }

    pub fn with_failing_head(mut self) -> Self {
        self.head_fails = true;
        self
    }

    pub fn with_get_status(mut self, status: u16) -> Self {
        self.get_status = Some(status);
        self
    }

    pub fn failing_after(mut self, bytes: usize) -> Self {
        self.fail_after = Some(bytes);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Debug, Default)]
struct Gauges {
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl Gauges {
    fn enter(self: &Arc<Self>) -> InFlightGuard {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        InFlightGuard(Arc::clone(self))
    }
}

/// Decrements the in-flight gauge when the response body is dropped.
struct InFlightGuard(Arc<Gauges>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Records every request it serves.
#[derive(Debug, Default)]
pub struct StubTransport {
    files: Mutex<HashMap<String, StubFile>>,
    listing: Mutex<Option<String>>,
    gauges: Arc<Gauges>,
    get_count: AtomicUsize,
    head_count: AtomicUsize,
    ranges: Mutex<Vec<(String, Option<u64>)>>,
}

impl StubTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, url: &str, file: StubFile) -> Self {
        self.files.lock().unwrap().insert(url.to_string(), file);
        self
    }

    pub fn with_listing(self, html: &str) -> Self {
        *self.listing.lock().unwrap() = Some(html.to_string());
        self
    }

    pub fn get_count(&self) -> usize {
        self.get_count.load(Ordering::SeqCst)
    }

    pub fn head_count(&self) -> usize {
        self.head_count.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.gauges.peak_in_flight.load(Ordering::SeqCst)
    }

    /// `(url, range_start)` for every GET, in request order.
    pub fn ranges(&self) -> Vec<(String, Option<u64>)> {
        self.ranges.lock().unwrap().clone()
    }

    fn file(&self, url: &str) -> Result<StubFile, TransportError> {
        self.files
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| TransportError::http_status(url, 404))
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn get_text(&self, url: &str) -> Result<String, TransportError> {
        self.listing
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| TransportError::http_status(url, 503))
    }

    async fn head_size(&self, url: &str) -> Result<Option<u64>, TransportError> {
        self.head_count.fetch_add(1, Ordering::SeqCst);
        let file = self.file(url)?;
        if file.head_fails {
            return Err(TransportError::http_status(url, 500));
        }
        Ok(file.reported_size)
    }

    async fn get_stream(
        &self,
        url: &str,
        range_start: Option<u64>,
    ) -> Result<TransportResponse, TransportError> {
        self.get_count.fetch_add(1, Ordering::SeqCst);
        self.ranges
            .lock()
            .unwrap()
            .push((url.to_string(), range_start));
        let file = self.file(url)?;

        let guard = self.gauges.enter();
        if !file.delay.is_zero() {
            tokio::time::sleep(file.delay).await;
        }
        if let Some(status) = file.get_status {
            return Err(TransportError::http_status(url, status));
        }

        let (partial, body) = match range_start {
            Some(_) if file.reject_range => return Err(TransportError::http_status(url, 416)),
            Some(start) if file.honor_range => {
                let start = usize::try_from(start).unwrap().min(file.body.len());
                (true, file.body[start..].to_vec())
            }
            _ => (false, file.body.clone()),
        };

        let mut items: Vec<Result<Bytes, TransportError>> = Vec::new();
        let limit = file.fail_after.unwrap_or(body.len()).min(body.len());
        for chunk in body[..limit].chunks(STUB_CHUNK_BYTES) {
            items.push(Ok(Bytes::copy_from_slice(chunk)));
        }
        if file.fail_after.is_some() {
            items.push(Err(TransportError::body(url, "connection reset by stub")));
        }

        let stream: BodyStream = Box::pin(stream::iter(items).map(move |item| {
            let _held = &guard;
            item
        }));
        Ok(TransportResponse {
            partial,
            content_length: Some(body.len() as u64),
            body: stream,
        })
    }
}

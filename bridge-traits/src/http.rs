//! Remote fetch abstraction
//!
//! The sync core only ever downloads binaries from the shop, so the seam is a
//! single streamed `GET`. Implementations do not retry: redelivery is the
//! message bus's job.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tokio::io::AsyncRead;

use crate::error::Result;

/// A `GET` request for a remote resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: HashMap<String, String>,
    /// Overrides the client-wide timeout for this request
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: HashMap::new(),
            timeout: None,
        }
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }
}

/// Streamed response body
///
/// The status and headers are available before the body is consumed, so
/// callers can reject a response without reading it.
pub struct DownloadResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Box<dyn AsyncRead + Send + Unpin>,
}

impl DownloadResponse {
    /// Response around an in-memory body
    pub fn from_bytes(status: u16, body: impl Into<Bytes>) -> Self {
        let body: Bytes = body.into();
        Self {
            status,
            headers: HashMap::new(),
            body: Box::new(std::io::Cursor::new(body)),
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Case-insensitive header lookup
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }
}

impl fmt::Debug for DownloadResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// HTTP transport used to reach the shop
///
/// Any status, including 404 or 500, is returned as `Ok`; the caller decides
/// what it means. DNS, connect, TLS and timeout failures are `Err`.
///
/// ```ignore
/// use bridge_traits::http::{HttpClient, HttpRequest};
///
/// let response = client
///     .download(HttpRequest::get("https://shop.example.com/media/image/ab/shoe.jpg"))
///     .await?;
/// if response.status != 200 {
///     // reject without reading the body
/// }
/// ```
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn download(&self, request: HttpRequest) -> Result<DownloadResponse>;
}

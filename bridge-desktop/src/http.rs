//! Shop downloads over `reqwest`

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    http::{DownloadResponse, HttpClient, HttpRequest},
};
use futures_util::TryStreamExt;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::io::StreamReader;
use tracing::{debug, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Pooled, TLS-enabled HTTP client
///
/// Requests are sent exactly once. Failed deliveries are retried by the
/// message bus, not here.
pub struct ReqwestHttpClient {
    client: Client,
}

impl ReqwestHttpClient {
    /// Client with the default 30 second timeout
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(30))
    }

    /// The timeout covers the whole exchange including the body transfer.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT.min(timeout))
            .pool_max_idle_per_host(10)
            .user_agent(concat!("catalog-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                BridgeError::OperationFailed(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn map_transport_error(url: &str, e: reqwest::Error) -> BridgeError {
        if e.is_timeout() {
            BridgeError::Timeout(format!("Request to {} timed out", url))
        } else if e.is_connect() {
            BridgeError::NotAvailable(format!("Connection to {} failed: {}", url, e))
        } else {
            BridgeError::OperationFailed(format!("Request to {} failed: {}", url, e))
        }
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn download(&self, request: HttpRequest) -> Result<DownloadResponse> {
        let HttpRequest {
            url,
            headers,
            timeout,
        } = request;
        debug!(url = %url, "Downloading");

        let mut builder = self.client.get(&url);
        for (key, value) in headers {
            builder = builder.header(key, value);
        }
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(|e| {
            warn!(url = %url, error = %e, "Download failed");
            Self::map_transport_error(&url, e)
        })?;

        let status = response.status().as_u16();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|s| (k.to_string(), s.to_string())))
            .collect();

        let stream = response.bytes_stream().map_err(std::io::Error::other);

        Ok(DownloadResponse {
            status,
            headers,
            body: Box::new(StreamReader::new(stream)),
        })
    }
}

//! # Core Configuration Module
//!
//! Provides configuration management for the catalog synchronizer.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds all dependencies and settings for the sync core.
//! It enforces fail-fast validation so that a misconfigured deployment is
//! rejected before the first message is consumed.
//!
//! ## Required Settings
//!
//! - `database_path` - SQLite database holding the CMS entities
//! - `shop_base_url` - Base URL of the shop that serves media binaries
//! - `media_collection_key` - Key of the system collection new media lands in
//!
//! ## Optional Dependencies (with platform defaults)
//!
//! - `HttpClient` - remote fetches (desktop default: reqwest)
//! - `ContentStorage` - media binaries (desktop default: local directory tree)
//!
//! When the `desktop-shims` feature is enabled, the desktop defaults are
//! injected automatically if not provided.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::time::Duration;
//!
//! let config = CoreConfig::builder()
//!     .database_path("/var/lib/catalog-sync/cms.db")
//!     .shop_base_url("https://shop.example.com")
//!     .media_collection_key("sylius_media")
//!     .fetch_timeout(Duration::from_secs(10))
//!     .build()?;
//! # Ok::<(), core_runtime::Error>(())
//! ```

use crate::error::{Error, Result};
use bridge_traits::{ContentStorage, HttpClient};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Default timeout for a single remote fetch
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound accepted for `fetch_timeout`
pub const MAX_FETCH_TIMEOUT: Duration = Duration::from_secs(600);

/// Default number of messages processed concurrently
pub const DEFAULT_MAX_CONCURRENT_MESSAGES: usize = 4;

/// Upper bound accepted for `max_concurrent_messages`
pub const MAX_CONCURRENT_MESSAGES: usize = 64;

/// Default capacity of the event broadcast channel
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

/// Core configuration for the catalog synchronizer.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Path to the SQLite database file
    pub database_path: PathBuf,

    /// Base URL of the shop, without trailing slash
    pub shop_base_url: String,

    /// Key of the system collection that receives synchronized media
    pub media_collection_key: String,

    /// Root directory for stored media binaries
    pub storage_root: PathBuf,

    /// Directory for download temp files
    pub temp_dir: PathBuf,

    /// Timeout applied to each remote fetch
    pub fetch_timeout: Duration,

    /// Maximum number of messages in flight in the consumer loop
    pub max_concurrent_messages: usize,

    /// Capacity of the event bus
    pub event_buffer_size: usize,

    /// HTTP client used for remote fetches
    pub http_client: Arc<dyn HttpClient>,

    /// Backend for media binaries
    pub content_storage: Arc<dyn ContentStorage>,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("database_path", &self.database_path)
            .field("shop_base_url", &self.shop_base_url)
            .field("media_collection_key", &self.media_collection_key)
            .field("storage_root", &self.storage_root)
            .field("temp_dir", &self.temp_dir)
            .field("fetch_timeout", &self.fetch_timeout)
            .field("max_concurrent_messages", &self.max_concurrent_messages)
            .field("event_buffer_size", &self.event_buffer_size)
            .field("http_client", &"HttpClient { ... }")
            .field("content_storage", &"ContentStorage { ... }")
            .finish()
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Full URL of an image below the shop's media endpoint
    pub fn image_url(&self, path: &str) -> String {
        format!("{}/media/image/{}", self.shop_base_url, path.trim_start_matches('/'))
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Database path is not empty
    /// - Shop base URL is an http(s) URL
    /// - Media collection key is not empty
    /// - Fetch timeout is within (0, 10 min]
    /// - Concurrency is within 1..=64 and the event buffer is not empty
    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        if !(self.shop_base_url.starts_with("http://") || self.shop_base_url.starts_with("https://"))
        {
            return Err(Error::Config(format!(
                "Shop base URL must start with http:// or https://, got '{}'",
                self.shop_base_url
            )));
        }

        if self.media_collection_key.trim().is_empty() {
            return Err(Error::Config(
                "Media collection key cannot be empty".to_string(),
            ));
        }

        if self.fetch_timeout.is_zero() || self.fetch_timeout > MAX_FETCH_TIMEOUT {
            return Err(Error::Config(format!(
                "Fetch timeout must be between 0 and {} seconds, got {:?}",
                MAX_FETCH_TIMEOUT.as_secs(),
                self.fetch_timeout
            )));
        }

        if self.max_concurrent_messages == 0
            || self.max_concurrent_messages > MAX_CONCURRENT_MESSAGES
        {
            return Err(Error::Config(format!(
                "Max concurrent messages must be between 1 and {}, got {}",
                MAX_CONCURRENT_MESSAGES, self.max_concurrent_messages
            )));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

fn default_storage_root() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("catalog-sync")
        .join("media")
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client(timeout: Duration) -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::ReqwestHttpClient;

    let client = ReqwestHttpClient::with_timeout(timeout)
        .map_err(|e| Error::Internal(format!("Failed to create default HttpClient: {}", e)))?;
    Ok(Arc::new(client))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client(_timeout: Duration) -> Result<Arc<dyn HttpClient>> {
    Err(Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "HttpClient implementation is required for remote fetches. \
                 Desktop: enable the 'desktop-shims' feature to use the default ReqwestHttpClient. \
                 Other hosts: inject an implementation with .http_client()."
            .to_string(),
    })
}

#[cfg(feature = "desktop-shims")]
fn provide_default_content_storage(root: &std::path::Path) -> Result<Arc<dyn ContentStorage>> {
    use bridge_desktop::LocalContentStorage;

    Ok(Arc::new(LocalContentStorage::with_root(root)))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_content_storage(_root: &std::path::Path) -> Result<Arc<dyn ContentStorage>> {
    Err(Error::CapabilityMissing {
        capability: "ContentStorage".to_string(),
        message: "ContentStorage implementation is required for media binaries. \
                 Desktop: enable the 'desktop-shims' feature to use the default LocalContentStorage. \
                 Other hosts: inject an implementation with .content_storage()."
            .to_string(),
    })
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    database_path: Option<PathBuf>,
    shop_base_url: Option<String>,
    media_collection_key: Option<String>,
    storage_root: Option<PathBuf>,
    temp_dir: Option<PathBuf>,
    fetch_timeout: Option<Duration>,
    max_concurrent_messages: Option<usize>,
    event_buffer_size: Option<usize>,
    http_client: Option<Arc<dyn HttpClient>>,
    content_storage: Option<Arc<dyn ContentStorage>>,
}

impl CoreConfigBuilder {
    /// Sets the database file path (required).
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Sets the shop base URL (required). A trailing `/` is trimmed.
    pub fn shop_base_url(mut self, url: impl Into<String>) -> Self {
        self.shop_base_url = Some(url.into());
        self
    }

    /// Sets the system collection key for synchronized media (required).
    pub fn media_collection_key(mut self, key: impl Into<String>) -> Self {
        self.media_collection_key = Some(key.into());
        self
    }

    pub fn storage_root<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.storage_root = Some(path.into());
        self
    }

    pub fn temp_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.temp_dir = Some(path.into());
        self
    }

    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }

    pub fn max_concurrent_messages(mut self, limit: usize) -> Self {
        self.max_concurrent_messages = Some(limit);
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Sets the HTTP client implementation.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Sets the content storage implementation.
    pub fn content_storage(mut self, storage: Arc<dyn ContentStorage>) -> Self {
        self.content_storage = Some(storage);
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// Returns an error if a required setting is missing, a value is out of
    /// range, or a bridge is missing and no desktop default is available.
    pub fn build(self) -> Result<CoreConfig> {
        let database_path = self.database_path.ok_or_else(|| {
            Error::Config("Database path is required. Use .database_path() to set it.".to_string())
        })?;

        let shop_base_url = self
            .shop_base_url
            .ok_or_else(|| {
                Error::Config(
                    "Shop base URL is required. Use .shop_base_url() to set it.".to_string(),
                )
            })?
            .trim_end_matches('/')
            .to_string();

        let media_collection_key = self.media_collection_key.ok_or_else(|| {
            Error::Config(
                "Media collection key is required. Use .media_collection_key() to set it."
                    .to_string(),
            )
        })?;

        let storage_root = self.storage_root.unwrap_or_else(default_storage_root);
        let fetch_timeout = self.fetch_timeout.unwrap_or(DEFAULT_FETCH_TIMEOUT);

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client(fetch_timeout)?,
        };

        let content_storage = match self.content_storage {
            Some(storage) => storage,
            None => provide_default_content_storage(&storage_root)?,
        };

        let config = CoreConfig {
            database_path,
            shop_base_url,
            media_collection_key,
            storage_root,
            temp_dir: self.temp_dir.unwrap_or_else(std::env::temp_dir),
            fetch_timeout,
            max_concurrent_messages: self
                .max_concurrent_messages
                .unwrap_or(DEFAULT_MAX_CONCURRENT_MESSAGES),
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
            http_client,
            content_storage,
        };

        config.validate()?;

        Ok(config)
    }
}

//! Content Storage Abstraction
//!
//! Provides a backend-agnostic trait for persisting media binaries. The sync
//! core hands over a local file and receives opaque [`StorageOptions`] back,
//! which it stores verbatim on the file version row.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::error::Result;

/// Opaque reference to stored content
///
/// The format belongs to the storage backend. Callers must persist and return
/// it unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorageOptions(String);

impl StorageOptions {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for StorageOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Content storage trait
///
/// Abstracts where media binaries live:
/// - Desktop: a directory tree on the local filesystem
/// - Server deployments: object storage (S3, GCS, ...)
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::ContentStorage;
///
/// async fn store(storage: &dyn ContentStorage, path: &Path) -> Result<StorageOptions> {
///     storage.save(path, "photo.jpg").await
/// }
/// ```
#[async_trait]
pub trait ContentStorage: Send + Sync {
    /// Copy the file at `local_path` into the store under `file_name`
    ///
    /// The local file is left in place; the caller owns its cleanup.
    async fn save(&self, local_path: &Path, file_name: &str) -> Result<StorageOptions>;

    /// Read stored content back into memory
    async fn load(&self, options: &StorageOptions) -> Result<Bytes>;

    /// Delete stored content
    ///
    /// Removing content that no longer exists is not an error.
    async fn remove(&self, options: &StorageOptions) -> Result<()>;
}

//! Content Storage Implementation on the local file system

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::{ContentStorage, StorageOptions},
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Default number of segment directories
const DEFAULT_SEGMENTS: u32 = 10;

/// Directory-tree content storage
///
/// Files are spread over numbered segment directories below `root`
/// (`root/03/photo.jpg`) so that no single directory grows unbounded. Name
/// collisions inside a segment are resolved by appending `-1`, `-2`, ...
///
/// The returned [`StorageOptions`] is a JSON object
/// `{"segment": "03", "fileName": "photo.jpg"}`.
pub struct LocalContentStorage {
    root: PathBuf,
    segments: u32,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LocalStorageOptions {
    segment: String,
    file_name: String,
}

impl LocalContentStorage {
    /// Create a storage rooted in the platform data directory
    pub fn new() -> Self {
        let root = dirs::data_dir()
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".local")
                    .join("share")
            })
            .join("catalog-sync")
            .join("media");

        Self::with_root(root)
    }

    /// Create a storage rooted at a custom directory
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            segments: DEFAULT_SEGMENTS,
        }
    }

    /// Override the number of segment directories (minimum 1)
    pub fn with_segments(mut self, segments: u32) -> Self {
        self.segments = segments.max(1);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stable segment for a file name
    fn segment_for(&self, file_name: &str) -> String {
        let digest = Sha256::digest(file_name.as_bytes());
        let value = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
        format!("{:02}", value % self.segments + 1)
    }

    /// Strip any directory components from an incoming file name
    fn sanitize_file_name(file_name: &str) -> Result<String> {
        Path::new(file_name)
            .file_name()
            .and_then(|name| name.to_str())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                BridgeError::OperationFailed(format!("Invalid file name: '{}'", file_name))
            })
    }

    /// Candidate names for `file_name`: the name itself, then a counter
    /// before the extension
    fn candidate_name(file_name: &str, attempt: u32) -> String {
        if attempt == 0 {
            return file_name.to_string();
        }

        let path = Path::new(file_name);
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(file_name);
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => format!("{}-{}.{}", stem, attempt, ext),
            None => format!("{}-{}", stem, attempt),
        }
    }

    /// Create the first free name in `dir`
    ///
    /// The name is claimed with `create_new`, so concurrent saves of the same
    /// name never share a file.
    async fn claim_file(dir: &Path, file_name: &str) -> Result<(String, fs::File)> {
        let mut attempt = 0u32;
        loop {
            let candidate = Self::candidate_name(file_name, attempt);
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(dir.join(&candidate))
                .await
            {
                Ok(file) => return Ok((candidate, file)),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(BridgeError::Io(e)),
            }
        }
    }

    async fn copy_into(local_path: &Path, target: &mut fs::File) -> std::io::Result<u64> {
        let mut source = fs::File::open(local_path).await?;
        let bytes = tokio::io::copy(&mut source, target).await?;
        target.flush().await?;
        target.sync_all().await?;
        Ok(bytes)
    }

    fn parse_options(options: &StorageOptions) -> Result<LocalStorageOptions> {
        let parsed: LocalStorageOptions = serde_json::from_str(options.as_str()).map_err(|e| {
            BridgeError::OperationFailed(format!(
                "Invalid storage options '{}': {}",
                options, e
            ))
        })?;

        // Both parts are written by `save`; anything else is not ours.
        let segment_ok = !parsed.segment.is_empty()
            && parsed.segment.chars().all(|c| c.is_ascii_digit());
        if !segment_ok || Self::sanitize_file_name(&parsed.file_name)? != parsed.file_name {
            return Err(BridgeError::OperationFailed(format!(
                "Storage options '{}' do not point into this storage",
                options
            )));
        }

        Ok(parsed)
    }

    fn resolve(&self, options: &LocalStorageOptions) -> PathBuf {
        self.root.join(&options.segment).join(&options.file_name)
    }
}

impl Default for LocalContentStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentStorage for LocalContentStorage {
    async fn save(&self, local_path: &Path, file_name: &str) -> Result<StorageOptions> {
        let file_name = Self::sanitize_file_name(file_name)?;
        let segment = self.segment_for(&file_name);
        let dir = self.root.join(&segment);

        fs::create_dir_all(&dir).await?;

        let (stored_name, mut file) = Self::claim_file(&dir, &file_name).await?;
        let target = dir.join(&stored_name);
        let bytes = match Self::copy_into(local_path, &mut file).await {
            Ok(bytes) => bytes,
            Err(e) => {
                drop(file);
                // Release the claimed name
                if let Err(cleanup) = fs::remove_file(&target).await {
                    warn!(path = ?target, error = %cleanup, "Failed to release stored name");
                }
                return Err(BridgeError::Io(e));
            }
        };

        info!(path = ?target, size = bytes, "Stored media content");

        let options = LocalStorageOptions {
            segment,
            file_name: stored_name,
        };
        let raw = serde_json::to_string(&options).map_err(|e| {
            BridgeError::OperationFailed(format!("Failed to encode storage options: {}", e))
        })?;

        Ok(StorageOptions::new(raw))
    }

    async fn load(&self, options: &StorageOptions) -> Result<Bytes> {
        let parsed = Self::parse_options(options)?;
        let path = self.resolve(&parsed);

        let data = fs::read(&path).await?;
        debug!(path = ?path, size = data.len(), "Loaded media content");
        Ok(Bytes::from(data))
    }

    async fn remove(&self, options: &StorageOptions) -> Result<()> {
        let parsed = Self::parse_options(options)?;
        let path = self.resolve(&parsed);

        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = ?path, "Removed media content");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BridgeError::Io(e)),
        }
    }
}

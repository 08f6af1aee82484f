//! # Image Media Adapter
//!
//! Mirrors shop images into versioned media.
//!
//! ## Workflow
//!
//! 1. Resolve the bridge for the image id, creating media and bridge on first
//!    sight
//! 2. Download `<base_url>/media/image/<path>` into a temporary file
//! 3. Compare the byte count with the latest file version
//! 4. Stage a new version (upload, version row, default metadata) or nothing
//!
//! Everything is staged on the caller's [`UnitOfWork`]; the caller commits.
//! A failure at any step removes what this call staged.
//!
//! ## Idempotency
//!
//! Only the size is compared. A changed image with the same byte count is
//! treated as unchanged.

use crate::error::{Result, SyncError};
use crate::payload::ImagePayload;
use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpRequest};
use bridge_traits::time::Clock;
use core_library::models::{
    ExternalId, File, FileVersion, FileVersionMeta, Media, MediaAggregate, IMAGE_MEDIA_TYPE_ID,
};
use core_library::repositories::{
    CollectionRepository, ImageMediaBridgeRepository, MediaRepository, MediaTypeRepository,
    SqliteCollectionRepository, SqliteImageMediaBridgeRepository, SqliteMediaRepository,
    SqliteMediaTypeRepository, SqliteSystemCollectionManager, SystemCollectionManager,
};
use core_library::{PendingUpload, PendingWrite, UnitOfWork};
use core_runtime::config::CoreConfig;
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempPath;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, error, info, instrument};

/// Mime type recorded when neither the content nor the response names one
const FALLBACK_MIME_TYPE: &str = "image/jpeg";

/// What a synchronize call staged
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSyncResult {
    /// A new file version was staged
    VersionAdded {
        media_id: String,
        version: i64,
        size: i64,
        /// The media was created by this call
        created: bool,
    },
    /// Same size as the latest version, but metadata for a new locale
    MetadataAdded {
        media_id: String,
        version: i64,
        locale: String,
    },
    /// Nothing staged
    Unchanged { media_id: String },
}

impl ImageSyncResult {
    pub fn media_id(&self) -> &str {
        match self {
            ImageSyncResult::VersionAdded { media_id, .. }
            | ImageSyncResult::MetadataAdded { media_id, .. }
            | ImageSyncResult::Unchanged { media_id } => media_id,
        }
    }
}

/// Image synchronization interface
#[async_trait]
pub trait ImageAdapter: Send + Sync {
    /// Bring the media mirroring `payload.id` up to date with the shop
    async fn synchronize(
        &self,
        uow: &mut UnitOfWork,
        payload: &ImagePayload,
    ) -> Result<ImageSyncResult>;

    /// Stage removal of the media mirroring `id`
    ///
    /// Returns `false` if the id was never synchronized.
    async fn remove(&self, uow: &mut UnitOfWork, id: ExternalId) -> Result<bool>;
}

/// Settings of the image adapter
#[derive(Debug, Clone)]
pub struct ImageAdapterSettings {
    /// Shop base URL without trailing `/`
    pub base_url: String,
    /// Key of the system collection images are filed under
    pub collection_key: String,
    /// Directory downloads are written to before upload
    pub temp_dir: PathBuf,
    pub fetch_timeout: Duration,
}

impl ImageAdapterSettings {
    pub fn from_config(config: &CoreConfig) -> Self {
        Self {
            base_url: config.shop_base_url.clone(),
            collection_key: config.media_collection_key.clone(),
            temp_dir: config.temp_dir.clone(),
            fetch_timeout: config.fetch_timeout,
        }
    }

    pub fn image_url(&self, path: &str) -> String {
        format!(
            "{}/media/image/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// Repositories the image adapter reads and stages through
#[derive(Clone)]
pub struct ImageRepositories {
    pub bridges: Arc<dyn ImageMediaBridgeRepository>,
    pub media: Arc<dyn MediaRepository>,
    pub media_types: Arc<dyn MediaTypeRepository>,
    pub collections: Arc<dyn CollectionRepository>,
    pub system_collections: Arc<dyn SystemCollectionManager>,
}

impl ImageRepositories {
    pub fn sqlite(pool: &SqlitePool) -> Self {
        Self {
            bridges: Arc::new(SqliteImageMediaBridgeRepository::new(pool.clone())),
            media: Arc::new(SqliteMediaRepository::new(pool.clone())),
            media_types: Arc::new(SqliteMediaTypeRepository::new(pool.clone())),
            collections: Arc::new(SqliteCollectionRepository::new(pool.clone())),
            system_collections: Arc::new(SqliteSystemCollectionManager::new(pool.clone())),
        }
    }
}

/// A downloaded image waiting in a temporary file
struct DownloadedImage {
    local: TempPath,
    size: i64,
    mime_type: String,
}

/// Image adapter backed by the content library
pub struct ImageMediaAdapter {
    repositories: ImageRepositories,
    http_client: Arc<dyn HttpClient>,
    clock: Arc<dyn Clock>,
    settings: ImageAdapterSettings,
}

impl ImageMediaAdapter {
    pub fn new(
        repositories: ImageRepositories,
        http_client: Arc<dyn HttpClient>,
        clock: Arc<dyn Clock>,
        settings: ImageAdapterSettings,
    ) -> Self {
        Self {
            repositories,
            http_client,
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> &ImageAdapterSettings {
        &self.settings
    }

    async fn stage(&self, uow: &mut UnitOfWork, payload: &ImagePayload) -> Result<ImageSyncResult> {
        payload.validate()?;
        let now = self.clock.unix_timestamp();

        let (bridge, created) = match self.repositories.bridges.find_by_id(uow, payload.id).await? {
            Some(bridge) => (bridge, false),
            None => {
                let media = Media::new(now);
                uow.persist(PendingWrite::UpsertMedia(media.clone()));
                let bridge = self.repositories.bridges.create(payload.id, &media);
                self.repositories.bridges.add(uow, bridge.clone());
                debug!(external_id = %payload.id, media_id = %media.id, "Created image bridge");
                (bridge, true)
            }
        };

        let aggregate = self
            .repositories
            .media
            .find_aggregate(uow, &bridge.media_id)
            .await?
            .ok_or_else(|| SyncError::NotFound {
                entity_type: "Media".to_string(),
                id: bridge.media_id.clone(),
            })?;

        let download = self.download(payload).await?;

        if let Some(latest) = aggregate.latest_version() {
            if latest.size == download.size {
                return Ok(self.stage_locale(uow, &aggregate, latest, payload));
            }
        }

        self.stage_version(uow, aggregate, download, payload, created, now)
            .await
    }

    /// Same content as the latest version; record the locale if it is new
    fn stage_locale(
        &self,
        uow: &mut UnitOfWork,
        aggregate: &MediaAggregate,
        latest: &FileVersion,
        payload: &ImagePayload,
    ) -> ImageSyncResult {
        let media_id = aggregate.media.id.clone();

        if aggregate
            .meta_for_locale(&latest.id, &payload.locale)
            .is_some()
        {
            debug!(
                external_id = %payload.id,
                version = latest.version,
                size = latest.size,
                "Image unchanged"
            );
            return ImageSyncResult::Unchanged { media_id };
        }

        let is_default = aggregate.default_meta(&latest.id).is_none();
        uow.persist(PendingWrite::UpsertFileVersionMeta(FileVersionMeta::new(
            &latest.id,
            &payload.locale,
            &latest.name,
            is_default,
        )));
        debug!(
            external_id = %payload.id,
            version = latest.version,
            locale = %payload.locale,
            "Image unchanged, staged metadata for new locale"
        );

        ImageSyncResult::MetadataAdded {
            media_id,
            version: latest.version,
            locale: payload.locale.clone(),
        }
    }

    async fn stage_version(
        &self,
        uow: &mut UnitOfWork,
        aggregate: MediaAggregate,
        download: DownloadedImage,
        payload: &ImagePayload,
        created: bool,
        now: i64,
    ) -> Result<ImageSyncResult> {
        let media_type_id = self.image_media_type().await?;
        let collection_id = self.collection().await?;
        let version_number = aggregate.next_version_number();
        let file_name = payload.file_name().to_string();

        let MediaAggregate {
            mut media, file, ..
        } = aggregate;
        media.media_type_id = Some(media_type_id);
        media.collection_id = Some(collection_id);
        media.changed_at = now;

        let mut file = file.unwrap_or_else(|| File::new(&media.id, now));
        file.version = version_number;
        file.changed_at = now;

        let version = FileVersion::new(
            &file.id,
            version_number,
            &file_name,
            download.size,
            &download.mime_type,
            now,
        );
        let meta = FileVersionMeta::new(&version.id, &payload.locale, &file_name, true);

        uow.persist(PendingWrite::UpsertMedia(media.clone()));
        uow.persist(PendingWrite::UpsertFile(file));
        uow.persist(PendingWrite::InsertFileVersion(version.clone()));
        uow.stage_upload(PendingUpload {
            file_version_id: version.id.clone(),
            file_name,
            local: download.local,
        });
        uow.persist(PendingWrite::UpsertFileVersionMeta(meta));

        info!(
            external_id = %payload.id,
            media_id = %media.id,
            version = version.version,
            size = version.size,
            created,
            "Staged new image version"
        );

        Ok(ImageSyncResult::VersionAdded {
            media_id: media.id,
            version: version.version,
            size: version.size,
            created,
        })
    }

    async fn image_media_type(&self) -> Result<i64> {
        match self.repositories.media_types.find(IMAGE_MEDIA_TYPE_ID).await? {
            Some(media_type) => Ok(media_type.id),
            None => {
                let message = format!(
                    "Media type {} not found, reference data has not been seeded",
                    IMAGE_MEDIA_TYPE_ID
                );
                error!(media_type_id = IMAGE_MEDIA_TYPE_ID, "{}", message);
                Err(SyncError::Configuration(message))
            }
        }
    }

    async fn collection(&self) -> Result<String> {
        let key = &self.settings.collection_key;
        let collection_id = self
            .repositories
            .system_collections
            .get_system_collection(key)
            .await
            .map_err(|e| {
                error!(collection_key = %key, error = %e, "System collection unavailable");
                SyncError::from(e)
            })?;

        match self.repositories.collections.find(&collection_id).await? {
            Some(collection) => Ok(collection.id),
            None => {
                error!(collection_key = %key, collection_id = %collection_id, "System collection vanished");
                Err(SyncError::Configuration(format!(
                    "Collection {} for key '{}' does not exist",
                    collection_id, key
                )))
            }
        }
    }

    /// Stream the image into a temporary file, bounded by the fetch timeout
    async fn download(&self, payload: &ImagePayload) -> Result<DownloadedImage> {
        let url = self.settings.image_url(&payload.path);
        let timeout = self.settings.fetch_timeout;

        match tokio::time::timeout(timeout, self.fetch(&url, payload)).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::fetch_failed(
                &url,
                None,
                format!("timed out after {}s", timeout.as_secs_f64()),
            )),
        }
    }

    async fn fetch(&self, url: &str, payload: &ImagePayload) -> Result<DownloadedImage> {
        let request = HttpRequest::get(url).timeout(self.settings.fetch_timeout);
        let mut response = self
            .http_client
            .download(request)
            .await
            .map_err(|e| SyncError::fetch_failed(url, None, e.to_string()))?;

        if response.status != 200 {
            debug!(url = %url, status = response.status, "Image download rejected");
            return Err(SyncError::fetch_failed(
                url,
                Some(response.status),
                format!("unexpected status {}", response.status),
            ));
        }

        let declared_type = response.content_type().map(str::to_string);

        let (file, local) = tempfile::Builder::new()
            .prefix("catalog-sync-")
            .tempfile_in(&self.settings.temp_dir)?
            .into_parts();
        let mut file = tokio::fs::File::from_std(file);

        let written = tokio::io::copy(&mut response.body, &mut file)
            .await
            .map_err(|e| SyncError::fetch_failed(url, None, e.to_string()))?;
        file.flush().await?;
        drop(file);

        let mime_type = sniff_mime_type(&local, declared_type.as_deref()).await?;
        let size = i64::try_from(written).unwrap_or(i64::MAX);

        debug!(
            external_id = %payload.id,
            url = %url,
            size,
            mime_type = %mime_type,
            "Downloaded image"
        );

        Ok(DownloadedImage {
            local,
            size,
            mime_type,
        })
    }
}

/// Content sniffing first, then a declared image type, then the fallback
async fn sniff_mime_type(local: &TempPath, declared: Option<&str>) -> Result<String> {
    let mut head = Vec::with_capacity(64);
    tokio::fs::File::open(local)
        .await?
        .take(64)
        .read_to_end(&mut head)
        .await?;

    if let Ok(format) = image::guess_format(&head) {
        return Ok(format.to_mime_type().to_string());
    }

    let declared = declared
        .map(|value| value.split(';').next().unwrap_or(value).trim())
        .filter(|value| value.starts_with("image/"));

    Ok(declared.unwrap_or(FALLBACK_MIME_TYPE).to_string())
}

#[async_trait]
impl ImageAdapter for ImageMediaAdapter {
    #[instrument(skip(self, uow, payload), fields(external_id = %payload.id, locale = %payload.locale))]
    async fn synchronize(
        &self,
        uow: &mut UnitOfWork,
        payload: &ImagePayload,
    ) -> Result<ImageSyncResult> {
        let checkpoint = uow.checkpoint();

        match self.stage(uow, payload).await {
            Ok(result) => Ok(result),
            Err(e) => {
                uow.rollback_to(checkpoint);
                Err(e)
            }
        }
    }

    #[instrument(skip(self, uow))]
    async fn remove(&self, uow: &mut UnitOfWork, id: ExternalId) -> Result<bool> {
        let removed = self.repositories.bridges.remove_by_id(uow, id).await?;

        if removed {
            info!(external_id = %id, "Staged image removal");
        } else {
            debug!(external_id = %id, "Image was never synchronized, nothing to remove");
        }

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::BridgeError;
    use bridge_traits::http::DownloadResponse;
    use chrono::{DateTime, TimeZone, Utc};
    use core_library::db::{create_test_pool, ensure_system_collection};
    use mockall::mock;

    mock! {
        pub Http {}

        #[async_trait]
        impl HttpClient for Http {
            async fn download(&self, request: HttpRequest) -> bridge_traits::error::Result<DownloadResponse>;
        }
    }

    mock! {
        pub MediaTypes {}

        #[async_trait]
        impl MediaTypeRepository for MediaTypes {
            async fn find(&self, id: i64) -> core_library::Result<Option<core_library::models::MediaType>>;
        }
    }

    struct FixedClock;

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            Utc.timestamp_opt(1_700_000_000, 0).single().unwrap_or_default()
        }
    }

    const PNG_HEADER: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    fn settings(temp_dir: &std::path::Path) -> ImageAdapterSettings {
        ImageAdapterSettings {
            base_url: "https://shop.example.com".to_string(),
            collection_key: "shop_media".to_string(),
            temp_dir: temp_dir.to_path_buf(),
            fetch_timeout: Duration::from_secs(5),
        }
    }

    async fn adapter(http: MockHttp, temp_dir: &std::path::Path) -> (ImageMediaAdapter, SqlitePool) {
        let pool = create_test_pool().await.unwrap();
        ensure_system_collection(&pool, "shop_media", "Shop media")
            .await
            .unwrap();

        let adapter = ImageMediaAdapter::new(
            ImageRepositories::sqlite(&pool),
            Arc::new(http),
            Arc::new(FixedClock),
            settings(temp_dir),
        );
        (adapter, pool)
    }

    #[test]
    fn test_image_url_joins_segments() {
        let mut settings = settings(std::path::Path::new("/tmp"));
        settings.base_url = "https://shop.example.com/".to_string();

        assert_eq!(
            settings.image_url("/ab/cd/shoe.jpg"),
            "https://shop.example.com/media/image/ab/cd/shoe.jpg"
        );
    }

    #[tokio::test]
    async fn test_new_image_stages_first_version() {
        let temp = tempfile::tempdir().unwrap();
        let mut http = MockHttp::new();
        http.expect_download()
            .withf(|r| r.url == "https://shop.example.com/media/image/ab/shoe.png")
            .times(1)
            .returning(|_| {
                let mut body = PNG_HEADER.to_vec();
                body.resize(1000, 0);
                Ok(DownloadResponse::from_bytes(200, body))
            });

        let (adapter, _pool) = adapter(http, temp.path()).await;
        let mut uow = UnitOfWork::new();

        let result = adapter
            .synchronize(&mut uow, &ImagePayload::new(42, "ab/shoe.png", "en"))
            .await
            .unwrap();

        let ImageSyncResult::VersionAdded {
            version,
            size,
            created,
            ..
        } = result
        else {
            panic!("expected a new version, got {result:?}");
        };
        assert_eq!((version, size, created), (1, 1000, true));
        assert_eq!(uow.pending_uploads().len(), 1);

        let staged_version = uow.pending_writes().iter().find_map(|w| match w {
            PendingWrite::InsertFileVersion(v) => Some(v.clone()),
            _ => None,
        });
        let staged_version = staged_version.unwrap();
        assert_eq!(staged_version.mime_type, "image/png");
        assert_eq!(staged_version.name, "shoe.png");
    }

    #[tokio::test]
    async fn test_failed_fetch_stages_nothing() {
        let temp = tempfile::tempdir().unwrap();
        let mut http = MockHttp::new();
        http.expect_download()
            .returning(|_| Ok(DownloadResponse::from_bytes(404, Vec::<u8>::new())));

        let (adapter, _pool) = adapter(http, temp.path()).await;
        let mut uow = UnitOfWork::new();

        let err = adapter
            .synchronize(&mut uow, &ImagePayload::new(42, "missing.jpg", "en"))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SyncError::RemoteFetchFailed {
                status: Some(404),
                ..
            }
        ));
        assert!(uow.is_empty());
    }

    #[tokio::test]
    async fn test_transport_error_has_no_status() {
        let temp = tempfile::tempdir().unwrap();
        let mut http = MockHttp::new();
        http.expect_download()
            .returning(|_| Err(BridgeError::OperationFailed("connection refused".to_string())));

        let (adapter, _pool) = adapter(http, temp.path()).await;
        let mut uow = UnitOfWork::new();

        let err = adapter
            .synchronize(&mut uow, &ImagePayload::new(42, "a.jpg", "en"))
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::RemoteFetchFailed { status: None, .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_missing_collection_is_configuration_error() {
        let temp = tempfile::tempdir().unwrap();
        let mut http = MockHttp::new();
        http.expect_download()
            .returning(|_| Ok(DownloadResponse::from_bytes(200, vec![1u8; 10])));

        let pool = create_test_pool().await.unwrap();
        let adapter = ImageMediaAdapter::new(
            ImageRepositories::sqlite(&pool),
            Arc::new(http),
            Arc::new(FixedClock),
            settings(temp.path()),
        );
        let mut uow = UnitOfWork::new();

        let err = adapter
            .synchronize(&mut uow, &ImagePayload::new(1, "a.jpg", "en"))
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Configuration(_)));
        assert!(!err.is_retryable());
        assert!(uow.is_empty());
    }

    #[tokio::test]
    async fn test_missing_image_media_type_is_configuration_error() {
        let temp = tempfile::tempdir().unwrap();
        let mut http = MockHttp::new();
        http.expect_download()
            .returning(|_| Ok(DownloadResponse::from_bytes(200, vec![1u8; 10])));

        let mut media_types = MockMediaTypes::new();
        media_types
            .expect_find()
            .withf(|id| *id == IMAGE_MEDIA_TYPE_ID)
            .times(1)
            .returning(|_| Ok(None));

        let pool = create_test_pool().await.unwrap();
        ensure_system_collection(&pool, "shop_media", "Shop media")
            .await
            .unwrap();
        let mut repositories = ImageRepositories::sqlite(&pool);
        repositories.media_types = Arc::new(media_types);

        let adapter = ImageMediaAdapter::new(
            repositories,
            Arc::new(http),
            Arc::new(FixedClock),
            settings(temp.path()),
        );
        let mut uow = UnitOfWork::new();

        let err = adapter
            .synchronize(&mut uow, &ImagePayload::new(1, "a.jpg", "en"))
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Configuration(_)));
        assert!(uow.is_empty());
    }

    #[tokio::test]
    async fn test_sniff_falls_back_to_declared_then_jpeg() {
        let temp = tempfile::NamedTempFile::new().unwrap().into_temp_path();
        tokio::fs::write(&temp, b"not an image").await.unwrap();

        assert_eq!(
            sniff_mime_type(&temp, Some("image/webp; charset=binary")).await.unwrap(),
            "image/webp"
        );
        assert_eq!(
            sniff_mime_type(&temp, Some("text/html")).await.unwrap(),
            FALLBACK_MIME_TYPE
        );
        assert_eq!(sniff_mime_type(&temp, None).await.unwrap(), FALLBACK_MIME_TYPE);
    }

    #[tokio::test]
    async fn test_remove_unknown_id() {
        let temp = tempfile::tempdir().unwrap();
        let (adapter, _pool) = adapter(MockHttp::new(), temp.path()).await;
        let mut uow = UnitOfWork::new();

        assert!(!adapter.remove(&mut uow, ExternalId(404)).await.unwrap());
        assert!(uow.is_empty());
    }
}

//! Core service façade and bootstrap helpers.
//!
//! This crate wires the configured bridges (HTTP client, content storage)
//! into the content library and the synchronizers, and exposes the message
//! consumer to host applications. Desktop hosts enable the `desktop-shims`
//! feature, which makes `CoreConfig::builder().build()` fall back to the
//! `bridge-desktop` implementations.
//!
//! ```rust,ignore
//! use core_runtime::config::CoreConfig;
//! use core_service::CatalogSyncService;
//!
//! let config = CoreConfig::builder()
//!     .database_path("catalog.db")
//!     .shop_base_url("https://shop.example.com")
//!     .media_collection_key("sylius_media")
//!     .build()?;
//!
//! let service = CatalogSyncService::bootstrap(config).await?;
//! let outcome = service.handle_json(r#"{"type": "remove_image", "id": 42}"#).await?;
//! ```

pub mod error;

pub use error::{CoreError, Result};

use bridge_traits::time::{Clock, SystemClock};
use core_library::db::{create_pool, ensure_system_collection, seed_reference_data, DatabaseConfig};
use core_runtime::config::CoreConfig;
use core_runtime::events::{CoreEvent, EventBus};
use core_sync::{
    ConsumerStats, ImageAdapterSettings, ImageMediaAdapter, ImageRepositories, MessageConsumer,
    SyncError, SyncMessage, SyncOutcome, TaxonCategoryAdapter,
};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Title given to the system collection when it is first created
const MEDIA_COLLECTION_TITLE: &str = "Shop media";

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CatalogSyncService {
    config: Arc<CoreConfig>,
    pool: SqlitePool,
    consumer: Arc<MessageConsumer>,
    event_bus: Arc<EventBus>,
}

impl CatalogSyncService {
    /// Open the database and wire every component from `config`
    ///
    /// Applies migrations, seeds reference data and makes sure the configured
    /// system collection exists.
    pub async fn bootstrap(config: CoreConfig) -> Result<Self> {
        config.validate()?;

        tokio::fs::create_dir_all(&config.temp_dir)
            .await
            .map_err(|e| {
                CoreError::InitializationFailed(format!(
                    "Cannot create temp dir {}: {}",
                    config.temp_dir.display(),
                    e
                ))
            })?;

        let pool = create_pool(DatabaseConfig::new(&config.database_path)).await?;
        Self::from_pool(config, pool, Arc::new(SystemClock)).await
    }

    /// Wire every component on an existing pool
    pub async fn from_pool(
        config: CoreConfig,
        pool: SqlitePool,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        seed_reference_data(&pool).await?;
        ensure_system_collection(&pool, &config.media_collection_key, MEDIA_COLLECTION_TITLE)
            .await?;

        let event_bus = Arc::new(EventBus::new(config.event_buffer_size));

        let images = ImageMediaAdapter::new(
            ImageRepositories::sqlite(&pool),
            config.http_client.clone(),
            clock.clone(),
            ImageAdapterSettings::from_config(&config),
        );
        let taxons = TaxonCategoryAdapter::sqlite(&pool, clock);

        let consumer = MessageConsumer::new(
            pool.clone(),
            config.content_storage.clone(),
            Arc::new(images),
            Arc::new(taxons),
            event_bus.clone(),
            config.max_concurrent_messages,
        );

        info!(
            shop_base_url = %config.shop_base_url,
            media_collection_key = %config.media_collection_key,
            max_concurrent_messages = config.max_concurrent_messages,
            "Catalog sync service ready"
        );

        Ok(Self {
            config: Arc::new(config),
            pool,
            consumer: Arc::new(consumer),
            event_bus,
        })
    }

    pub async fn handle(&self, message: SyncMessage) -> Result<SyncOutcome> {
        Ok(self.consumer.handle(message).await?)
    }

    /// Decode a wire envelope and handle it
    pub async fn handle_json(&self, json: &str) -> Result<SyncOutcome> {
        let message: SyncMessage = serde_json::from_str(json)
            .map_err(|e| SyncError::InvalidPayload(format!("Malformed message: {}", e)))?;
        self.handle(message).await
    }

    pub async fn handle_batch(&self, messages: Vec<SyncMessage>) -> Result<Vec<SyncOutcome>> {
        Ok(self.consumer.handle_batch(messages).await?)
    }

    /// Consume `receiver` until `cancel` fires or the channel closes
    pub async fn run(
        &self,
        receiver: mpsc::Receiver<SyncMessage>,
        cancel: CancellationToken,
    ) -> ConsumerStats {
        self.consumer.clone().run(receiver, cancel).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoreEvent> {
        self.event_bus.subscribe()
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

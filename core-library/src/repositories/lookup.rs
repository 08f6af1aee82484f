//! Reference data lookups
//!
//! Media types and system collections are seeded at installation and only
//! read during synchronization. A missing row means the installation is
//! broken, which surfaces as [`LibraryError::Configuration`].

use crate::error::{LibraryError, Result};
use crate::models::{Collection, MediaType};
use async_trait::async_trait;
use sqlx::{query_as, SqlitePool};

/// Media type repository interface
#[async_trait]
pub trait MediaTypeRepository: Send + Sync {
    async fn find(&self, id: i64) -> Result<Option<MediaType>>;
}

/// Collection repository interface
#[async_trait]
pub trait CollectionRepository: Send + Sync {
    async fn find(&self, id: &str) -> Result<Option<Collection>>;

    async fn find_by_key(&self, key: &str) -> Result<Option<Collection>>;
}

/// Resolves system collections by their key
#[async_trait]
pub trait SystemCollectionManager: Send + Sync {
    /// Get the id of the system collection registered under `key`
    ///
    /// # Errors
    /// [`LibraryError::Configuration`] if no system collection has that key.
    async fn get_system_collection(&self, key: &str) -> Result<String>;
}

/// SQLite implementation of MediaTypeRepository
pub struct SqliteMediaTypeRepository {
    pool: SqlitePool,
}

impl SqliteMediaTypeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MediaTypeRepository for SqliteMediaTypeRepository {
    async fn find(&self, id: i64) -> Result<Option<MediaType>> {
        let media_type = query_as::<_, MediaType>("SELECT * FROM media_types WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(media_type)
    }
}

/// SQLite implementation of CollectionRepository
pub struct SqliteCollectionRepository {
    pool: SqlitePool,
}

impl SqliteCollectionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CollectionRepository for SqliteCollectionRepository {
    async fn find(&self, id: &str) -> Result<Option<Collection>> {
        let collection = query_as::<_, Collection>("SELECT * FROM collections WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(collection)
    }

    async fn find_by_key(&self, key: &str) -> Result<Option<Collection>> {
        let collection =
            query_as::<_, Collection>("SELECT * FROM collections WHERE collection_key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        Ok(collection)
    }
}

/// SQLite implementation of SystemCollectionManager
pub struct SqliteSystemCollectionManager {
    collections: SqliteCollectionRepository,
}

impl SqliteSystemCollectionManager {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            collections: SqliteCollectionRepository::new(pool),
        }
    }
}

#[async_trait]
impl SystemCollectionManager for SqliteSystemCollectionManager {
    async fn get_system_collection(&self, key: &str) -> Result<String> {
        match self.collections.find_by_key(key).await? {
            Some(collection) if collection.is_system => Ok(collection.id),
            Some(_) => Err(LibraryError::Configuration(format!(
                "Collection '{}' is not a system collection",
                key
            ))),
            None => Err(LibraryError::Configuration(format!(
                "System collection '{}' does not exist",
                key
            ))),
        }
    }
}

//! Bridge repositories
//!
//! A bridge maps an id assigned by the shop to the locally owned entity that
//! mirrors it. Bridges are created lazily on first synchronization and go
//! away together with the entity they point at.

use crate::error::Result;
use crate::models::{Category, ExternalId, ImageMediaBridge, Media, TaxonCategoryBridge};
use crate::unit_of_work::{PendingWrite, UnitOfWork};
use async_trait::async_trait;
use sqlx::{query_as, SqlitePool};
use tracing::debug;

/// Image bridge repository interface
#[async_trait]
pub trait ImageMediaBridgeRepository: Send + Sync {
    /// Find the bridge for an external image id
    ///
    /// Bridges staged in `uow` are visible; bridges whose media is staged for
    /// deletion are not.
    async fn find_by_id(&self, uow: &UnitOfWork, id: ExternalId)
        -> Result<Option<ImageMediaBridge>>;

    /// Construct a bridge wrapping `media`. Nothing is staged.
    fn create(&self, id: ExternalId, media: &Media) -> ImageMediaBridge;

    /// Register a bridge with the unit of work
    fn add(&self, uow: &mut UnitOfWork, bridge: ImageMediaBridge);

    /// Stage deletion of the media behind `id`
    ///
    /// # Returns
    /// - `Ok(true)` if a bridge existed and its media was staged for deletion
    /// - `Ok(false)` if the id is unknown
    async fn remove_by_id(&self, uow: &mut UnitOfWork, id: ExternalId) -> Result<bool>;
}

/// Taxon bridge repository interface
#[async_trait]
pub trait TaxonCategoryBridgeRepository: Send + Sync {
    async fn find_by_id(
        &self,
        uow: &UnitOfWork,
        id: ExternalId,
    ) -> Result<Option<TaxonCategoryBridge>>;

    fn create(&self, id: ExternalId, category: &Category) -> TaxonCategoryBridge;

    fn add(&self, uow: &mut UnitOfWork, bridge: TaxonCategoryBridge);

    /// Stage deletion of the category behind `id` and all its descendants
    ///
    /// Returns `Ok(false)` if the id is unknown.
    async fn remove_by_id(&self, uow: &mut UnitOfWork, id: ExternalId) -> Result<bool>;
}

/// SQLite implementation of ImageMediaBridgeRepository
pub struct SqliteImageMediaBridgeRepository {
    pool: SqlitePool,
}

impl SqliteImageMediaBridgeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ImageMediaBridgeRepository for SqliteImageMediaBridgeRepository {
    async fn find_by_id(
        &self,
        uow: &UnitOfWork,
        id: ExternalId,
    ) -> Result<Option<ImageMediaBridge>> {
        let stored = query_as::<_, ImageMediaBridge>(
            "SELECT id, media_id FROM image_media_bridges WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(uow.overlay_image_bridge(id, stored))
    }

    fn create(&self, id: ExternalId, media: &Media) -> ImageMediaBridge {
        ImageMediaBridge {
            id,
            media_id: media.id.clone(),
        }
    }

    fn add(&self, uow: &mut UnitOfWork, bridge: ImageMediaBridge) {
        uow.persist(PendingWrite::InsertImageBridge(bridge));
    }

    async fn remove_by_id(&self, uow: &mut UnitOfWork, id: ExternalId) -> Result<bool> {
        let Some(bridge) = self.find_by_id(uow, id).await? else {
            debug!(external_id = %id, "No image bridge to remove");
            return Ok(false);
        };

        uow.persist(PendingWrite::DeleteMedia {
            media_id: bridge.media_id,
        });
        Ok(true)
    }
}

/// SQLite implementation of TaxonCategoryBridgeRepository
pub struct SqliteTaxonCategoryBridgeRepository {
    pool: SqlitePool,
}

impl SqliteTaxonCategoryBridgeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Ids of `root` and every category below it, committed or staged
    async fn subtree(&self, uow: &UnitOfWork, root: &str) -> Result<Vec<String>> {
        let stored: Vec<(String,)> = query_as(
            r#"
            WITH RECURSIVE subtree(id) AS (
                SELECT ?
                UNION
                SELECT c.id FROM categories c JOIN subtree s ON c.parent_id = s.id
            )
            SELECT id FROM subtree
            "#,
        )
        .bind(root)
        .fetch_all(&self.pool)
        .await?;

        let mut ids: Vec<String> = stored.into_iter().map(|(id,)| id).collect();
        let mut cursor = 0;
        while cursor < ids.len() {
            for child in uow.staged_children(&ids[cursor]) {
                if !ids.contains(&child) {
                    ids.push(child);
                }
            }
            cursor += 1;
        }

        Ok(ids)
    }
}

#[async_trait]
impl TaxonCategoryBridgeRepository for SqliteTaxonCategoryBridgeRepository {
    async fn find_by_id(
        &self,
        uow: &UnitOfWork,
        id: ExternalId,
    ) -> Result<Option<TaxonCategoryBridge>> {
        let stored = query_as::<_, TaxonCategoryBridge>(
            "SELECT id, category_id FROM taxon_category_bridges WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(uow.overlay_taxon_bridge(id, stored))
    }

    fn create(&self, id: ExternalId, category: &Category) -> TaxonCategoryBridge {
        TaxonCategoryBridge {
            id,
            category_id: category.id.clone(),
        }
    }

    fn add(&self, uow: &mut UnitOfWork, bridge: TaxonCategoryBridge) {
        uow.persist(PendingWrite::InsertTaxonBridge(bridge));
    }

    async fn remove_by_id(&self, uow: &mut UnitOfWork, id: ExternalId) -> Result<bool> {
        let Some(bridge) = self.find_by_id(uow, id).await? else {
            debug!(external_id = %id, "No taxon bridge to remove");
            return Ok(false);
        };

        let subtree = self.subtree(uow, &bridge.category_id).await?;
        debug!(external_id = %id, categories = subtree.len(), "Staging category subtree removal");

        uow.persist(PendingWrite::DeleteCategory {
            category_id: bridge.category_id,
            subtree,
        });
        Ok(true)
    }
}

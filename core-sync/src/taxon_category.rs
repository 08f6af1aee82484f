//! # Taxon Category Adapter
//!
//! Mirrors shop taxons into categories. A taxon message carries a subtree;
//! it is walked parent before children so every category's parent is staged
//! before the category itself.

use crate::error::{Result, SyncError};
use crate::messages::SynchronizeTaxonMessage;
use crate::payload::TaxonPayload;
use async_trait::async_trait;
use bridge_traits::time::Clock;
use core_library::models::{Category, CategoryTranslation, ExternalId};
use core_library::repositories::{
    CategoryRepository, SqliteCategoryRepository, SqliteTaxonCategoryBridgeRepository,
    TaxonCategoryBridgeRepository,
};
use core_library::{PendingWrite, UnitOfWork};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// What a synchronize call staged
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaxonSyncResult {
    /// Categories created or updated
    pub categories: usize,
    /// Of those, newly created
    pub created: usize,
}

/// Taxon synchronization interface
#[async_trait]
pub trait TaxonAdapter: Send + Sync {
    async fn synchronize(
        &self,
        uow: &mut UnitOfWork,
        message: &SynchronizeTaxonMessage,
    ) -> Result<TaxonSyncResult>;

    /// Stage removal of the category mirroring `id` and its subtree
    ///
    /// Returns `false` if the id was never synchronized.
    async fn remove(&self, uow: &mut UnitOfWork, id: ExternalId) -> Result<bool>;
}

/// Taxon adapter backed by the content library
pub struct TaxonCategoryAdapter {
    bridges: Arc<dyn TaxonCategoryBridgeRepository>,
    categories: Arc<dyn CategoryRepository>,
    clock: Arc<dyn Clock>,
}

impl TaxonCategoryAdapter {
    pub fn new(
        bridges: Arc<dyn TaxonCategoryBridgeRepository>,
        categories: Arc<dyn CategoryRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            bridges,
            categories,
            clock,
        }
    }

    pub fn sqlite(pool: &SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self::new(
            Arc::new(SqliteTaxonCategoryBridgeRepository::new(pool.clone())),
            Arc::new(SqliteCategoryRepository::new(pool.clone())),
            clock,
        )
    }

    async fn stage(
        &self,
        uow: &mut UnitOfWork,
        message: &SynchronizeTaxonMessage,
    ) -> Result<TaxonSyncResult> {
        message.payload().validate()?;
        let now = self.clock.unix_timestamp();
        let mut result = TaxonSyncResult::default();

        // (taxon, category id of its parent); the root keeps its current parent
        let mut stack: Vec<(&TaxonPayload, Option<String>)> = vec![(message.payload(), None)];

        while let Some((taxon, parent_id)) = stack.pop() {
            let (category_id, created) = self.stage_taxon(uow, taxon, parent_id, now).await?;
            result.categories += 1;
            if created {
                result.created += 1;
            }

            if !message.ignore_children() {
                // Reversed so children are staged in payload order
                for child in taxon.children.iter().rev() {
                    stack.push((child, Some(category_id.clone())));
                }
            }
        }

        Ok(result)
    }

    /// Stage one taxon; returns its category id and whether it was created
    async fn stage_taxon(
        &self,
        uow: &mut UnitOfWork,
        taxon: &TaxonPayload,
        parent_id: Option<String>,
        now: i64,
    ) -> Result<(String, bool)> {
        let (bridge, created) = match self.bridges.find_by_id(uow, taxon.id).await? {
            Some(bridge) => (bridge, false),
            None => {
                let category = Category::new(now);
                uow.persist(PendingWrite::UpsertCategory(category.clone()));
                let bridge = self.bridges.create(taxon.id, &category);
                self.bridges.add(uow, bridge.clone());
                (bridge, true)
            }
        };

        let aggregate = self
            .categories
            .find_aggregate(uow, &bridge.category_id)
            .await?
            .ok_or_else(|| SyncError::NotFound {
                entity_type: "Category".to_string(),
                id: bridge.category_id.clone(),
            })?;

        let mut category = aggregate.category;
        category.category_key = Some(taxon.code.clone());
        if parent_id.is_some() {
            category.parent_id = parent_id;
        }
        if category.default_locale.is_none() {
            category.default_locale = taxon.translations.first().map(|t| t.locale.clone());
        }
        category.changed_at = now;
        uow.persist(PendingWrite::UpsertCategory(category.clone()));

        for translation in &taxon.translations {
            uow.persist(PendingWrite::UpsertCategoryTranslation(CategoryTranslation {
                category_id: category.id.clone(),
                locale: translation.locale.clone(),
                name: translation.name.clone(),
                description: translation.description.clone(),
            }));
        }

        debug!(
            external_id = %taxon.id,
            category_id = %category.id,
            code = %taxon.code,
            translations = taxon.translations.len(),
            created,
            "Staged category"
        );

        Ok((category.id, created))
    }
}

#[async_trait]
impl TaxonAdapter for TaxonCategoryAdapter {
    #[instrument(skip(self, uow, message), fields(external_id = %message.id()))]
    async fn synchronize(
        &self,
        uow: &mut UnitOfWork,
        message: &SynchronizeTaxonMessage,
    ) -> Result<TaxonSyncResult> {
        let checkpoint = uow.checkpoint();

        match self.stage(uow, message).await {
            Ok(result) => {
                info!(
                    categories = result.categories,
                    created = result.created,
                    ignore_children = message.ignore_children(),
                    "Staged taxon synchronization"
                );
                Ok(result)
            }
            Err(e) => {
                uow.rollback_to(checkpoint);
                Err(e)
            }
        }
    }

    #[instrument(skip(self, uow))]
    async fn remove(&self, uow: &mut UnitOfWork, id: ExternalId) -> Result<bool> {
        let removed = self.bridges.remove_by_id(uow, id).await?;

        if removed {
            info!(external_id = %id, "Staged category removal");
        } else {
            debug!(external_id = %id, "Taxon was never synchronized, nothing to remove");
        }

        Ok(removed)
    }
}

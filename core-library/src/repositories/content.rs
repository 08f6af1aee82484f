//! Dimension-scoped content
//!
//! A content record belongs to a resource (`resource_key`, `resource_id`)
//! within one dimension. Dimensions are shared and identified by their
//! attributes, so they are found or created on demand.

use crate::error::{LibraryError, Result};
use crate::models::{Content, Dimension, DimensionAttributes};
use async_trait::async_trait;
use bridge_traits::time::Clock;
use sqlx::{query, query_as, SqlitePool};
use std::sync::Arc;

/// Dimension repository interface
#[async_trait]
pub trait DimensionRepository: Send + Sync {
    /// Find the dimension with exactly these attributes, creating it if needed
    async fn find_or_create(&self, attributes: &DimensionAttributes) -> Result<Dimension>;
}

/// Content repository interface
#[async_trait]
pub trait ContentRepository: Send + Sync {
    /// Find the content of a resource in `dimension`, creating an empty one
    async fn find_or_create(
        &self,
        resource_key: &str,
        resource_id: &str,
        dimension: &Dimension,
    ) -> Result<Content>;

    async fn find_by_resource(
        &self,
        resource_key: &str,
        resource_id: &str,
        dimension: &Dimension,
    ) -> Result<Option<Content>>;

    /// Contents of a resource across several dimensions
    ///
    /// The result follows the order of `dimensions`; dimensions without
    /// content are skipped.
    async fn find_by_dimensions(
        &self,
        resource_key: &str,
        resource_id: &str,
        dimensions: &[Dimension],
    ) -> Result<Vec<Content>>;

    /// Persist the type and data of an existing content
    ///
    /// # Errors
    /// [`LibraryError::NotFound`] if the content was never created.
    async fn save(&self, content: &Content) -> Result<()>;
}

/// SQLite implementation of DimensionRepository
pub struct SqliteDimensionRepository {
    pool: SqlitePool,
}

impl SqliteDimensionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DimensionRepository for SqliteDimensionRepository {
    async fn find_or_create(&self, attributes: &DimensionAttributes) -> Result<Dimension> {
        let candidate = Dimension::new(attributes);

        query("INSERT INTO dimensions (id, locale, stage) VALUES (?, ?, ?) ON CONFLICT DO NOTHING")
            .bind(&candidate.id)
            .bind(&candidate.locale)
            .bind(candidate.stage)
            .execute(&self.pool)
            .await?;

        let dimension = query_as::<_, Dimension>(
            "SELECT * FROM dimensions WHERE COALESCE(locale, '') = COALESCE(?, '') AND stage = ?",
        )
        .bind(&attributes.locale)
        .bind(attributes.stage)
        .fetch_one(&self.pool)
        .await?;

        Ok(dimension)
    }
}

/// SQLite implementation of ContentRepository
pub struct SqliteContentRepository {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteContentRepository {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }
}

#[async_trait]
impl ContentRepository for SqliteContentRepository {
    async fn find_or_create(
        &self,
        resource_key: &str,
        resource_id: &str,
        dimension: &Dimension,
    ) -> Result<Content> {
        if resource_key.trim().is_empty() {
            return Err(LibraryError::invalid("resource_key", "cannot be empty"));
        }

        let candidate = Content::new(
            resource_key,
            resource_id,
            &dimension.id,
            self.clock.unix_timestamp(),
        );

        query(
            r#"
            INSERT INTO contents (
                id, resource_key, resource_id, dimension_id, content_type, data,
                created_at, changed_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(resource_key, resource_id, dimension_id) DO NOTHING
            "#,
        )
        .bind(&candidate.id)
        .bind(&candidate.resource_key)
        .bind(&candidate.resource_id)
        .bind(&candidate.dimension_id)
        .bind(&candidate.content_type)
        .bind(&candidate.data)
        .bind(candidate.created_at)
        .bind(candidate.changed_at)
        .execute(&self.pool)
        .await?;

        self.find_by_resource(resource_key, resource_id, dimension)
            .await?
            .ok_or_else(|| LibraryError::NotFound {
                entity_type: "Content".to_string(),
                id: format!("{}/{}", resource_key, resource_id),
            })
    }

    async fn find_by_resource(
        &self,
        resource_key: &str,
        resource_id: &str,
        dimension: &Dimension,
    ) -> Result<Option<Content>> {
        let content = query_as::<_, Content>(
            r#"
            SELECT * FROM contents
            WHERE resource_key = ? AND resource_id = ? AND dimension_id = ?
            "#,
        )
        .bind(resource_key)
        .bind(resource_id)
        .bind(&dimension.id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(content)
    }

    async fn find_by_dimensions(
        &self,
        resource_key: &str,
        resource_id: &str,
        dimensions: &[Dimension],
    ) -> Result<Vec<Content>> {
        let mut contents = Vec::with_capacity(dimensions.len());
        for dimension in dimensions {
            if let Some(content) = self
                .find_by_resource(resource_key, resource_id, dimension)
                .await?
            {
                contents.push(content);
            }
        }

        Ok(contents)
    }

    async fn save(&self, content: &Content) -> Result<()> {
        content
            .data_value()
            .map_err(|e| LibraryError::invalid("data", e.to_string()))?;

        let result = query(
            "UPDATE contents SET content_type = ?, data = ?, changed_at = ? WHERE id = ?",
        )
        .bind(&content.content_type)
        .bind(&content.data)
        .bind(self.clock.unix_timestamp())
        .bind(&content.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LibraryError::NotFound {
                entity_type: "Content".to_string(),
                id: content.id.clone(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::models::Stage;
    use bridge_traits::time::SystemClock;
    use chrono::{DateTime, Utc};
    use std::sync::atomic::{AtomicI64, Ordering};

    /// Advances one second per reading
    struct TickingClock(AtomicI64);

    impl Clock for TickingClock {
        fn now(&self) -> DateTime<Utc> {
            let secs = self.0.fetch_add(1, Ordering::SeqCst);
            DateTime::from_timestamp(secs, 0).unwrap_or_default()
        }
    }

    #[tokio::test]
    async fn test_dimension_find_or_create_is_stable() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteDimensionRepository::new(pool);

        let all_draft = DimensionAttributes::default();
        let en_live = DimensionAttributes::new(Some("en"), Stage::Live);

        let first = repo.find_or_create(&all_draft).await.unwrap();
        let again = repo.find_or_create(&all_draft).await.unwrap();
        let other = repo.find_or_create(&en_live).await.unwrap();

        assert_eq!(first, again);
        assert_ne!(first.id, other.id);
        assert_eq!(other.attributes(), en_live);
    }

    #[tokio::test]
    async fn test_content_lifecycle() {
        let pool = create_test_pool().await.unwrap();
        let dimensions = SqliteDimensionRepository::new(pool.clone());
        let repo = SqliteContentRepository::new(pool, Arc::new(SystemClock));

        let draft = dimensions
            .find_or_create(&DimensionAttributes::default())
            .await
            .unwrap();
        let live = dimensions
            .find_or_create(&DimensionAttributes::new(None, Stage::Live))
            .await
            .unwrap();

        assert!(repo.find_by_resource("products", "1", &draft).await.unwrap().is_none());

        let mut content = repo.find_or_create("products", "1", &draft).await.unwrap();
        assert_eq!(content.data, "{}");

        content.content_type = Some("default".to_string());
        content.set_data(&serde_json::json!({"title": "Shoe"}));
        repo.save(&content).await.unwrap();

        let reloaded = repo.find_or_create("products", "1", &draft).await.unwrap();
        assert_eq!(reloaded.id, content.id);
        assert_eq!(reloaded.data_value().unwrap()["title"], "Shoe");

        repo.find_or_create("products", "1", &live).await.unwrap();
        let ordered = repo
            .find_by_dimensions("products", "1", &[live.clone(), draft.clone()])
            .await
            .unwrap();
        assert_eq!(ordered.len(), 2);
        assert_eq!(ordered[0].dimension_id, live.id);
        assert_eq!(ordered[1].dimension_id, draft.id);
    }

    #[tokio::test]
    async fn test_save_rejects_unknown_and_invalid_content() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteContentRepository::new(pool, Arc::new(SystemClock));

        let mut content = Content::new("products", "1", "missing", 0);
        assert!(matches!(
            repo.save(&content).await,
            Err(LibraryError::NotFound { .. })
        ));

        content.data = "not json".to_string();
        assert!(matches!(
            repo.save(&content).await,
            Err(LibraryError::InvalidInput { .. })
        ));
    }

    #[tokio::test]
    async fn test_timestamps_come_from_clock() {
        let pool = create_test_pool().await.unwrap();
        let dimensions = SqliteDimensionRepository::new(pool.clone());
        let repo =
            SqliteContentRepository::new(pool, Arc::new(TickingClock(AtomicI64::new(1_000))));

        let draft = dimensions
            .find_or_create(&DimensionAttributes::default())
            .await
            .unwrap();
        let content = repo.find_or_create("products", "1", &draft).await.unwrap();
        assert_eq!((content.created_at, content.changed_at), (1_000, 1_000));

        repo.save(&content).await.unwrap();
        let saved = repo.find_by_resource("products", "1", &draft).await.unwrap().unwrap();
        assert_eq!((saved.created_at, saved.changed_at), (1_000, 1_001));
    }
}

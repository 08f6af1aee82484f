//! Category repository trait and implementation

use crate::error::Result;
use crate::models::{Category, CategoryAggregate, CategoryTranslation};
use crate::unit_of_work::UnitOfWork;
use async_trait::async_trait;
use sqlx::{query_as, SqlitePool};

/// Category repository interface
#[async_trait]
pub trait CategoryRepository: Send + Sync {
    /// Load a category with its translations, staged writes overlaid
    async fn find_aggregate(
        &self,
        uow: &UnitOfWork,
        category_id: &str,
    ) -> Result<Option<CategoryAggregate>>;

    /// Find a committed category by its key
    async fn find_by_key(&self, key: &str) -> Result<Option<Category>>;

    /// Committed direct children of a category
    async fn children(&self, parent_id: &str) -> Result<Vec<Category>>;

    async fn count(&self) -> Result<i64>;
}

/// SQLite implementation of CategoryRepository
pub struct SqliteCategoryRepository {
    pool: SqlitePool,
}

impl SqliteCategoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn load_aggregate(&self, category_id: &str) -> Result<Option<CategoryAggregate>> {
        let Some(category) = query_as::<_, Category>("SELECT * FROM categories WHERE id = ?")
            .bind(category_id)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        let translations = query_as::<_, CategoryTranslation>(
            "SELECT * FROM category_translations WHERE category_id = ? ORDER BY locale",
        )
        .bind(category_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(CategoryAggregate {
            category,
            translations,
        }))
    }
}

#[async_trait]
impl CategoryRepository for SqliteCategoryRepository {
    async fn find_aggregate(
        &self,
        uow: &UnitOfWork,
        category_id: &str,
    ) -> Result<Option<CategoryAggregate>> {
        let stored = self.load_aggregate(category_id).await?;
        Ok(uow.overlay_category(category_id, stored))
    }

    async fn find_by_key(&self, key: &str) -> Result<Option<Category>> {
        let category = query_as::<_, Category>("SELECT * FROM categories WHERE category_key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(category)
    }

    async fn children(&self, parent_id: &str) -> Result<Vec<Category>> {
        let children = query_as::<_, Category>(
            "SELECT * FROM categories WHERE parent_id = ? ORDER BY created_at, id",
        )
        .bind(parent_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(children)
    }

    async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = query_as("SELECT COUNT(*) FROM categories")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::unit_of_work::PendingWrite;

    fn translation(category_id: &str, locale: &str, name: &str) -> CategoryTranslation {
        CategoryTranslation {
            category_id: category_id.to_string(),
            locale: locale.to_string(),
            name: name.to_string(),
            description: None,
        }
    }

    #[tokio::test]
    async fn test_staged_translation_overrides_committed() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteCategoryRepository::new(pool.clone());

        let mut category = Category::new(0);
        category.category_key = Some("shoes".to_string());

        sqlx::query(
            "INSERT INTO categories (id, category_key, created_at, changed_at) VALUES (?, 'shoes', 0, 0)",
        )
        .bind(&category.id)
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO category_translations (category_id, locale, name) VALUES (?, 'en', 'Shoes')",
        )
        .bind(&category.id)
        .execute(&pool)
        .await
        .unwrap();

        let mut uow = UnitOfWork::new();
        uow.persist(PendingWrite::UpsertCategoryTranslation(translation(
            &category.id,
            "en",
            "Footwear",
        )));

        let aggregate = repo.find_aggregate(&uow, &category.id).await.unwrap().unwrap();
        assert_eq!(aggregate.translations.len(), 1);
        assert_eq!(aggregate.translation("en").unwrap().name, "Footwear");

        let by_key = repo.find_by_key("shoes").await.unwrap().unwrap();
        assert_eq!(by_key.id, category.id);
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_children() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteCategoryRepository::new(pool.clone());

        for (id, parent) in [("root", None), ("a", Some("root")), ("b", Some("root"))] {
            sqlx::query(
                "INSERT INTO categories (id, parent_id, created_at, changed_at) VALUES (?, ?, 0, 0)",
            )
            .bind(id)
            .bind(parent)
            .execute(&pool)
            .await
            .unwrap();
        }

        let children: Vec<String> = repo
            .children("root")
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(children, vec!["a".to_string(), "b".to_string()]);
    }
}

//! Media repository trait and implementation

use crate::error::Result;
use crate::models::{File, FileVersion, FileVersionMeta, Media, MediaAggregate};
use crate::unit_of_work::UnitOfWork;
use async_trait::async_trait;
use sqlx::{query_as, SqlitePool};

/// Media repository interface
#[async_trait]
pub trait MediaRepository: Send + Sync {
    /// Load a media with its file, versions and metadata
    ///
    /// Writes staged in `uow` are applied on top of the committed state.
    async fn find_aggregate(
        &self,
        uow: &UnitOfWork,
        media_id: &str,
    ) -> Result<Option<MediaAggregate>>;

    /// Find a committed media by its ID
    async fn find_by_id(&self, media_id: &str) -> Result<Option<Media>>;

    /// Committed versions of a media, oldest first
    async fn versions(&self, media_id: &str) -> Result<Vec<FileVersion>>;

    /// Count committed media
    async fn count(&self) -> Result<i64>;
}

/// SQLite implementation of MediaRepository
pub struct SqliteMediaRepository {
    pool: SqlitePool,
}

impl SqliteMediaRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn load_aggregate(&self, media_id: &str) -> Result<Option<MediaAggregate>> {
        let Some(media) = self.find_by_id(media_id).await? else {
            return Ok(None);
        };

        let file = query_as::<_, File>("SELECT * FROM files WHERE media_id = ?")
            .bind(media_id)
            .fetch_optional(&self.pool)
            .await?;

        let versions = self.versions(media_id).await?;

        let metas = query_as::<_, FileVersionMeta>(
            r#"
            SELECT m.*
            FROM file_version_meta m
            JOIN file_versions fv ON fv.id = m.file_version_id
            JOIN files f ON f.id = fv.file_id
            WHERE f.media_id = ?
            ORDER BY fv.version, m.is_default DESC, m.locale
            "#,
        )
        .bind(media_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(MediaAggregate {
            media,
            file,
            versions,
            metas,
        }))
    }
}

#[async_trait]
impl MediaRepository for SqliteMediaRepository {
    async fn find_aggregate(
        &self,
        uow: &UnitOfWork,
        media_id: &str,
    ) -> Result<Option<MediaAggregate>> {
        let stored = self.load_aggregate(media_id).await?;
        Ok(uow.overlay_media(media_id, stored))
    }

    async fn find_by_id(&self, media_id: &str) -> Result<Option<Media>> {
        let media = query_as::<_, Media>("SELECT * FROM media WHERE id = ?")
            .bind(media_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(media)
    }

    async fn versions(&self, media_id: &str) -> Result<Vec<FileVersion>> {
        let versions = query_as::<_, FileVersion>(
            r#"
            SELECT fv.*
            FROM file_versions fv
            JOIN files f ON f.id = fv.file_id
            WHERE f.media_id = ?
            ORDER BY fv.version
            "#,
        )
        .bind(media_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(versions)
    }

    async fn count(&self) -> Result<i64> {
        let count: i64 = query_as("SELECT COUNT(*) FROM media")
            .fetch_one(&self.pool)
            .await
            .map(|row: (i64,)| row.0)?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use crate::unit_of_work::PendingWrite;

    #[tokio::test]
    async fn test_find_aggregate_merges_staged_versions() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteMediaRepository::new(pool.clone());

        let media = Media::new(0);
        let mut file = File::new(&media.id, 0);
        let version = FileVersion::new(&file.id, 1, "a.jpg", 1000, "image/jpeg", 0);
        file.version = 1;

        // Media and file committed, version only staged
        sqlx::query("INSERT INTO media (id, created_at, changed_at) VALUES (?, 0, 0)")
            .bind(&media.id)
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO files (id, media_id, version, created_at, changed_at) VALUES (?, ?, 0, 0, 0)",
        )
        .bind(&file.id)
        .bind(&media.id)
        .execute(&pool)
        .await
        .unwrap();

        let mut uow = UnitOfWork::new();
        uow.persist(PendingWrite::UpsertFile(file));
        uow.persist(PendingWrite::InsertFileVersion(version.clone()));

        let aggregate = repo.find_aggregate(&uow, &media.id).await.unwrap().unwrap();
        assert_eq!(aggregate.latest_version(), Some(&version));
        assert_eq!(aggregate.file.unwrap().version, 1);

        // Committed state is untouched
        assert!(repo.versions(&media.id).await.unwrap().is_empty());
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_find_aggregate_unknown_media() {
        let pool = create_test_pool().await.unwrap();
        let repo = SqliteMediaRepository::new(pool);

        let uow = UnitOfWork::new();
        assert!(repo.find_aggregate(&uow, "missing").await.unwrap().is_none());
    }
}

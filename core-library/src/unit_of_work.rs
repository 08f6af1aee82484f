//! # Unit of Work
//!
//! Collects pending entity writes and content uploads for one message (or one
//! batch of messages) and applies them atomically on [`UnitOfWork::commit`].
//!
//! ## Commit protocol
//!
//! 1. Pending uploads are saved to the [`ContentStorage`]; the returned
//!    storage options are attached to their staged file versions.
//! 2. All writes run in one SQLite transaction, in staging order, with
//!    foreign key checks deferred to the end of the transaction.
//! 3. If the transaction fails, content saved in step 1 is removed again.
//! 4. Content owned by deleted media is removed after the transaction commits.
//!
//! Download temp files are owned by the unit of work and deleted when it is
//! dropped, committed or rolled back.
//!
//! ## Identity map
//!
//! Repositories read through the unit of work: staged entities are visible to
//! later lookups in the same unit of work, and entities staged for deletion
//! are not. This keeps two messages for the same id inside one batch
//! consistent with each other.

use crate::error::{LibraryError, Result};
use crate::models::{
    Category, CategoryAggregate, CategoryTranslation, ExternalId, File, FileVersion,
    FileVersionMeta, ImageMediaBridge, Media, MediaAggregate, TaxonCategoryBridge,
};
use bridge_traits::storage::{ContentStorage, StorageOptions};
use sqlx::{query, query_as, SqliteConnection, SqlitePool};
use std::collections::HashMap;
use std::fmt;
use tempfile::TempPath;
use tracing::{debug, info, warn};

/// A staged entity mutation
#[derive(Debug, Clone, PartialEq)]
pub enum PendingWrite {
    UpsertMedia(Media),
    /// Deletes the media; bridge, file, versions and metadata cascade
    DeleteMedia { media_id: String },
    InsertImageBridge(ImageMediaBridge),
    UpsertFile(File),
    InsertFileVersion(FileVersion),
    UpsertFileVersionMeta(FileVersionMeta),
    UpsertCategory(Category),
    UpsertCategoryTranslation(CategoryTranslation),
    InsertTaxonBridge(TaxonCategoryBridge),
    /// Deletes the category; `subtree` lists it and all known descendants,
    /// which go with it by cascade
    DeleteCategory {
        category_id: String,
        subtree: Vec<String>,
    },
}

/// A local file waiting to be saved to content storage at commit time
pub struct PendingUpload {
    /// Staged file version that receives the storage options
    pub file_version_id: String,
    pub file_name: String,
    /// Deleted from disk when dropped
    pub local: TempPath,
}

impl fmt::Debug for PendingUpload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingUpload")
            .field("file_version_id", &self.file_version_id)
            .field("file_name", &self.file_name)
            .field("local", &self.local.to_path_buf())
            .finish()
    }
}

/// Position in a unit of work that can be rolled back to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    writes: usize,
    uploads: usize,
}

/// What a commit did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitSummary {
    pub writes: usize,
    pub uploads: usize,
    /// Stored binaries removed because their media was deleted
    pub removed_contents: usize,
}

/// Staged set of entity mutations committed atomically
#[derive(Debug, Default)]
pub struct UnitOfWork {
    writes: Vec<PendingWrite>,
    uploads: Vec<PendingUpload>,
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage an entity write
    pub fn persist(&mut self, write: PendingWrite) {
        self.writes.push(write);
    }

    /// Stage a content upload for a staged file version
    pub fn stage_upload(&mut self, upload: PendingUpload) {
        self.uploads.push(upload);
    }

    pub fn pending_writes(&self) -> &[PendingWrite] {
        &self.writes
    }

    pub fn pending_uploads(&self) -> &[PendingUpload] {
        &self.uploads
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty() && self.uploads.is_empty()
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            writes: self.writes.len(),
            uploads: self.uploads.len(),
        }
    }

    /// Discard everything staged after `checkpoint`
    pub fn rollback_to(&mut self, checkpoint: Checkpoint) {
        let discarded = self.writes.len().saturating_sub(checkpoint.writes);
        self.writes.truncate(checkpoint.writes);
        self.uploads.truncate(checkpoint.uploads);

        if discarded > 0 {
            debug!(discarded, "Rolled back staged writes");
        }
    }

    /// Discard everything staged
    pub fn rollback(mut self) {
        self.rollback_to(Checkpoint {
            writes: 0,
            uploads: 0,
        });
    }

    // -------------------------------------------------------------------------
    // Identity map
    // -------------------------------------------------------------------------

    /// Apply staged writes to a bridge loaded from the database
    pub fn overlay_image_bridge(
        &self,
        id: ExternalId,
        base: Option<ImageMediaBridge>,
    ) -> Option<ImageMediaBridge> {
        self.writes.iter().fold(base, |current, write| match write {
            PendingWrite::InsertImageBridge(bridge) if bridge.id == id => Some(bridge.clone()),
            PendingWrite::DeleteMedia { media_id }
                if current.as_ref().is_some_and(|b| &b.media_id == media_id) =>
            {
                None
            }
            _ => current,
        })
    }

    /// Apply staged writes to a media aggregate loaded from the database
    pub fn overlay_media(
        &self,
        media_id: &str,
        base: Option<MediaAggregate>,
    ) -> Option<MediaAggregate> {
        let mut current = base;

        for write in &self.writes {
            match write {
                PendingWrite::UpsertMedia(media) if media.id == media_id => match current.as_mut() {
                    Some(aggregate) => aggregate.media = media.clone(),
                    None => current = Some(MediaAggregate::new(media.clone())),
                },
                PendingWrite::DeleteMedia { media_id: deleted } if deleted == media_id => {
                    current = None;
                }
                PendingWrite::UpsertFile(file) if file.media_id == media_id => {
                    if let Some(aggregate) = current.as_mut() {
                        aggregate.file = Some(file.clone());
                    }
                }
                PendingWrite::InsertFileVersion(version) => {
                    if let Some(aggregate) = current.as_mut() {
                        if aggregate.file.as_ref().is_some_and(|f| f.id == version.file_id) {
                            aggregate.push_version(version.clone());
                        }
                    }
                }
                PendingWrite::UpsertFileVersionMeta(meta) => {
                    if let Some(aggregate) = current.as_mut() {
                        if aggregate
                            .versions
                            .iter()
                            .any(|v| v.id == meta.file_version_id)
                        {
                            aggregate.push_meta(meta.clone());
                        }
                    }
                }
                _ => {}
            }
        }

        current
    }

    /// Apply staged writes to a taxon bridge loaded from the database
    pub fn overlay_taxon_bridge(
        &self,
        id: ExternalId,
        base: Option<TaxonCategoryBridge>,
    ) -> Option<TaxonCategoryBridge> {
        self.writes.iter().fold(base, |current, write| match write {
            PendingWrite::InsertTaxonBridge(bridge) if bridge.id == id => Some(bridge.clone()),
            PendingWrite::DeleteCategory { subtree, .. }
                if current
                    .as_ref()
                    .is_some_and(|b| subtree.contains(&b.category_id)) =>
            {
                None
            }
            _ => current,
        })
    }

    /// Apply staged writes to a category loaded from the database
    pub fn overlay_category(
        &self,
        category_id: &str,
        base: Option<CategoryAggregate>,
    ) -> Option<CategoryAggregate> {
        let mut current = base;

        for write in &self.writes {
            match write {
                PendingWrite::UpsertCategory(category) if category.id == category_id => {
                    match current.as_mut() {
                        Some(aggregate) => aggregate.category = category.clone(),
                        None => current = Some(CategoryAggregate::new(category.clone())),
                    }
                }
                PendingWrite::UpsertCategoryTranslation(translation)
                    if translation.category_id == category_id =>
                {
                    if let Some(aggregate) = current.as_mut() {
                        aggregate.put_translation(translation.clone());
                    }
                }
                PendingWrite::DeleteCategory { subtree, .. }
                    if subtree.iter().any(|id| id == category_id) =>
                {
                    current = None;
                }
                _ => {}
            }
        }

        current
    }

    /// Ids of staged categories whose parent is `parent_id`
    pub fn staged_children(&self, parent_id: &str) -> Vec<String> {
        let mut children: Vec<String> = Vec::new();
        for write in &self.writes {
            if let PendingWrite::UpsertCategory(category) = write {
                if category.parent_id.as_deref() == Some(parent_id)
                    && !children.contains(&category.id)
                {
                    children.push(category.id.clone());
                }
            }
        }
        children
    }

    // -------------------------------------------------------------------------
    // Commit
    // -------------------------------------------------------------------------

    /// Save pending uploads, then apply all writes in one transaction
    pub async fn commit(
        self,
        pool: &SqlitePool,
        storage: &dyn ContentStorage,
    ) -> Result<CommitSummary> {
        if self.is_empty() {
            return Ok(CommitSummary::default());
        }

        let UnitOfWork {
            mut writes,
            uploads,
        } = self;

        let mut saved: Vec<StorageOptions> = Vec::with_capacity(uploads.len());
        let mut options_by_version: HashMap<&str, StorageOptions> = HashMap::new();

        for upload in &uploads {
            match storage.save(&upload.local, &upload.file_name).await {
                Ok(options) => {
                    options_by_version.insert(upload.file_version_id.as_str(), options.clone());
                    saved.push(options);
                }
                Err(e) => {
                    warn!(error = %e, file_name = %upload.file_name, "Content upload failed");
                    remove_contents(storage, &saved).await;
                    return Err(e.into());
                }
            }
        }

        for write in writes.iter_mut() {
            if let PendingWrite::InsertFileVersion(version) = write {
                if let Some(options) = options_by_version.remove(version.id.as_str()) {
                    version.storage_options = Some(options.into_inner());
                }
            }
        }

        let orphaned = match apply_writes(pool, &writes).await {
            Ok(orphaned) => orphaned,
            Err(e) => {
                if !saved.is_empty() {
                    warn!(
                        error = %e,
                        uploads = saved.len(),
                        "Transaction failed, removing uploaded content"
                    );
                }
                remove_contents(storage, &saved).await;
                return Err(e);
            }
        };

        let removed_contents = remove_contents(storage, &orphaned).await;

        let summary = CommitSummary {
            writes: writes.len(),
            uploads: saved.len(),
            removed_contents,
        };
        info!(
            writes = summary.writes,
            uploads = summary.uploads,
            removed_contents = summary.removed_contents,
            "Unit of work committed"
        );

        Ok(summary)
    }
}

/// Best-effort removal; returns how many succeeded
async fn remove_contents(storage: &dyn ContentStorage, contents: &[StorageOptions]) -> usize {
    let mut removed = 0;
    for options in contents {
        match storage.remove(options).await {
            Ok(()) => removed += 1,
            Err(e) => warn!(error = %e, storage_options = %options, "Failed to remove content"),
        }
    }
    removed
}

/// Run all writes in one transaction; returns storage options orphaned by
/// deleted media
async fn apply_writes(pool: &SqlitePool, writes: &[PendingWrite]) -> Result<Vec<StorageOptions>> {
    let mut tx = pool.begin().await?;

    query("PRAGMA defer_foreign_keys = ON")
        .execute(&mut *tx)
        .await?;

    let mut orphaned = Vec::new();
    for write in writes {
        apply_write(&mut tx, write, &mut orphaned).await?;
    }

    tx.commit().await?;
    Ok(orphaned)
}

fn map_unique_violation(err: sqlx::Error, entity_type: &str, id: impl fmt::Display) -> LibraryError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => LibraryError::Conflict {
            entity_type: entity_type.to_string(),
            id: id.to_string(),
        },
        _ => LibraryError::Database(err),
    }
}

async fn apply_write(
    conn: &mut SqliteConnection,
    write: &PendingWrite,
    orphaned: &mut Vec<StorageOptions>,
) -> Result<()> {
    match write {
        PendingWrite::UpsertMedia(media) => {
            query(
                r#"
                INSERT INTO media (id, media_type_id, collection_id, created_at, changed_at)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    media_type_id = excluded.media_type_id,
                    collection_id = excluded.collection_id,
                    changed_at = excluded.changed_at
                "#,
            )
            .bind(&media.id)
            .bind(media.media_type_id)
            .bind(&media.collection_id)
            .bind(media.created_at)
            .bind(media.changed_at)
            .execute(&mut *conn)
            .await?;
        }
        PendingWrite::DeleteMedia { media_id } => {
            let contents: Vec<(String,)> = query_as(
                r#"
                SELECT fv.storage_options
                FROM file_versions fv
                JOIN files f ON f.id = fv.file_id
                WHERE f.media_id = ? AND fv.storage_options IS NOT NULL
                "#,
            )
            .bind(media_id)
            .fetch_all(&mut *conn)
            .await?;

            query("DELETE FROM media WHERE id = ?")
                .bind(media_id)
                .execute(&mut *conn)
                .await?;

            orphaned.extend(contents.into_iter().map(|(raw,)| StorageOptions::new(raw)));
        }
        PendingWrite::InsertImageBridge(bridge) => {
            query("INSERT INTO image_media_bridges (id, media_id) VALUES (?, ?)")
                .bind(bridge.id)
                .bind(&bridge.media_id)
                .execute(&mut *conn)
                .await
                .map_err(|e| map_unique_violation(e, "ImageMediaBridge", bridge.id))?;
        }
        PendingWrite::UpsertFile(file) => {
            query(
                r#"
                INSERT INTO files (id, media_id, version, created_at, changed_at)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    version = excluded.version,
                    changed_at = excluded.changed_at
                "#,
            )
            .bind(&file.id)
            .bind(&file.media_id)
            .bind(file.version)
            .bind(file.created_at)
            .bind(file.changed_at)
            .execute(&mut *conn)
            .await?;
        }
        PendingWrite::InsertFileVersion(version) => {
            version
                .validate()
                .map_err(|e| LibraryError::invalid("FileVersion", e))?;

            query(
                r#"
                INSERT INTO file_versions (
                    id, file_id, version, name, size, mime_type, storage_options, created_at
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&version.id)
            .bind(&version.file_id)
            .bind(version.version)
            .bind(&version.name)
            .bind(version.size)
            .bind(&version.mime_type)
            .bind(&version.storage_options)
            .bind(version.created_at)
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                map_unique_violation(
                    e,
                    "FileVersion",
                    format!("{}#{}", version.file_id, version.version),
                )
            })?;
        }
        PendingWrite::UpsertFileVersionMeta(meta) => {
            query(
                r#"
                INSERT INTO file_version_meta (
                    id, file_version_id, locale, title, description, is_default
                )
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(file_version_id, locale) DO UPDATE SET
                    title = excluded.title,
                    description = excluded.description,
                    is_default = excluded.is_default
                "#,
            )
            .bind(&meta.id)
            .bind(&meta.file_version_id)
            .bind(&meta.locale)
            .bind(&meta.title)
            .bind(&meta.description)
            .bind(meta.is_default)
            .execute(&mut *conn)
            .await?;
        }
        PendingWrite::UpsertCategory(category) => {
            query(
                r#"
                INSERT INTO categories (
                    id, category_key, parent_id, default_locale, created_at, changed_at
                )
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    category_key = excluded.category_key,
                    parent_id = excluded.parent_id,
                    default_locale = excluded.default_locale,
                    changed_at = excluded.changed_at
                "#,
            )
            .bind(&category.id)
            .bind(&category.category_key)
            .bind(&category.parent_id)
            .bind(&category.default_locale)
            .bind(category.created_at)
            .bind(category.changed_at)
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                map_unique_violation(
                    e,
                    "Category",
                    category.category_key.as_deref().unwrap_or(&category.id),
                )
            })?;
        }
        PendingWrite::UpsertCategoryTranslation(translation) => {
            translation
                .validate()
                .map_err(|e| LibraryError::invalid("CategoryTranslation", e))?;

            query(
                r#"
                INSERT INTO category_translations (category_id, locale, name, description)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(category_id, locale) DO UPDATE SET
                    name = excluded.name,
                    description = excluded.description
                "#,
            )
            .bind(&translation.category_id)
            .bind(&translation.locale)
            .bind(&translation.name)
            .bind(&translation.description)
            .execute(&mut *conn)
            .await?;
        }
        PendingWrite::InsertTaxonBridge(bridge) => {
            query("INSERT INTO taxon_category_bridges (id, category_id) VALUES (?, ?)")
                .bind(bridge.id)
                .bind(&bridge.category_id)
                .execute(&mut *conn)
                .await
                .map_err(|e| map_unique_violation(e, "TaxonCategoryBridge", bridge.id))?;
        }
        PendingWrite::DeleteCategory { category_id, .. } => {
            query("DELETE FROM categories WHERE id = ?")
                .bind(category_id)
                .execute(&mut *conn)
                .await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use async_trait::async_trait;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use bytes::Bytes;
    use mockall::mock;
    use mockall::predicate::*;
    use std::io::Write;
    use std::path::Path;

    mock! {
        pub Storage {}

        #[async_trait]
        impl ContentStorage for Storage {
            async fn save(&self, local_path: &Path, file_name: &str) -> BridgeResult<StorageOptions>;
            async fn load(&self, options: &StorageOptions) -> BridgeResult<Bytes>;
            async fn remove(&self, options: &StorageOptions) -> BridgeResult<()>;
        }
    }

    fn temp_upload(file_version_id: &str) -> PendingUpload {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"bytes").unwrap();
        PendingUpload {
            file_version_id: file_version_id.to_string(),
            file_name: "photo.jpg".to_string(),
            local: file.into_temp_path(),
        }
    }

    /// Media + file + first version, staged in dependency order
    fn stage_media(uow: &mut UnitOfWork) -> (Media, FileVersion) {
        let media = Media::new(1);
        let mut file = File::new(&media.id, 1);
        let version = FileVersion::new(&file.id, 1, "photo.jpg", 5, "image/jpeg", 1);
        file.version = 1;

        uow.persist(PendingWrite::UpsertMedia(media.clone()));
        uow.persist(PendingWrite::InsertImageBridge(ImageMediaBridge {
            id: ExternalId(42),
            media_id: media.id.clone(),
        }));
        uow.persist(PendingWrite::UpsertFile(file));
        uow.persist(PendingWrite::InsertFileVersion(version.clone()));
        uow.stage_upload(temp_upload(&version.id));
        (media, version)
    }

    async fn count(pool: &SqlitePool, table: &str) -> i64 {
        let row: (i64,) = query_as(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(pool)
            .await
            .unwrap();
        row.0
    }

    #[tokio::test]
    async fn test_commit_uploads_then_writes() {
        let pool = create_test_pool().await.unwrap();
        let mut storage = MockStorage::new();
        storage
            .expect_save()
            .with(always(), eq("photo.jpg"))
            .times(1)
            .returning(|_, _| Ok(StorageOptions::new(r#"{"segment":"01"}"#)));

        let mut uow = UnitOfWork::new();
        let (_, version) = stage_media(&mut uow);

        let summary = uow.commit(&pool, &storage).await.unwrap();
        assert_eq!(summary.writes, 4);
        assert_eq!(summary.uploads, 1);

        let stored: (Option<String>,) =
            query_as("SELECT storage_options FROM file_versions WHERE id = ?")
                .bind(&version.id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(stored.0.as_deref(), Some(r#"{"segment":"01"}"#));
    }

    #[tokio::test]
    async fn test_failed_upload_writes_nothing() {
        let pool = create_test_pool().await.unwrap();
        let mut storage = MockStorage::new();
        storage
            .expect_save()
            .returning(|_, _| Err(BridgeError::OperationFailed("disk full".to_string())));
        storage.expect_remove().never();

        let mut uow = UnitOfWork::new();
        stage_media(&mut uow);

        assert!(matches!(
            uow.commit(&pool, &storage).await,
            Err(LibraryError::Bridge(_))
        ));
        assert_eq!(count(&pool, "media").await, 0);
    }

    #[tokio::test]
    async fn test_failed_transaction_removes_uploaded_content() {
        let pool = create_test_pool().await.unwrap();
        let mut storage = MockStorage::new();
        storage
            .expect_save()
            .returning(|_, _| Ok(StorageOptions::new("stored")));
        storage
            .expect_remove()
            .with(eq(StorageOptions::new("stored")))
            .times(1)
            .returning(|_| Ok(()));

        let mut uow = UnitOfWork::new();
        let (media, _) = stage_media(&mut uow);
        // Same bridge id twice violates the primary key
        uow.persist(PendingWrite::InsertImageBridge(ImageMediaBridge {
            id: ExternalId(42),
            media_id: media.id.clone(),
        }));

        let err = uow.commit(&pool, &storage).await.unwrap_err();
        assert!(matches!(err, LibraryError::Conflict { .. }), "got {err:?}");
        assert_eq!(count(&pool, "media").await, 0);
        assert_eq!(count(&pool, "file_versions").await, 0);
    }

    #[tokio::test]
    async fn test_delete_media_cascades_and_removes_content() {
        let pool = create_test_pool().await.unwrap();
        let mut storage = MockStorage::new();
        storage
            .expect_save()
            .returning(|_, _| Ok(StorageOptions::new("stored")));
        storage
            .expect_remove()
            .with(eq(StorageOptions::new("stored")))
            .times(1)
            .returning(|_| Ok(()));

        let mut uow = UnitOfWork::new();
        let (media, _) = stage_media(&mut uow);
        uow.commit(&pool, &storage).await.unwrap();

        let mut uow = UnitOfWork::new();
        uow.persist(PendingWrite::DeleteMedia {
            media_id: media.id.clone(),
        });
        let summary = uow.commit(&pool, &storage).await.unwrap();

        assert_eq!(summary.removed_contents, 1);
        for table in ["media", "image_media_bridges", "files", "file_versions"] {
            assert_eq!(count(&pool, table).await, 0, "{table} should be empty");
        }
    }

    #[tokio::test]
    async fn test_rollback_to_checkpoint_drops_temp_files() {
        let mut uow = UnitOfWork::new();
        uow.persist(PendingWrite::UpsertMedia(Media::new(0)));
        let checkpoint = uow.checkpoint();

        let upload = temp_upload("v1");
        let path = upload.local.to_path_buf();
        uow.stage_upload(upload);
        uow.persist(PendingWrite::UpsertMedia(Media::new(0)));
        assert!(path.exists());

        uow.rollback_to(checkpoint);

        assert_eq!(uow.pending_writes().len(), 1);
        assert!(uow.pending_uploads().is_empty());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_empty_commit_is_noop() {
        let pool = create_test_pool().await.unwrap();
        let storage = MockStorage::new();

        let summary = UnitOfWork::new().commit(&pool, &storage).await.unwrap();
        assert_eq!(summary, CommitSummary::default());
    }

    #[test]
    fn test_overlay_hides_deleted_bridge() {
        let mut uow = UnitOfWork::new();
        let bridge = ImageMediaBridge {
            id: ExternalId(7),
            media_id: "m1".to_string(),
        };

        assert_eq!(
            uow.overlay_image_bridge(ExternalId(7), Some(bridge.clone())),
            Some(bridge.clone())
        );

        uow.persist(PendingWrite::DeleteMedia {
            media_id: "m1".to_string(),
        });
        assert_eq!(uow.overlay_image_bridge(ExternalId(7), Some(bridge)), None);
    }

    #[test]
    fn test_overlay_media_builds_staged_aggregate() {
        let mut uow = UnitOfWork::new();
        let (media, version) = stage_media(&mut uow);
        uow.persist(PendingWrite::UpsertFileVersionMeta(FileVersionMeta::new(
            &version.id,
            "en",
            "photo.jpg",
            true,
        )));

        let aggregate = uow.overlay_media(&media.id, None).unwrap();
        assert_eq!(aggregate.versions.len(), 1);
        assert_eq!(aggregate.metas.len(), 1);
        assert_eq!(aggregate.file.unwrap().version, 1);
    }

    #[test]
    fn test_overlay_category_and_children() {
        let mut uow = UnitOfWork::new();
        let root = Category::new(0);
        let mut child = Category::new(0);
        child.parent_id = Some(root.id.clone());

        uow.persist(PendingWrite::UpsertCategory(root.clone()));
        uow.persist(PendingWrite::UpsertCategory(child.clone()));
        uow.persist(PendingWrite::UpsertCategoryTranslation(CategoryTranslation {
            category_id: root.id.clone(),
            locale: "en".to_string(),
            name: "Shoes".to_string(),
            description: None,
        }));

        let aggregate = uow.overlay_category(&root.id, None).unwrap();
        assert_eq!(aggregate.translation("en").unwrap().name, "Shoes");
        assert_eq!(uow.staged_children(&root.id), vec![child.id.clone()]);

        uow.persist(PendingWrite::DeleteCategory {
            category_id: root.id.clone(),
            subtree: vec![root.id.clone(), child.id.clone()],
        });
        assert!(uow.overlay_category(&child.id, None).is_none());
    }
}

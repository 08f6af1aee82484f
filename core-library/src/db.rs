//! # Database
//!
//! SQLite pool setup for the content library.
//!
//! Pools run in WAL mode with foreign keys enforced: removing a media row
//! cascades to its bridge, file, versions and metadata. Migrations are
//! embedded and applied when the pool is created; reference data is seeded
//! separately so hosts control when it happens.
//!
//! ```rust,ignore
//! use core_library::db::{create_pool, ensure_system_collection, seed_reference_data, DatabaseConfig};
//!
//! let pool = create_pool(DatabaseConfig::new("cms.db")).await?;
//! seed_reference_data(&pool).await?;
//! ensure_system_collection(&pool, "sylius_media", "Shop media").await?;
//! ```

use crate::models::{Collection, SEEDED_MEDIA_TYPES};
use crate::{LibraryError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Pool settings
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// `sqlite:<path>` or `sqlite::memory:`
    pub database_url: String,
    pub min_connections: u32,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Option<Duration>,
    /// How long a writer waits for a competing write lock
    pub busy_timeout: Duration,
}

impl DatabaseConfig {
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_url: format!("sqlite:{}", database_path.into().display()),
            idle_timeout: Some(Duration::from_secs(600)),
            ..Self::in_memory()
        }
    }

    /// Each connection of an in-memory pool sees its own database; use one
    /// connection when state must be shared.
    pub fn in_memory() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            min_connections: 1,
            max_connections: 5,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: None,
            busy_timeout: Duration::from_secs(5),
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }
}

/// Open the pool, apply migrations and check the connection
pub async fn create_pool(config: DatabaseConfig) -> Result<Pool<Sqlite>> {
    info!(
        database_url = %config.database_url,
        max_connections = config.max_connections,
        "Opening content library"
    );

    let connect_options = SqliteConnectOptions::from_str(&config.database_url)?
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .create_if_missing(true)
        // Concurrent message workers commit through the same file
        .busy_timeout(config.busy_timeout);

    let pool = SqlitePoolOptions::new()
        .min_connections(config.min_connections.min(config.max_connections))
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .connect_with(connect_options)
        .await
        .map_err(|e| {
            warn!(error = %e, database_url = %config.database_url, "Failed to open content library");
            LibraryError::Database(e)
        })?;

    run_migrations(&pool).await?;
    health_check(&pool).await?;

    Ok(pool)
}

/// Single-connection in-memory pool with migrations and reference data
pub async fn create_test_pool() -> Result<Pool<Sqlite>> {
    let pool = create_pool(DatabaseConfig::in_memory().max_connections(1)).await?;
    seed_reference_data(&pool).await?;
    Ok(pool)
}

/// Insert the seeded media types if they are missing
///
/// Mirrors the fixtures a CMS installation loads; synchronized images require
/// the image type to exist.
pub async fn seed_reference_data(pool: &Pool<Sqlite>) -> Result<()> {
    for &(id, name, description) in SEEDED_MEDIA_TYPES {
        sqlx::query("INSERT OR IGNORE INTO media_types (id, name, description) VALUES (?, ?, ?)")
            .bind(id)
            .bind(name)
            .bind(description)
            .execute(pool)
            .await?;
    }

    debug!(count = SEEDED_MEDIA_TYPES.len(), "Reference data seeded");
    Ok(())
}

/// Return the id of the system collection with `key`, creating it if needed
pub async fn ensure_system_collection(
    pool: &Pool<Sqlite>,
    key: &str,
    title: &str,
) -> Result<String> {
    if key.trim().is_empty() {
        return Err(LibraryError::InvalidInput {
            field: "collection_key".to_string(),
            message: "System collection key cannot be empty".to_string(),
        });
    }

    let collection = Collection::system(key, title, chrono::Utc::now().timestamp());
    sqlx::query(
        r#"
        INSERT INTO collections (id, collection_key, title, is_system, created_at)
        VALUES (?, ?, ?, 1, ?)
        ON CONFLICT(collection_key) DO NOTHING
        "#,
    )
    .bind(&collection.id)
    .bind(key)
    .bind(&collection.title)
    .bind(collection.created_at)
    .execute(pool)
    .await?;

    let (id,): (String,) = sqlx::query_as("SELECT id FROM collections WHERE collection_key = ?")
        .bind(key)
        .fetch_one(pool)
        .await?;

    info!(collection_key = key, collection_id = %id, "System collection ready");
    Ok(id)
}

async fn run_migrations(pool: &Pool<Sqlite>) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await.map_err(|e| {
        warn!(error = %e, "Migration failed");
        LibraryError::Migration(e.to_string())
    })?;

    debug!("Migrations applied");
    Ok(())
}

async fn health_check(pool: &Pool<Sqlite>) -> Result<()> {
    sqlx::query("SELECT 1").fetch_one(pool).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_pool_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cms.db");

        let pool = create_pool(DatabaseConfig::new(&path)).await.unwrap();
        seed_reference_data(&pool).await.unwrap();
        let id = ensure_system_collection(&pool, "sylius_media", "Shop media")
            .await
            .unwrap();
        pool.close().await;

        let pool = create_pool(DatabaseConfig::new(&path)).await.unwrap();
        let (found,): (String,) =
            sqlx::query_as("SELECT id FROM collections WHERE collection_key = 'sylius_media'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(found, id);
    }

    #[test]
    fn test_database_config_from_path() {
        let config = DatabaseConfig::new("/var/lib/catalog-sync/cms.db").max_connections(8);
        assert_eq!(config.database_url, "sqlite:/var/lib/catalog-sync/cms.db");
        assert_eq!(config.max_connections, 8);
        assert_eq!(config.idle_timeout, Some(Duration::from_secs(600)));
    }

    #[tokio::test]
    async fn test_unreachable_path_is_database_error() {
        let config = DatabaseConfig::new("/nonexistent-dir/for/sure/cms.db")
            .acquire_timeout(Duration::from_secs(1));
        assert!(matches!(
            create_pool(config).await,
            Err(LibraryError::Database(_))
        ));
    }

    #[tokio::test]
    async fn test_foreign_keys_enabled() {
        let pool = create_test_pool().await.unwrap();

        let result: (i32,) = sqlx::query_as("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .unwrap();

        assert_eq!(result.0, 1, "Foreign keys should be enabled");
    }

    #[tokio::test]
    async fn test_migrations_create_tables() {
        let pool = create_test_pool().await.unwrap();

        for table in [
            "media",
            "files",
            "file_versions",
            "file_version_meta",
            "image_media_bridges",
            "categories",
            "taxon_category_bridges",
            "contents",
        ] {
            let result: (i32,) = sqlx::query_as(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name = ?",
            )
            .bind(table)
            .fetch_one(&pool)
            .await
            .unwrap();

            assert_eq!(result.0, 1, "{} table should exist", table);
        }
    }

    #[tokio::test]
    async fn test_seed_reference_data_is_idempotent() {
        let pool = create_test_pool().await.unwrap();
        seed_reference_data(&pool).await.unwrap();

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM media_types")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, SEEDED_MEDIA_TYPES.len() as i64);

        let (name,): (String,) = sqlx::query_as("SELECT name FROM media_types WHERE id = 2")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(name, "image");
    }

    #[tokio::test]
    async fn test_ensure_system_collection_returns_stable_id() {
        let pool = create_test_pool().await.unwrap();

        let first = ensure_system_collection(&pool, "sylius_media", "Shop media")
            .await
            .unwrap();
        let second = ensure_system_collection(&pool, "sylius_media", "Other title")
            .await
            .unwrap();

        assert_eq!(first, second);
        assert!(ensure_system_collection(&pool, " ", "Blank").await.is_err());
    }
}

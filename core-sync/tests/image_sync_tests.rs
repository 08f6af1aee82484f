//! End-to-end tests for image synchronization
//!
//! These tests run messages through the consumer against an in-memory
//! database and a content store in a temporary directory:
//! - Version creation, size idempotency and contiguous numbering
//! - Metadata per locale
//! - Fetch failures leave no trace
//! - Removal of synchronized and unknown ids

use bridge_desktop::LocalContentStorage;
use bridge_traits::{
    error::Result as BridgeResult, DownloadResponse, HttpClient, HttpRequest, SystemClock,
};
use core_library::db::{create_test_pool, ensure_system_collection};
use core_runtime::events::{CoreEvent, EventBus, MediaEvent};
use core_sync::{
    ImageAdapterSettings, ImageMediaAdapter, ImageRepositories, ImagePayload, MessageConsumer,
    RemoveImageMessage, SyncError, SyncMessage, SyncOutcome, SynchronizeImageMessage,
    TaxonCategoryAdapter,
};
use core_library::models::ExternalId;
use mockall::{mock, Sequence};
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

mock! {
    pub Shop {}

    #[async_trait::async_trait]
    impl HttpClient for Shop {
        async fn download(&self, request: HttpRequest) -> BridgeResult<DownloadResponse>;
    }
}

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    consumer: MessageConsumer,
    pool: SqlitePool,
    events: Arc<EventBus>,
    storage_dir: TempDir,
    _download_dir: TempDir,
}

async fn harness(shop: MockShop) -> Harness {
    let pool = create_test_pool().await.unwrap();
    ensure_system_collection(&pool, "shop_media", "Shop media")
        .await
        .unwrap();

    let storage_dir = TempDir::new().unwrap();
    let download_dir = TempDir::new().unwrap();
    let storage = Arc::new(LocalContentStorage::with_root(storage_dir.path()));
    let clock = Arc::new(SystemClock);
    let events = Arc::new(EventBus::new(128));

    let images = ImageMediaAdapter::new(
        ImageRepositories::sqlite(&pool),
        Arc::new(shop),
        clock.clone(),
        ImageAdapterSettings {
            base_url: "https://shop.example.com".to_string(),
            collection_key: "shop_media".to_string(),
            temp_dir: download_dir.path().to_path_buf(),
            fetch_timeout: Duration::from_secs(5),
        },
    );
    let taxons = TaxonCategoryAdapter::sqlite(&pool, clock);

    let consumer = MessageConsumer::new(
        pool.clone(),
        storage,
        Arc::new(images),
        Arc::new(taxons),
        events.clone(),
        4,
    );

    Harness {
        consumer,
        pool,
        events,
        storage_dir,
        _download_dir: download_dir,
    }
}

/// JPEG bytes of exactly `size` bytes
fn jpeg(size: usize) -> Vec<u8> {
    let mut body = vec![0xFF, 0xD8, 0xFF, 0xE0];
    body.resize(size, 0);
    body
}

/// Expect one download in sequence answering with `status` and `size` bytes
fn respond(shop: &mut MockShop, seq: &mut Sequence, status: u16, size: usize) {
    shop.expect_download()
        .times(1)
        .in_sequence(seq)
        .returning(move |_| Ok(DownloadResponse::from_bytes(status, jpeg(size))));
}

fn synchronize(id: i64, locale: &str) -> SyncMessage {
    SynchronizeImageMessage::new(ImagePayload::new(id, "ab/cd/shoe.jpg", locale)).into()
}

async fn count(pool: &SqlitePool, table: &str) -> i64 {
    let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .unwrap();
    count
}

async fn versions(pool: &SqlitePool) -> Vec<(i64, i64)> {
    sqlx::query_as("SELECT version, size FROM file_versions ORDER BY version")
        .fetch_all(pool)
        .await
        .unwrap()
}

fn stored_files(root: &Path) -> usize {
    let Ok(segments) = std::fs::read_dir(root) else {
        return 0;
    };
    segments
        .flatten()
        .filter(|entry| entry.path().is_dir())
        .map(|entry| std::fs::read_dir(entry.path()).map_or(0, |files| files.count()))
        .sum()
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_size_change_scenario() {
    let mut shop = MockShop::new();
    let mut seq = Sequence::new();
    respond(&mut shop, &mut seq, 200, 1000);
    respond(&mut shop, &mut seq, 200, 1000);
    respond(&mut shop, &mut seq, 200, 1200);
    let h = harness(shop).await;

    let first = h.consumer.handle(synchronize(42, "en")).await.unwrap();
    assert!(matches!(first, SyncOutcome::Created { .. }));
    assert_eq!(versions(&h.pool).await, vec![(1, 1000)]);

    let second = h.consumer.handle(synchronize(42, "en")).await.unwrap();
    assert_eq!(second, SyncOutcome::Unchanged);
    assert_eq!(versions(&h.pool).await, vec![(1, 1000)]);

    let third = h.consumer.handle(synchronize(42, "en")).await.unwrap();
    assert_eq!(third, SyncOutcome::Updated { version: 2 });
    assert_eq!(versions(&h.pool).await, vec![(1, 1000), (2, 1200)]);

    // Still one bridge, one media, one file pointing at the latest version
    assert_eq!(count(&h.pool, "image_media_bridges").await, 1);
    assert_eq!(count(&h.pool, "media").await, 1);
    let (pointer,): (i64,) = sqlx::query_as("SELECT version FROM files")
        .fetch_one(&h.pool)
        .await
        .unwrap();
    assert_eq!(pointer, 2);
    assert_eq!(stored_files(h.storage_dir.path()), 2);
}

#[tokio::test]
async fn test_new_media_is_typed_and_collected() {
    let mut shop = MockShop::new();
    let mut seq = Sequence::new();
    respond(&mut shop, &mut seq, 200, 500);
    let h = harness(shop).await;

    h.consumer.handle(synchronize(7, "en")).await.unwrap();

    let (media_type_id, collection_key): (Option<i64>, Option<String>) = sqlx::query_as(
        r#"
        SELECT m.media_type_id, c.collection_key
        FROM media m JOIN collections c ON c.id = m.collection_id
        "#,
    )
    .fetch_one(&h.pool)
    .await
    .unwrap();
    assert_eq!(media_type_id, Some(2));
    assert_eq!(collection_key.as_deref(), Some("shop_media"));

    let (name, mime_type, storage_options): (String, String, Option<String>) =
        sqlx::query_as("SELECT name, mime_type, storage_options FROM file_versions")
            .fetch_one(&h.pool)
            .await
            .unwrap();
    assert_eq!(name, "shoe.jpg");
    assert_eq!(mime_type, "image/jpeg");
    assert!(storage_options.unwrap().contains("shoe.jpg"));
}

#[tokio::test]
async fn test_second_locale_adds_metadata_only() {
    let mut shop = MockShop::new();
    let mut seq = Sequence::new();
    respond(&mut shop, &mut seq, 200, 1000);
    respond(&mut shop, &mut seq, 200, 1000);
    let h = harness(shop).await;

    h.consumer.handle(synchronize(42, "en")).await.unwrap();
    let outcome = h.consumer.handle(synchronize(42, "de")).await.unwrap();
    assert_eq!(outcome, SyncOutcome::Updated { version: 1 });

    assert_eq!(count(&h.pool, "file_versions").await, 1);
    let metas: Vec<(String, bool)> =
        sqlx::query_as("SELECT locale, is_default FROM file_version_meta ORDER BY locale")
            .fetch_all(&h.pool)
            .await
            .unwrap();
    assert_eq!(
        metas,
        vec![("de".to_string(), false), ("en".to_string(), true)]
    );
}

#[tokio::test]
async fn test_fetch_failure_leaves_nothing() {
    let mut shop = MockShop::new();
    let mut seq = Sequence::new();
    respond(&mut shop, &mut seq, 404, 0);
    let h = harness(shop).await;

    let err = h.consumer.handle(synchronize(42, "en")).await.unwrap_err();
    match err {
        SyncError::RemoteFetchFailed { url, status, .. } => {
            assert_eq!(url, "https://shop.example.com/media/image/ab/cd/shoe.jpg");
            assert_eq!(status, Some(404));
        }
        other => panic!("expected RemoteFetchFailed, got {other:?}"),
    }

    for table in ["media", "image_media_bridges", "files", "file_versions"] {
        assert_eq!(count(&h.pool, table).await, 0, "{table} should be empty");
    }
    assert_eq!(stored_files(h.storage_dir.path()), 0);
}

#[tokio::test]
async fn test_remove_deletes_everything() {
    let mut shop = MockShop::new();
    let mut seq = Sequence::new();
    respond(&mut shop, &mut seq, 200, 1000);
    respond(&mut shop, &mut seq, 200, 1200);
    let h = harness(shop).await;
    let mut events = h.events.subscribe();

    h.consumer.handle(synchronize(42, "en")).await.unwrap();
    h.consumer.handle(synchronize(42, "en")).await.unwrap();
    assert_eq!(stored_files(h.storage_dir.path()), 2);

    let outcome = h
        .consumer
        .handle(RemoveImageMessage::new(ExternalId(42)).into())
        .await
        .unwrap();
    assert_eq!(outcome, SyncOutcome::Removed);

    for table in [
        "media",
        "image_media_bridges",
        "files",
        "file_versions",
        "file_version_meta",
    ] {
        assert_eq!(count(&h.pool, table).await, 0, "{table} should be empty");
    }
    assert_eq!(stored_files(h.storage_dir.path()), 0);

    let mut removed = false;
    while let Ok(event) = events.try_recv() {
        removed |= matches!(event, CoreEvent::Media(MediaEvent::Removed { external_id: 42 }));
    }
    assert!(removed);
}

#[tokio::test]
async fn test_remove_unknown_id_is_noop() {
    let h = harness(MockShop::new()).await;

    let outcome = h
        .consumer
        .handle(RemoveImageMessage::new(ExternalId(404)).into())
        .await
        .unwrap();

    assert_eq!(outcome, SyncOutcome::NotFound);
}

#[tokio::test]
async fn test_batch_sees_its_own_staged_versions() {
    let mut shop = MockShop::new();
    let mut seq = Sequence::new();
    respond(&mut shop, &mut seq, 200, 1000);
    respond(&mut shop, &mut seq, 200, 1200);
    let h = harness(shop).await;

    let outcomes = h
        .consumer
        .handle_batch(vec![synchronize(42, "en"), synchronize(42, "en")])
        .await
        .unwrap();

    assert!(matches!(outcomes[0], SyncOutcome::Created { .. }));
    assert_eq!(outcomes[1], SyncOutcome::Updated { version: 2 });
    assert_eq!(count(&h.pool, "image_media_bridges").await, 1);
    assert_eq!(versions(&h.pool).await, vec![(1, 1000), (2, 1200)]);
}

#[tokio::test]
async fn test_concurrent_messages_for_one_id_create_one_bridge() {
    let mut shop = MockShop::new();
    shop.expect_download()
        .times(4)
        .returning(|_| Ok(DownloadResponse::from_bytes(200, jpeg(1000))));
    let h = Arc::new(harness(shop).await);

    let mut tasks = Vec::new();
    for _ in 0..4 {
        let h = h.clone();
        tasks.push(tokio::spawn(async move {
            h.consumer.handle(synchronize(42, "en")).await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(count(&h.pool, "image_media_bridges").await, 1);
    assert_eq!(versions(&h.pool).await, vec![(1, 1000)]);
}

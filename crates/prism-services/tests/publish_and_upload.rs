mod common;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use prism_core::{AppError, Image, ImageLimits, TransformJob, TransformationSpec};
use prism_db::{ImageRepository, InMemoryCatalog};
use prism_processing::ImageTransformer;
use prism_queue::{JobQueue, JobStatus};
use prism_services::{ImageQueryService, UploadService};
use prism_storage::{LocalStorage, MemoryStorage, Storage};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use common::{harness, png_bytes};

#[tokio::test]
async fn enqueue_publishes_a_job_for_an_existing_image() {
    let h = harness();
    let image = h.upload_png(20, 20).await;
    let spec = TransformationSpec {
        rotate: Some(180),
        ..Default::default()
    };

    let job_id = h
        .publisher
        .enqueue(image.id, &spec, &CancellationToken::new())
        .await
        .unwrap();

    let delivery = h.queue.receive().await.unwrap().unwrap();
    let job = TransformJob::decode(&delivery.payload).unwrap();
    assert_eq!(job.job_id, job_id);
    assert_eq!(job.image_id, image.id);
    assert_eq!(job.owner_id, image.owner_id.to_string());
    assert_eq!(job.spec, spec);
    assert_eq!(job.spec_hash, prism_core::fingerprint(&spec).unwrap());

    let state = h.publisher.job_status(&job_id).await.unwrap().unwrap();
    assert_eq!(state.status, JobStatus::InFlight);
}

#[tokio::test]
async fn enqueue_for_missing_image_publishes_nothing() {
    let h = harness();

    let err = h
        .publisher
        .enqueue(
            Uuid::new_v4(),
            &TransformationSpec::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::NotFound(_)));
    assert_eq!(h.queue.pending_count().await, 0);
}

#[tokio::test]
async fn duplicate_enqueues_are_not_deduplicated() {
    let h = harness();
    let image = h.upload_png(20, 20).await;
    let spec = TransformationSpec::default();
    let cancel = CancellationToken::new();

    let a = h.publisher.enqueue(image.id, &spec, &cancel).await.unwrap();
    let b = h.publisher.enqueue(image.id, &spec, &cancel).await.unwrap();

    assert_ne!(a, b);
    assert_eq!(h.queue.pending_count().await, 2);
}

#[tokio::test]
async fn upload_stores_original_under_owner_key() {
    let h = harness();
    let owner = Uuid::new_v4();

    let image = h
        .uploads
        .upload(owner, "cat.png", png_bytes(30, 12), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        image.original_key,
        format!("users/{}/images/{}/original", owner, image.id)
    );
    assert_eq!((image.width, image.height), (30, 12));
    assert_eq!(image.mime_type, "image/png");
    assert!(h.storage.exists(&image.original_key).await.unwrap());
    assert_eq!(
        h.storage.content_type(&image.original_key).await.as_deref(),
        Some("image/png")
    );
}

#[tokio::test]
async fn upload_rejects_oversized_and_undecodable_payloads() {
    let catalog = Arc::new(InMemoryCatalog::new());
    let storage = Arc::new(MemoryStorage::new());
    let uploads = UploadService::new(
        catalog,
        storage.clone(),
        Arc::new(ImageTransformer::default()),
        ImageLimits {
            max_upload_size: 64,
            ..Default::default()
        },
    );
    let cancel = CancellationToken::new();

    let err = uploads
        .upload(Uuid::new_v4(), "big.png", Bytes::from(vec![0u8; 65]), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::PayloadTooLarge(_)));

    let err = uploads
        .upload(Uuid::new_v4(), "junk.png", Bytes::from_static(b"junk"), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidRequest(_)));

    assert_eq!(storage.object_count().await, 0);
}

struct UnavailableCatalog;

#[async_trait]
impl ImageRepository for UnavailableCatalog {
    async fn save_image(&self, _image: &Image) -> Result<Image, AppError> {
        Err(AppError::Internal("catalog unavailable".to_string()))
    }

    async fn get_image(&self, _id: Uuid) -> Result<Option<Image>, AppError> {
        Ok(None)
    }

    async fn list_images(
        &self,
        _owner_id: Uuid,
        _offset: i64,
        _limit: i64,
    ) -> Result<(Vec<Image>, i64), AppError> {
        Ok((Vec::new(), 0))
    }
}

#[tokio::test]
async fn failed_catalog_write_removes_stored_original() {
    let dir = TempDir::new().unwrap();
    let storage = Arc::new(
        LocalStorage::new(dir.path(), "http://localhost/objects".to_string())
            .await
            .unwrap(),
    );
    let uploads = UploadService::new(
        Arc::new(UnavailableCatalog),
        storage.clone(),
        Arc::new(ImageTransformer::default()),
        ImageLimits::default(),
    );

    let owner = Uuid::new_v4();
    let err = uploads
        .upload(owner, "cat.png", png_bytes(8, 8), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Internal(_)));

    let images_dir = dir.path().join("users").join(owner.to_string()).join("images");
    let leftovers = std::fs::read_dir(&images_dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .filter(|e| e.path().join("original").exists())
                .count()
        })
        .unwrap_or(0);
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn query_service_clamps_page_size_and_reports_missing_images() {
    let h = harness();
    let owner = Uuid::new_v4();
    for _ in 0..3 {
        h.uploads
            .upload(owner, "a.png", png_bytes(4, 4), &CancellationToken::new())
            .await
            .unwrap();
    }
    let queries = ImageQueryService::new(h.catalog.clone());

    let page = queries.list_images(owner, -5, 0).await.unwrap();
    assert_eq!((page.offset, page.limit), (0, 1));
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.total, 3);

    let page = queries.list_images(owner, 0, 1000).await.unwrap();
    assert_eq!(page.limit, 100);
    assert_eq!(page.items.len(), 3);

    let err = queries.get_image(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

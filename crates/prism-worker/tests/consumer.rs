use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use image::{DynamicImage, Rgba, RgbaImage};
use prism_core::{
    fingerprint, AppError, Image, ImageFormat, ImageLimits, ResizeSpec, TransformJob,
    TransformationSpec,
};
use prism_db::InMemoryCatalog;
use prism_processing::{ImageMetadata, ImageTransformer, ProcessedImage, TransformEngine};
use prism_queue::{JobQueue, JobStatus, MemoryJobQueue};
use prism_services::{
    PipelineMetrics, TransformPublisher, TransformService, UploadService, VariantPipeline,
};
use prism_storage::{MemoryStorage, Storage, StorageBackend, StorageError, StorageResult};
use prism_worker::{JobOutcome, TransformWorker, WorkerConfig};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

const MAX_REDELIVERIES: i32 = 3;

struct Setup {
    catalog: Arc<InMemoryCatalog>,
    storage: Arc<MemoryStorage>,
    queue: Arc<MemoryJobQueue>,
    pipeline: VariantPipeline,
    publisher: TransformPublisher,
    worker: TransformWorker,
}

fn setup(engine: Arc<dyn TransformEngine>) -> Setup {
    let storage = Arc::new(MemoryStorage::new());
    setup_with(engine, storage.clone(), storage)
}

fn setup_with(
    engine: Arc<dyn TransformEngine>,
    storage: Arc<MemoryStorage>,
    pipeline_storage: Arc<dyn Storage>,
) -> Setup {
    let catalog = Arc::new(InMemoryCatalog::new());
    let queue = Arc::new(MemoryJobQueue::new(MAX_REDELIVERIES));
    let pipeline = VariantPipeline::new(
        catalog.clone(),
        catalog.clone(),
        pipeline_storage,
        engine,
        PipelineMetrics::from_global(),
    );
    let worker = TransformWorker::new(
        queue.clone(),
        pipeline.clone(),
        WorkerConfig {
            prefetch: 2,
            poll_interval_ms: 10,
        },
        pipeline.metrics().clone(),
    );

    Setup {
        publisher: TransformPublisher::new(catalog.clone(), queue.clone()),
        catalog,
        storage,
        queue,
        pipeline,
        worker,
    }
}

impl Setup {
    async fn upload(&self, width: u32, height: u32) -> Image {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_fn(width, height, |x, y| {
            Rgba([(x % 256) as u8, (y % 256) as u8, 64, 255])
        }));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();

        UploadService::new(
            self.catalog.clone(),
            self.storage.clone(),
            Arc::new(ImageTransformer::default()),
            ImageLimits::default(),
        )
        .upload(
            Uuid::new_v4(),
            "source.png",
            Bytes::from(buf),
            &CancellationToken::new(),
        )
        .await
        .unwrap()
    }
}

fn thumbnail_spec() -> TransformationSpec {
    TransformationSpec {
        resize: Some(ResizeSpec {
            width: 24,
            height: 16,
        }),
        format: Some(ImageFormat::Jpeg),
        quality: Some(70),
        ..Default::default()
    }
}

struct FailingEngine;

#[async_trait]
impl TransformEngine for FailingEngine {
    async fn transform(
        &self,
        _source: Bytes,
        _spec: &TransformationSpec,
    ) -> Result<ProcessedImage, AppError> {
        Err(AppError::TransformationFailed("decoder crashed".to_string()))
    }

    async fn inspect(&self, data: Bytes) -> Result<ImageMetadata, AppError> {
        ImageTransformer::default().inspect(data).await
    }
}

/// Serves originals, refuses variant uploads
struct ReadOnlyVariants {
    inner: Arc<MemoryStorage>,
}

#[async_trait]
impl Storage for ReadOnlyVariants {
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<()> {
        if key.starts_with("variants/") {
            return Err(StorageError::UploadFailed(format!("{}: read-only", key)));
        }
        self.inner.put(key, data, content_type).await
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.inner.exists(key).await
    }

    fn public_url(&self, key: &str) -> String {
        self.inner.public_url(key)
    }

    fn backend_type(&self) -> StorageBackend {
        self.inner.backend_type()
    }
}

#[tokio::test]
async fn queued_job_produces_the_same_variant_as_a_sync_call() {
    let s = setup(Arc::new(ImageTransformer::default()));
    let image = s.upload(64, 48).await;
    let cancel = CancellationToken::new();

    let job_id = s
        .publisher
        .enqueue(image.id, &thumbnail_spec(), &cancel)
        .await
        .unwrap();

    assert_eq!(s.worker.process_next().await.unwrap(), Some(JobOutcome::Acked));
    assert_eq!(s.worker.process_next().await.unwrap(), None);

    let state = s.publisher.job_status(&job_id).await.unwrap().unwrap();
    assert_eq!(state.status, JobStatus::Acked);
    assert_eq!(state.delivery_count, 1);

    let puts = s.storage.put_count();
    let sync = TransformService::new(s.pipeline.clone())
        .transform(image.id, &thumbnail_spec(), &cancel)
        .await
        .unwrap();
    let hash = fingerprint(&thumbnail_spec()).unwrap();
    assert_eq!(sync.variant_key, format!("variants/{}/{}.jpg", image.id, hash));
    assert_eq!((sync.width, sync.height), (24, 16));
    assert_eq!(s.storage.put_count(), puts);
    assert_eq!(s.catalog.variant_count().await, 1);
}

#[tokio::test]
async fn redelivered_job_is_idempotent() {
    let s = setup(Arc::new(ImageTransformer::default()));
    let image = s.upload(32, 32).await;
    let cancel = CancellationToken::new();

    for _ in 0..2 {
        s.publisher
            .enqueue(image.id, &thumbnail_spec(), &cancel)
            .await
            .unwrap();
    }

    assert_eq!(s.worker.process_next().await.unwrap(), Some(JobOutcome::Acked));
    assert_eq!(s.worker.process_next().await.unwrap(), Some(JobOutcome::Acked));
    assert_eq!(s.catalog.variant_count().await, 1);
    assert_eq!(s.queue.count_with_status(JobStatus::Acked).await, 2);
}

#[tokio::test]
async fn malformed_payload_is_discarded_without_blocking_the_queue() {
    let s = setup(Arc::new(ImageTransformer::default()));
    let image = s.upload(32, 32).await;

    s.queue
        .publish_raw(Bytes::from_static(b"{\"image_id\": 42"))
        .await
        .unwrap();
    s.publisher
        .enqueue(image.id, &thumbnail_spec(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        s.worker.process_next().await.unwrap(),
        Some(JobOutcome::Discarded)
    );
    assert_eq!(s.worker.process_next().await.unwrap(), Some(JobOutcome::Acked));

    let dead = s.queue.dead_letters().await;
    assert_eq!(dead.len(), 1);
    assert!(dead[0].starts_with("malformed payload"));
    assert_eq!(s.queue.pending_count().await, 0);
}

#[tokio::test]
async fn failing_job_is_dead_lettered_after_max_redeliveries() {
    let s = setup(Arc::new(FailingEngine));
    let image = s.upload(16, 16).await;
    let job_id = s
        .publisher
        .enqueue(image.id, &thumbnail_spec(), &CancellationToken::new())
        .await
        .unwrap();

    let mut outcomes = Vec::new();
    while let Some(outcome) = s.worker.process_next().await.unwrap() {
        outcomes.push(outcome);
    }

    assert_eq!(
        outcomes,
        vec![
            JobOutcome::Requeued,
            JobOutcome::Requeued,
            JobOutcome::DeadLettered
        ]
    );
    let state = s.publisher.job_status(&job_id).await.unwrap().unwrap();
    assert_eq!(state.status, JobStatus::Dead);
    assert_eq!(state.delivery_count, MAX_REDELIVERIES);
    assert!(state.last_error.unwrap().contains("decoder crashed"));
    assert_eq!(s.catalog.variant_count().await, 0);
}

#[tokio::test]
async fn storage_failure_is_requeued() {
    let storage = Arc::new(MemoryStorage::new());
    let s = setup_with(
        Arc::new(ImageTransformer::default()),
        storage.clone(),
        Arc::new(ReadOnlyVariants { inner: storage }),
    );
    let image = s.upload(16, 16).await;
    let job_id = s
        .publisher
        .enqueue(image.id, &thumbnail_spec(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        s.worker.process_next().await.unwrap(),
        Some(JobOutcome::Requeued)
    );
    let state = s.publisher.job_status(&job_id).await.unwrap().unwrap();
    assert_eq!(state.status, JobStatus::Pending);
    assert!(state.last_error.unwrap().contains("read-only"));
    assert_eq!(s.catalog.variant_count().await, 0);
}

#[tokio::test]
async fn payload_with_publisher_chosen_ids_is_processed() {
    let s = setup(Arc::new(ImageTransformer::default()));
    let image = s.upload(16, 16).await;
    let payload = format!(
        r#"{{"job_id":"job-42","image_id":"{}","owner_id":"u1","spec":{{"resize":{{"width":8,"height":8}}}}}}"#,
        image.id
    );
    s.queue.publish_raw(Bytes::from(payload)).await.unwrap();

    assert_eq!(s.worker.process_next().await.unwrap(), Some(JobOutcome::Acked));
    assert_eq!(s.catalog.variant_count().await, 1);
}

#[tokio::test]
async fn job_for_missing_image_is_dead_lettered_at_once() {
    let s = setup(Arc::new(ImageTransformer::default()));
    let spec = thumbnail_spec();
    let job = TransformJob::new(
        Uuid::new_v4(),
        "owner-1",
        spec.clone(),
        fingerprint(&spec).unwrap(),
    );
    s.queue.publish(&job).await.unwrap();

    assert_eq!(
        s.worker.process_next().await.unwrap(),
        Some(JobOutcome::DeadLettered)
    );
    let state = s.queue.job_status(&job.job_id).await.unwrap().unwrap();
    assert_eq!(state.status, JobStatus::Dead);
    assert_eq!(state.delivery_count, 1);
}

#[tokio::test]
async fn job_with_mismatched_hash_is_dead_lettered() {
    let s = setup(Arc::new(ImageTransformer::default()));
    let image = s.upload(16, 16).await;
    let job = TransformJob::new(image.id, image.owner_id.to_string(), thumbnail_spec(), "deadbeef");
    s.queue.publish(&job).await.unwrap();

    assert_eq!(
        s.worker.process_next().await.unwrap(),
        Some(JobOutcome::DeadLettered)
    );
    assert_eq!(s.catalog.variant_count().await, 0);
}

#[tokio::test]
async fn run_loop_drains_the_queue_and_stops_on_shutdown() {
    let s = setup(Arc::new(ImageTransformer::default()));
    let image = s.upload(40, 40).await;
    let cancel = CancellationToken::new();

    let mut spec = thumbnail_spec();
    for width in [8, 12, 16] {
        spec.resize = Some(ResizeSpec { width, height: 8 });
        s.publisher.enqueue(image.id, &spec, &cancel).await.unwrap();
    }

    let worker = s.worker.clone();
    let handle = tokio::spawn(async move { worker.run().await });

    let drained = tokio::time::timeout(Duration::from_secs(10), async {
        while s.queue.count_with_status(JobStatus::Acked).await < 3 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(drained.is_ok(), "worker did not drain the queue");

    s.worker.shutdown();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("worker did not stop")
        .unwrap();

    assert_eq!(s.catalog.variant_count().await, 3);
    assert!(s.worker.shutdown_token().is_cancelled());
}

#![allow(dead_code)]

use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use image::{DynamicImage, Rgba, RgbaImage};
use prism_core::{Image, ImageLimits};
use prism_db::InMemoryCatalog;
use prism_processing::{ImageTransformer, TransformEngine};
use prism_queue::MemoryJobQueue;
use prism_services::{
    PipelineMetrics, TransformPublisher, TransformService, UploadService, VariantPipeline,
};
use prism_storage::{MemoryStorage, Storage, StorageBackend, StorageError, StorageResult};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub struct Harness {
    pub catalog: Arc<InMemoryCatalog>,
    pub storage: Arc<MemoryStorage>,
    pub queue: Arc<MemoryJobQueue>,
    pub pipeline: VariantPipeline,
    pub transforms: TransformService,
    pub publisher: TransformPublisher,
    pub uploads: UploadService,
}

pub fn harness() -> Harness {
    harness_with_engine(Arc::new(ImageTransformer::default()))
}

pub fn harness_with_engine(engine: Arc<dyn TransformEngine>) -> Harness {
    let storage = Arc::new(MemoryStorage::new());
    build(engine, storage.clone(), storage)
}

/// Originals upload fine, but every variant upload fails
pub fn harness_with_failing_variant_uploads() -> Harness {
    let storage = Arc::new(MemoryStorage::new());
    let failing = Arc::new(FailingVariantStorage {
        inner: storage.clone(),
    });
    build(Arc::new(ImageTransformer::default()), storage, failing)
}

fn build(
    engine: Arc<dyn TransformEngine>,
    storage: Arc<MemoryStorage>,
    pipeline_storage: Arc<dyn Storage>,
) -> Harness {
    let catalog = Arc::new(InMemoryCatalog::new());
    let queue = Arc::new(MemoryJobQueue::new(3));

    let pipeline = VariantPipeline::new(
        catalog.clone(),
        catalog.clone(),
        pipeline_storage,
        engine,
        PipelineMetrics::from_global(),
    );
    let uploads = UploadService::new(
        catalog.clone(),
        storage.clone(),
        Arc::new(ImageTransformer::default()),
        ImageLimits::default(),
    );

    Harness {
        transforms: TransformService::new(pipeline.clone()),
        publisher: TransformPublisher::new(catalog.clone(), queue.clone()),
        catalog,
        storage,
        queue,
        pipeline,
        uploads,
    }
}

pub struct FailingVariantStorage {
    pub inner: Arc<MemoryStorage>,
}

#[async_trait]
impl Storage for FailingVariantStorage {
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> StorageResult<()> {
        if key.starts_with("variants/") {
            return Err(StorageError::UploadFailed(format!("{}: bucket unavailable", key)));
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

pub fn png_bytes(width: u32, height: u32) -> Bytes {
    let img = DynamicImage::ImageRgba8(RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x * 3 % 256) as u8, (y * 5 % 256) as u8, 120, 255])
    }));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    Bytes::from(buf)
}

impl Harness {
    pub async fn upload_png(&self, width: u32, height: u32) -> Image {
        self.uploads
            .upload(
                Uuid::new_v4(),
                "source.png",
                png_bytes(width, height),
                &CancellationToken::new(),
            )
            .await
            .unwrap()
    }

    pub async fn variant_objects(&self) -> Vec<String> {
        self.storage
            .keys()
            .await
            .into_iter()
            .filter(|k| k.starts_with("variants/"))
            .collect()
    }
}

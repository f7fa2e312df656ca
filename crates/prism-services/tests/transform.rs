mod common;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use prism_core::{fingerprint, AppError, ImageFormat, ResizeSpec, TransformationSpec};
use prism_processing::{ImageMetadata, ImageTransformer, ProcessedImage, TransformEngine};
use prism_services::VariantSource;
use prism_storage::Storage;
use tokio::sync::Barrier;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use common::{harness, harness_with_engine, harness_with_failing_variant_uploads};

fn thumbnail_spec() -> TransformationSpec {
    TransformationSpec {
        resize: Some(ResizeSpec {
            width: 32,
            height: 32,
        }),
        format: Some(ImageFormat::Png),
        ..Default::default()
    }
}

#[tokio::test]
async fn webp_thumbnail_is_produced_once() {
    let h = harness();
    let image = h.upload_png(320, 240).await;
    let cancel = CancellationToken::new();

    let spec = TransformationSpec::from_json(
        r#"{"resize":{"width":200,"height":200},"format":"webp","quality":80}"#,
    )
    .unwrap();
    let hash = fingerprint(&spec).unwrap();

    let first = h.transforms.transform(image.id, &spec, &cancel).await.unwrap();
    assert_eq!(first.variant_key, format!("variants/{}/{}.webp", image.id, hash));
    assert_eq!((first.width, first.height), (200, 200));
    assert_eq!(first.mime_type, "image/webp");
    assert!(h.storage.exists(&first.variant_key).await.unwrap());

    let puts_after_first = h.storage.put_count();
    let second = h.transforms.transform(image.id, &spec, &cancel).await.unwrap();

    assert_eq!(second, first);
    assert_eq!(h.storage.put_count(), puts_after_first);
    assert_eq!(h.catalog.variant_count().await, 1);
}

#[tokio::test]
async fn repeated_calls_return_the_same_variant() {
    let h = harness();
    let image = h.upload_png(64, 64).await;
    let cancel = CancellationToken::new();

    let a = h
        .transforms
        .transform(image.id, &thumbnail_spec(), &cancel)
        .await
        .unwrap();
    let b = h
        .transforms
        .transform(image.id, &thumbnail_spec(), &cancel)
        .await
        .unwrap();

    assert_eq!(a.id, b.id);
    assert_eq!(a.variant_key, b.variant_key);
    assert_eq!(h.catalog.variant_count().await, 1);
    assert_eq!(h.variant_objects().await.len(), 1);
}

#[tokio::test]
async fn concurrent_requests_agree_on_one_variant() {
    let h = harness();
    let image = h.upload_png(96, 64).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let transforms = h.transforms.clone();
        let image_id = image.id;
        handles.push(tokio::spawn(async move {
            transforms
                .transform(image_id, &thumbnail_spec(), &CancellationToken::new())
                .await
                .unwrap()
        }));
    }

    let mut outputs = Vec::new();
    for handle in handles {
        outputs.push(handle.await.unwrap());
    }

    assert!(outputs.iter().all(|o| o.id == outputs[0].id));
    assert_eq!(h.catalog.variant_count().await, 1);
    assert_eq!(h.variant_objects().await, vec![outputs[0].variant_key.clone()]);
}

/// Holds every caller inside the engine until all of them got there, so all of
/// them miss the lookup and race on the insert.
struct BarrierEngine {
    inner: ImageTransformer,
    barrier: Barrier,
}

#[async_trait]
impl TransformEngine for BarrierEngine {
    async fn transform(
        &self,
        source: Bytes,
        spec: &TransformationSpec,
    ) -> Result<ProcessedImage, AppError> {
        self.barrier.wait().await;
        self.inner.transform(source, spec).await
    }

    async fn inspect(&self, data: Bytes) -> Result<ImageMetadata, AppError> {
        self.inner.inspect(data).await
    }
}

#[tokio::test]
async fn insert_race_losers_return_the_winner() {
    const RACERS: usize = 4;
    let h = harness_with_engine(Arc::new(BarrierEngine {
        inner: ImageTransformer::default(),
        barrier: Barrier::new(RACERS),
    }));
    let image = h.upload_png(48, 48).await;
    let spec = thumbnail_spec();
    let hash = fingerprint(&spec).unwrap();

    let mut handles = Vec::new();
    for _ in 0..RACERS {
        let pipeline = h.pipeline.clone();
        let spec = spec.clone();
        let hash = hash.clone();
        let image_id = image.id;
        handles.push(tokio::spawn(async move {
            pipeline
                .ensure_variant(image_id, &spec, &hash, &CancellationToken::new())
                .await
                .unwrap()
        }));
    }

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }

    let produced = results
        .iter()
        .filter(|r| r.source == VariantSource::Produced)
        .count();
    let resolved = results
        .iter()
        .filter(|r| r.source == VariantSource::ConflictResolved)
        .count();
    assert_eq!(produced, 1);
    assert_eq!(resolved, RACERS - 1);
    assert!(results.iter().all(|r| r.variant.id == results[0].variant.id));
    assert_eq!(h.catalog.variant_count().await, 1);
    assert_eq!(h.variant_objects().await.len(), 1);
}

#[tokio::test]
async fn missing_image_is_not_found_and_persists_nothing() {
    let h = harness();
    let cancel = CancellationToken::new();

    let err = h
        .transforms
        .transform(Uuid::new_v4(), &thumbnail_spec(), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    assert_eq!(h.catalog.variant_count().await, 0);
    assert!(h.variant_objects().await.is_empty());
}

#[tokio::test]
async fn invalid_spec_is_rejected_before_any_work() {
    let h = harness();
    let image = h.upload_png(16, 16).await;
    let spec = TransformationSpec {
        rotate: Some(45),
        ..Default::default()
    };

    let err = h
        .transforms
        .transform(image.id, &spec, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidRequest(_)));
}

struct BrokenEngine;

#[async_trait]
impl TransformEngine for BrokenEngine {
    async fn transform(
        &self,
        _source: Bytes,
        _spec: &TransformationSpec,
    ) -> Result<ProcessedImage, AppError> {
        Err(AppError::TransformationFailed("codec exploded".to_string()))
    }

    async fn inspect(&self, data: Bytes) -> Result<ImageMetadata, AppError> {
        ImageTransformer::default().inspect(data).await
    }
}

#[tokio::test]
async fn engine_failure_leaves_no_side_effects() {
    let h = harness_with_engine(Arc::new(BrokenEngine));
    let image = h.upload_png(16, 16).await;

    let err = h
        .transforms
        .transform(image.id, &thumbnail_spec(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::TransformationFailed(_)));
    assert_eq!(h.catalog.variant_count().await, 0);
    assert!(h.variant_objects().await.is_empty());
}

#[tokio::test]
async fn storage_failure_surfaces_and_persists_no_variant() {
    let h = harness_with_failing_variant_uploads();
    let image = h.upload_png(24, 24).await;

    let err = h
        .transforms
        .transform(image.id, &thumbnail_spec(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Storage(_)));
    assert!(err.to_string().contains("bucket unavailable"));
    assert_eq!(h.catalog.variant_count().await, 0);
    assert!(h.variant_objects().await.is_empty());
}

#[tokio::test]
async fn cancelled_request_stops_between_steps() {
    let h = harness();
    let image = h.upload_png(16, 16).await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = h
        .transforms
        .transform(image.id, &thumbnail_spec(), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Cancelled(_)));
    assert_eq!(h.catalog.variant_count().await, 0);
}

#[tokio::test]
async fn distinct_specs_get_distinct_variants() {
    let h = harness();
    let image = h.upload_png(40, 40).await;
    let cancel = CancellationToken::new();

    let png = h
        .transforms
        .transform(image.id, &thumbnail_spec(), &cancel)
        .await
        .unwrap();
    let mut jpeg_spec = thumbnail_spec();
    jpeg_spec.format = Some(ImageFormat::Jpeg);
    let jpeg = h.transforms.transform(image.id, &jpeg_spec, &cancel).await.unwrap();

    assert_ne!(png.id, jpeg.id);
    assert!(jpeg.variant_key.ends_with(".jpg"));
    assert_eq!(h.catalog.variant_count().await, 2);
}

//! Dedup → fetch → transform → upload → persist
//!
//! The (image_id, spec_hash) uniqueness constraint in the variant store is the
//! only synchronization. Racing producers may each transform and upload (the
//! storage key is deterministic, so they overwrite the same object with
//! equivalent bytes), but only one row is persisted and every racer returns it.

use std::sync::Arc;
use std::time::Instant;

use prism_core::{AppError, Image, TransformJob, TransformationSpec, Variant};
use prism_db::{ImageRepository, InsertOutcome, VariantStore};
use prism_processing::TransformEngine;
use prism_storage::{variant_key, Storage};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::metrics::{PipelineMetrics, TransformMode};

/// How a variant was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantSource {
    /// Already persisted before this call
    CacheHit,
    /// Produced and persisted by this call
    Produced,
    /// Produced by this call, but a concurrent producer persisted first
    ConflictResolved,
}

#[derive(Debug, Clone)]
pub struct EnsuredVariant {
    pub variant: Variant,
    pub source: VariantSource,
}

/// Fail with `Cancelled` once the token fired. Called between steps only; a
/// step that already started runs to completion.
pub fn checkpoint(cancel: &CancellationToken, step: &str) -> Result<(), AppError> {
    if cancel.is_cancelled() {
        tracing::info!(step = step, "Operation cancelled");
        return Err(AppError::Cancelled(step.to_string()));
    }
    Ok(())
}

#[derive(Clone)]
pub struct VariantPipeline {
    images: Arc<dyn ImageRepository>,
    variants: Arc<dyn VariantStore>,
    storage: Arc<dyn Storage>,
    engine: Arc<dyn TransformEngine>,
    metrics: PipelineMetrics,
}

impl VariantPipeline {
    pub fn new(
        images: Arc<dyn ImageRepository>,
        variants: Arc<dyn VariantStore>,
        storage: Arc<dyn Storage>,
        engine: Arc<dyn TransformEngine>,
        metrics: PipelineMetrics,
    ) -> Self {
        Self {
            images,
            variants,
            storage,
            engine,
            metrics,
        }
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    pub fn images(&self) -> &Arc<dyn ImageRepository> {
        &self.images
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Return the variant of `image_id` for `spec`, producing it if needed.
    /// `spec_hash` must be the fingerprint of `spec`.
    #[tracing::instrument(skip(self, spec, cancel), fields(image_id = %image_id, spec_hash = %spec_hash))]
    pub async fn ensure_variant(
        &self,
        image_id: Uuid,
        spec: &TransformationSpec,
        spec_hash: &str,
        cancel: &CancellationToken,
    ) -> Result<EnsuredVariant, AppError> {
        let start = Instant::now();

        checkpoint(cancel, "lookup")?;
        if let Some(existing) = self.variants.find_variant(image_id, spec_hash).await? {
            tracing::debug!(variant_id = %existing.id, "Variant cache hit");
            return Ok(EnsuredVariant {
                variant: existing,
                source: VariantSource::CacheHit,
            });
        }

        checkpoint(cancel, "resolve_source")?;
        let image = self.load_image(image_id).await?;

        checkpoint(cancel, "fetch_original")?;
        let original = self.storage.get(&image.original_key).await.map_err(|e| {
            AppError::Storage(format!(
                "Failed to fetch original {} of image {}: {}",
                image.original_key, image_id, e
            ))
        })?;

        checkpoint(cancel, "transform")?;
        let processed = self.engine.transform(original, spec).await?;

        let key = variant_key(image_id, spec_hash, &processed.mime_type);

        checkpoint(cancel, "upload")?;
        self.storage
            .put(&key, processed.data.clone(), &processed.mime_type)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to upload variant {}: {}", key, e)))?;

        checkpoint(cancel, "persist")?;
        let candidate = Variant::new(
            image_id,
            key,
            spec_hash,
            to_i64(processed.size, "size")?,
            processed.mime_type.clone(),
            to_i32(processed.width, "width")?,
            to_i32(processed.height, "height")?,
        )?;

        let ensured = match self.variants.create_variant(&candidate).await? {
            InsertOutcome::Inserted => EnsuredVariant {
                variant: candidate,
                source: VariantSource::Produced,
            },
            InsertOutcome::Conflict => {
                // One re-read; the winner's row is what every racer returns
                let winner = self
                    .variants
                    .find_variant(image_id, spec_hash)
                    .await?
                    .ok_or_else(|| {
                        AppError::Internal(format!(
                            "Variant insert for image {} conflicted but no row was found",
                            image_id
                        ))
                    })?;
                tracing::debug!(variant_id = %winner.id, "Lost variant insert race; returning winner");
                EnsuredVariant {
                    variant: winner,
                    source: VariantSource::ConflictResolved,
                }
            }
        };

        tracing::info!(
            variant_id = %ensured.variant.id,
            variant_key = %ensured.variant.variant_key,
            source = ?ensured.source,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Variant ready"
        );

        Ok(ensured)
    }

    /// Worker entry point: validate the job's spec, settle its fingerprint, and
    /// ensure the variant
    pub async fn run_job(
        &self,
        job: &TransformJob,
        cancel: &CancellationToken,
    ) -> Result<EnsuredVariant, AppError> {
        let start = Instant::now();
        let result = self.ensure_job_variant(job, cancel).await;
        self.record(TransformMode::Async, &result, start);
        result
    }

    async fn ensure_job_variant(
        &self,
        job: &TransformJob,
        cancel: &CancellationToken,
    ) -> Result<EnsuredVariant, AppError> {
        job.spec.check()?;
        let spec_hash = job.resolved_spec_hash()?;
        self.ensure_variant(job.image_id, &job.spec, &spec_hash, cancel)
            .await
    }

    pub(crate) fn record(
        &self,
        mode: TransformMode,
        result: &Result<EnsuredVariant, AppError>,
        start: Instant,
    ) {
        let source = result.as_ref().ok().map(|ensured| ensured.source);
        self.metrics.record_transformation(mode, source, start.elapsed());
    }

    async fn load_image(&self, image_id: Uuid) -> Result<Image, AppError> {
        self.images
            .get_image(image_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Image {} not found", image_id)))
    }
}

fn to_i32(value: u32, field: &str) -> Result<i32, AppError> {
    i32::try_from(value)
        .map_err(|_| AppError::Internal(format!("Variant {} {} out of range", field, value)))
}

fn to_i64(value: usize, field: &str) -> Result<i64, AppError> {
    i64::try_from(value)
        .map_err(|_| AppError::Internal(format!("Variant {} {} out of range", field, value)))
}

use std::time::Instant;

use prism_core::{fingerprint, AppError, TransformationSpec, Variant};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::metrics::TransformMode;
use crate::pipeline::{EnsuredVariant, VariantPipeline};

/// Public fields of a variant returned to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransformOutput {
    pub id: Uuid,
    pub variant_key: String,
    pub mime_type: String,
    pub width: i32,
    pub height: i32,
    pub size: i64,
}

impl From<Variant> for TransformOutput {
    fn from(variant: Variant) -> Self {
        Self {
            id: variant.id,
            variant_key: variant.variant_key,
            mime_type: variant.mime_type,
            width: variant.width,
            height: variant.height,
            size: variant.size,
        }
    }
}

/// Synchronous transformation: the caller waits for the variant
#[derive(Clone)]
pub struct TransformService {
    pipeline: VariantPipeline,
}

impl TransformService {
    pub fn new(pipeline: VariantPipeline) -> Self {
        Self { pipeline }
    }

    #[tracing::instrument(skip(self, spec, cancel), fields(image_id = %image_id))]
    pub async fn transform(
        &self,
        image_id: Uuid,
        spec: &TransformationSpec,
        cancel: &CancellationToken,
    ) -> Result<TransformOutput, AppError> {
        let start = Instant::now();
        let result = self.ensure(image_id, spec, cancel).await;
        self.pipeline.record(TransformMode::Sync, &result, start);

        Ok(result?.variant.into())
    }

    async fn ensure(
        &self,
        image_id: Uuid,
        spec: &TransformationSpec,
        cancel: &CancellationToken,
    ) -> Result<EnsuredVariant, AppError> {
        spec.check()?;
        let spec_hash = fingerprint(spec)?;
        self.pipeline
            .ensure_variant(image_id, spec, &spec_hash, cancel)
            .await
    }
}

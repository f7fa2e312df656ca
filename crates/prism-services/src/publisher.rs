use std::sync::Arc;

use prism_core::{fingerprint, AppError, TransformJob, TransformationSpec};
use prism_db::ImageRepository;
use prism_queue::{JobQueue, JobState};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::pipeline::checkpoint;

/// Asynchronous transformation: validates, enqueues and returns the job id.
///
/// No variant lookup happens here; duplicate requests may enqueue redundant
/// jobs, which the worker resolves through the variant store.
#[derive(Clone)]
pub struct TransformPublisher {
    images: Arc<dyn ImageRepository>,
    queue: Arc<dyn JobQueue>,
}

impl TransformPublisher {
    pub fn new(images: Arc<dyn ImageRepository>, queue: Arc<dyn JobQueue>) -> Self {
        Self { images, queue }
    }

    #[tracing::instrument(skip(self, spec, cancel), fields(image_id = %image_id))]
    pub async fn enqueue(
        &self,
        image_id: Uuid,
        spec: &TransformationSpec,
        cancel: &CancellationToken,
    ) -> Result<String, AppError> {
        spec.check()?;

        checkpoint(cancel, "resolve_source")?;
        let image = self
            .images
            .get_image(image_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Image {} not found", image_id)))?;

        let spec_hash = fingerprint(spec)?;
        let job = TransformJob::new(image.id, image.owner_id.to_string(), spec.clone(), spec_hash);

        checkpoint(cancel, "publish")?;
        self.queue.publish(&job).await?;

        tracing::info!(job_id = %job.job_id, spec_hash = %job.spec_hash, "Transform job enqueued");
        Ok(job.job_id)
    }

    /// Queue-side state of a published job; `None` for unknown ids
    pub async fn job_status(&self, job_id: &str) -> Result<Option<JobState>, AppError> {
        Ok(self.queue.job_status(job_id).await?)
    }
}

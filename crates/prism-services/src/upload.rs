use std::sync::Arc;

use bytes::Bytes;
use prism_core::{AppError, Image, ImageLimits};
use prism_db::ImageRepository;
use prism_processing::TransformEngine;
use prism_storage::{original_key, Storage};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::pipeline::checkpoint;

/// Stores an original and records it in the catalog
#[derive(Clone)]
pub struct UploadService {
    images: Arc<dyn ImageRepository>,
    storage: Arc<dyn Storage>,
    engine: Arc<dyn TransformEngine>,
    limits: ImageLimits,
}

impl UploadService {
    pub fn new(
        images: Arc<dyn ImageRepository>,
        storage: Arc<dyn Storage>,
        engine: Arc<dyn TransformEngine>,
        limits: ImageLimits,
    ) -> Self {
        Self {
            images,
            storage,
            engine,
            limits,
        }
    }

    #[tracing::instrument(skip(self, data, cancel), fields(owner_id = %owner_id, size_bytes = data.len()))]
    pub async fn upload(
        &self,
        owner_id: Uuid,
        filename: &str,
        data: Bytes,
        cancel: &CancellationToken,
    ) -> Result<Image, AppError> {
        if data.is_empty() {
            return Err(AppError::InvalidRequest("Upload is empty".to_string()));
        }
        if data.len() > self.limits.max_upload_size {
            return Err(AppError::PayloadTooLarge(format!(
                "Upload of {} bytes exceeds the {} byte limit",
                data.len(),
                self.limits.max_upload_size
            )));
        }

        checkpoint(cancel, "inspect")?;
        let meta = self.engine.inspect(data.clone()).await?;
        if meta.width > self.limits.max_width || meta.height > self.limits.max_height {
            return Err(AppError::InvalidRequest(format!(
                "Image {}x{} exceeds the {}x{} limit",
                meta.width, meta.height, self.limits.max_width, self.limits.max_height
            )));
        }

        let image_id = Uuid::new_v4();
        let key = original_key(owner_id, image_id);
        let image = Image::new(
            image_id,
            owner_id,
            filename,
            key.clone(),
            data.len() as i64,
            meta.mime_type.clone(),
            meta.width as i32,
            meta.height as i32,
        )?;

        checkpoint(cancel, "store_original")?;
        self.storage
            .put(&key, data, &meta.mime_type)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to store original {}: {}", key, e)))?;

        match self.images.save_image(&image).await {
            Ok(saved) => {
                tracing::info!(image_id = %saved.id, original_key = %saved.original_key, "Image uploaded");
                Ok(saved)
            }
            Err(e) => {
                if let Err(cleanup) = self.storage.delete(&key).await {
                    tracing::warn!(error = %cleanup, key = %key, "Failed to remove orphaned original");
                }
                Err(e)
            }
        }
    }
}

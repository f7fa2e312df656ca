use std::sync::Arc;

use prism_core::{AppError, Image};
use prism_db::ImageRepository;
use serde::Serialize;
use uuid::Uuid;

pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone, Serialize)]
pub struct ImagePage {
    pub items: Vec<Image>,
    pub total: i64,
    pub offset: i64,
    pub limit: i64,
}

#[derive(Clone)]
pub struct ImageQueryService {
    images: Arc<dyn ImageRepository>,
}

impl ImageQueryService {
    pub fn new(images: Arc<dyn ImageRepository>) -> Self {
        Self { images }
    }

    pub async fn get_image(&self, id: Uuid) -> Result<Image, AppError> {
        self.images
            .get_image(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Image {} not found", id)))
    }

    /// Newest first. `limit` is clamped to 1..=100 and a negative offset to 0.
    pub async fn list_images(
        &self,
        owner_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<ImagePage, AppError> {
        let offset = offset.max(0);
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        let (items, total) = self.images.list_images(owner_id, offset, limit).await?;
        Ok(ImagePage {
            items,
            total,
            offset,
            limit,
        })
    }
}

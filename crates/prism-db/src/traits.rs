use async_trait::async_trait;
use prism_core::{AppError, Image, Variant};
use uuid::Uuid;

/// Result of an insert-or-ignore on the variants table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// This caller's row was stored
    Inserted,
    /// A row with the same (image_id, spec_hash) already existed; nothing was written
    Conflict,
}

/// Catalog of uploaded originals
#[async_trait]
pub trait ImageRepository: Send + Sync {
    async fn save_image(&self, image: &Image) -> Result<Image, AppError>;

    /// Image by id, with its variants ordered by creation time
    async fn get_image(&self, id: Uuid) -> Result<Option<Image>, AppError>;

    /// One page of an owner's images, newest first, plus the owner's total count
    async fn list_images(
        &self,
        owner_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<Image>, i64), AppError>;
}

/// Variant lookup and insert-or-ignore creation keyed by (image_id, spec_hash)
#[async_trait]
pub trait VariantStore: Send + Sync {
    async fn find_variant(
        &self,
        image_id: Uuid,
        spec_hash: &str,
    ) -> Result<Option<Variant>, AppError>;

    /// Insert the variant unless one with the same (image_id, spec_hash) exists.
    /// A duplicate is reported as [`InsertOutcome::Conflict`], never as an error.
    async fn create_variant(&self, variant: &Variant) -> Result<InsertOutcome, AppError>;

    async fn list_variants(&self, image_id: Uuid) -> Result<Vec<Variant>, AppError>;
}

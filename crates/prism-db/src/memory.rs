//! In-memory image catalog and variant store
//!
//! Mirrors the Postgres semantics (insert-or-ignore on (image_id, spec_hash),
//! newest-first listing) for tests and single-process setups.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use prism_core::{AppError, Image, Variant};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::traits::{ImageRepository, InsertOutcome, VariantStore};

#[derive(Default)]
struct Catalog {
    images: HashMap<Uuid, Image>,
    variants: HashMap<(Uuid, String), Variant>,
}

/// Clones share the same catalog
#[derive(Clone, Default)]
pub struct InMemoryCatalog {
    inner: Arc<RwLock<Catalog>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn variant_count(&self) -> usize {
        self.inner.read().await.variants.len()
    }

    fn variants_of(catalog: &Catalog, image_id: Uuid) -> Vec<Variant> {
        let mut variants: Vec<Variant> = catalog
            .variants
            .values()
            .filter(|v| v.image_id == image_id)
            .cloned()
            .collect();
        variants.sort_by_key(|v| v.created_at);
        variants
    }
}

#[async_trait]
impl ImageRepository for InMemoryCatalog {
    async fn save_image(&self, image: &Image) -> Result<Image, AppError> {
        let mut catalog = self.inner.write().await;
        if catalog.images.contains_key(&image.id) {
            return Err(AppError::InvalidRequest(format!(
                "Image {} already exists",
                image.id
            )));
        }
        let mut stored = image.clone();
        stored.variants.clear();
        catalog.images.insert(image.id, stored.clone());
        Ok(stored)
    }

    async fn get_image(&self, id: Uuid) -> Result<Option<Image>, AppError> {
        let catalog = self.inner.read().await;
        Ok(catalog.images.get(&id).map(|image| {
            let mut image = image.clone();
            image.variants = Self::variants_of(&catalog, id);
            image
        }))
    }

    async fn list_images(
        &self,
        owner_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<Image>, i64), AppError> {
        let catalog = self.inner.read().await;
        let mut owned: Vec<&Image> = catalog
            .images
            .values()
            .filter(|i| i.owner_id == owner_id)
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = owned.len() as i64;
        let page = owned
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }
}

#[async_trait]
impl VariantStore for InMemoryCatalog {
    async fn find_variant(
        &self,
        image_id: Uuid,
        spec_hash: &str,
    ) -> Result<Option<Variant>, AppError> {
        Ok(self
            .inner
            .read()
            .await
            .variants
            .get(&(image_id, spec_hash.to_string()))
            .cloned())
    }

    async fn create_variant(&self, variant: &Variant) -> Result<InsertOutcome, AppError> {
        let mut catalog = self.inner.write().await;
        if !catalog.images.contains_key(&variant.image_id) {
            return Err(AppError::NotFound(format!(
                "Image {} not found",
                variant.image_id
            )));
        }
        let key = (variant.image_id, variant.spec_hash.clone());
        if catalog.variants.contains_key(&key) {
            return Ok(InsertOutcome::Conflict);
        }
        catalog.variants.insert(key, variant.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn list_variants(&self, image_id: Uuid) -> Result<Vec<Variant>, AppError> {
        Ok(Self::variants_of(&*self.inner.read().await, image_id))
    }
}

use async_trait::async_trait;
use prism_core::{AppError, Image, Variant};
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use crate::traits::ImageRepository;

/// Repository for uploaded originals
#[derive(Clone)]
pub struct PgImageRepository {
    pool: PgPool,
}

impl PgImageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ImageRepository for PgImageRepository {
    #[tracing::instrument(skip(self, image), fields(db.table = "images", db.operation = "insert", db.record_id = %image.id))]
    async fn save_image(&self, image: &Image) -> Result<Image, AppError> {
        let saved = sqlx::query_as::<Postgres, Image>(
            r#"
            INSERT INTO images (id, owner_id, filename, original_key, size, mime_type, width, height, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id, owner_id, filename, original_key, size, mime_type, width, height, created_at
            "#,
        )
        .bind(image.id)
        .bind(image.owner_id)
        .bind(&image.filename)
        .bind(&image.original_key)
        .bind(image.size)
        .bind(&image.mime_type)
        .bind(image.width)
        .bind(image.height)
        .bind(image.created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(saved)
    }

    #[tracing::instrument(skip(self), fields(db.table = "images", db.operation = "select", db.record_id = %id))]
    async fn get_image(&self, id: Uuid) -> Result<Option<Image>, AppError> {
        let image = sqlx::query_as::<Postgres, Image>(
            "SELECT id, owner_id, filename, original_key, size, mime_type, width, height, created_at FROM images WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(mut image) = image else {
            return Ok(None);
        };

        image.variants = sqlx::query_as::<Postgres, Variant>(
            r#"
            SELECT id, image_id, variant_key, spec_hash, size, mime_type, width, height, created_at
            FROM variants
            WHERE image_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(image))
    }

    #[tracing::instrument(skip(self), fields(db.table = "images", db.operation = "select"))]
    async fn list_images(
        &self,
        owner_id: Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<Image>, i64), AppError> {
        let images = sqlx::query_as::<Postgres, Image>(
            r#"
            SELECT id, owner_id, filename, original_key, size, mime_type, width, height, created_at
            FROM images
            WHERE owner_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(owner_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total = sqlx::query_scalar::<Postgres, i64>(
            "SELECT COUNT(*) FROM images WHERE owner_id = $1",
        )
        .bind(owner_id)
        .fetch_one(&self.pool)
        .await?;

        Ok((images, total))
    }
}

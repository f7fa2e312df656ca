use async_trait::async_trait;
use prism_core::{AppError, Variant};
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use crate::traits::{InsertOutcome, VariantStore};

/// Variant store backed by the `variants` table
#[derive(Clone)]
pub struct PgVariantRepository {
    pool: PgPool,
}

impl PgVariantRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VariantStore for PgVariantRepository {
    #[tracing::instrument(skip(self), fields(db.table = "variants", db.operation = "select"))]
    async fn find_variant(
        &self,
        image_id: Uuid,
        spec_hash: &str,
    ) -> Result<Option<Variant>, AppError> {
        let variant = sqlx::query_as::<Postgres, Variant>(
            r#"
            SELECT id, image_id, variant_key, spec_hash, size, mime_type, width, height, created_at
            FROM variants
            WHERE image_id = $1 AND spec_hash = $2
            "#,
        )
        .bind(image_id)
        .bind(spec_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(variant)
    }

    #[tracing::instrument(skip(self, variant), fields(db.table = "variants", db.operation = "insert", image_id = %variant.image_id, spec_hash = %variant.spec_hash))]
    async fn create_variant(&self, variant: &Variant) -> Result<InsertOutcome, AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO variants (id, image_id, variant_key, spec_hash, size, mime_type, width, height, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (image_id, spec_hash) DO NOTHING
            "#,
        )
        .bind(variant.id)
        .bind(variant.image_id)
        .bind(&variant.variant_key)
        .bind(&variant.spec_hash)
        .bind(variant.size)
        .bind(&variant.mime_type)
        .bind(variant.width)
        .bind(variant.height)
        .bind(variant.created_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            tracing::debug!("Variant already exists, insert ignored");
            Ok(InsertOutcome::Conflict)
        } else {
            Ok(InsertOutcome::Inserted)
        }
    }

    #[tracing::instrument(skip(self), fields(db.table = "variants", db.operation = "select", db.record_id = %image_id))]
    async fn list_variants(&self, image_id: Uuid) -> Result<Vec<Variant>, AppError> {
        let variants = sqlx::query_as::<Postgres, Variant>(
            r#"
            SELECT id, image_id, variant_key, spec_hash, size, mime_type, width, height, created_at
            FROM variants
            WHERE image_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(image_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(variants)
    }
}

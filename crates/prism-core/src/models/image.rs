use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// An uploaded original and the variants derived from it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Image {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub filename: String,
    pub original_key: String,
    pub size: i64,
    pub mime_type: String,
    pub width: i32,
    pub height: i32,
    pub created_at: DateTime<Utc>,
    #[cfg_attr(feature = "sqlx", sqlx(skip))]
    #[serde(default)]
    pub variants: Vec<Variant>,
}

impl Image {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: Uuid,
        owner_id: Uuid,
        filename: impl Into<String>,
        original_key: impl Into<String>,
        size: i64,
        mime_type: impl Into<String>,
        width: i32,
        height: i32,
    ) -> Result<Self, AppError> {
        let filename = filename.into();
        let original_key = original_key.into();
        let mime_type = mime_type.into();

        if filename.trim().is_empty() {
            return Err(AppError::InvalidRequest("Filename cannot be empty".to_string()));
        }
        if original_key.is_empty() {
            return Err(AppError::InvalidRequest(
                "Original storage key cannot be empty".to_string(),
            ));
        }
        if mime_type.is_empty() {
            return Err(AppError::InvalidRequest("MIME type cannot be empty".to_string()));
        }
        if size <= 0 {
            return Err(AppError::InvalidRequest(
                "Image size must be positive".to_string(),
            ));
        }

        Ok(Self {
            id,
            owner_id,
            filename,
            original_key,
            size,
            mime_type,
            width,
            height,
            created_at: Utc::now(),
            variants: Vec::new(),
        })
    }
}

/// A derived artifact. At most one exists per (image_id, spec_hash).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Variant {
    pub id: Uuid,
    pub image_id: Uuid,
    pub variant_key: String,
    pub spec_hash: String,
    pub size: i64,
    pub mime_type: String,
    pub width: i32,
    pub height: i32,
    pub created_at: DateTime<Utc>,
}

impl Variant {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        image_id: Uuid,
        variant_key: impl Into<String>,
        spec_hash: impl Into<String>,
        size: i64,
        mime_type: impl Into<String>,
        width: i32,
        height: i32,
    ) -> Result<Self, AppError> {
        let variant_key = variant_key.into();
        let spec_hash = spec_hash.into();

        if variant_key.is_empty() {
            return Err(AppError::InvalidRequest(
                "Variant storage key cannot be empty".to_string(),
            ));
        }
        if spec_hash.is_empty() {
            return Err(AppError::InvalidRequest(
                "Variant spec hash cannot be empty".to_string(),
            ));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            image_id,
            variant_key,
            spec_hash,
            size,
            mime_type: mime_type.into(),
            width,
            height,
            created_at: Utc::now(),
        })
    }
}

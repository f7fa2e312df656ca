use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::AppError;

/// Angles accepted by `rotate`, in degrees clockwise
pub const ALLOWED_ROTATIONS: [u16; 4] = [0, 90, 180, 270];

fn is_false(value: &bool) -> bool {
    !*value
}

fn is_zero(value: &u32) -> bool {
    *value == 0
}

/// Output formats a variant can be encoded to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
    Webp,
    Gif,
}

impl ImageFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::Webp => "image/webp",
            ImageFormat::Gif => "image/gif",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ResizeSpec {
    #[validate(range(min = 1, max = 8000, message = "Resize width must be between 1 and 8000"))]
    pub width: u32,
    #[validate(range(min = 1, max = 8000, message = "Resize height must be between 1 and 8000"))]
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct CropSpec {
    #[validate(range(min = 1, max = 8000, message = "Crop width must be between 1 and 8000"))]
    pub width: u32,
    #[validate(range(min = 1, max = 8000, message = "Crop height must be between 1 and 8000"))]
    pub height: u32,
    #[serde(default)]
    pub x: u32,
    #[serde(default)]
    pub y: u32,
}

/// Watermark descriptor. Part of a variant's identity even though the
/// transformer does not render it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct WatermarkSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image_id: String,
    #[serde(default)]
    #[validate(range(min = 0.0, max = 1.0, message = "Watermark opacity must be between 0 and 1"))]
    pub opacity: f64,
    #[serde(default)]
    pub gravity: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct FilterSpec {
    #[serde(default, skip_serializing_if = "is_false")]
    pub grayscale: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub sepia: bool,
    /// Gaussian blur sigma; 0 disables blurring
    #[serde(default, skip_serializing_if = "is_zero")]
    #[validate(range(max = 100, message = "Blur must be at most 100"))]
    pub blur: u32,
}

impl FilterSpec {
    pub fn is_noop(&self) -> bool {
        !self.grayscale && !self.sepia && self.blur == 0
    }
}

/// Requested operations for a variant.
///
/// Field order is the canonical serialization order and therefore part of every
/// fingerprint already stored: append new fields at the end, never reorder.
/// Unset options and `false` flags are omitted from the serialized form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct TransformationSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub resize: Option<ResizeSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub crop: Option<CropSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotate: Option<u16>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub flip: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub mirror: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub watermark: Option<WatermarkSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1, max = 100, message = "Quality must be between 1 and 100"))]
    pub quality: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<ImageFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub filters: Option<FilterSpec>,
}

impl TransformationSpec {
    /// Parse a spec from JSON and validate it
    pub fn from_json(json: &str) -> Result<Self, AppError> {
        let spec: TransformationSpec = serde_json::from_str(json)?;
        spec.check()?;
        Ok(spec)
    }

    /// Validate field ranges and the rotation angle
    pub fn check(&self) -> Result<(), AppError> {
        self.validate()?;

        if let Some(angle) = self.rotate {
            if !ALLOWED_ROTATIONS.contains(&angle) {
                return Err(AppError::InvalidRequest(format!(
                    "Rotation must be one of 0, 90, 180, 270 (got {})",
                    angle
                )));
            }
        }

        Ok(())
    }

    /// Canonical serialization used for fingerprinting
    pub fn canonical_json(&self) -> Result<String, AppError> {
        serde_json::to_string(self).map_err(|e| {
            AppError::InvalidRequest(format!("Failed to serialize transformation spec: {}", e))
        })
    }
}

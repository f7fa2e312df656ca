use async_trait::async_trait;
use bytes::Bytes;
use prism_core::{AppError, TransformationSpec};

/// Encoded result of a transformation
#[derive(Debug, Clone)]
pub struct ProcessedImage {
    pub data: Bytes,
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
    pub size: usize,
}

/// Header-level facts about an encoded image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageMetadata {
    pub width: u32,
    pub height: u32,
    pub mime_type: String,
    pub size: usize,
}

#[async_trait]
pub trait TransformEngine: Send + Sync {
    /// Apply `spec` to `source`. Failures are reported as
    /// [`AppError::TransformationFailed`].
    async fn transform(
        &self,
        source: Bytes,
        spec: &TransformationSpec,
    ) -> Result<ProcessedImage, AppError>;

    /// Read dimensions and format without transforming
    async fn inspect(&self, data: Bytes) -> Result<ImageMetadata, AppError>;
}

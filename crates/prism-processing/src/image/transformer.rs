//! Image transformer - applies a `TransformationSpec` to encoded source bytes
//!
//! Operations run in a fixed order:
//! 1. Crop (must lie inside the source)
//! 2. Resize to the exact box (Lanczos3)
//! 3. Rotate
//! 4. Flip (vertical), then mirror (horizontal)
//! 5. Filters (blur, grayscale, sepia)
//! 6. Encode to the requested format, else the source format, else JPEG
//!
//! Watermark settings take part in the fingerprint only; nothing is drawn.

use std::io::Cursor;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageReader, Limits};
use prism_core::{AppError, ImageFormat, ImageLimits, TransformationSpec};

use crate::compression;
use crate::engine::{ImageMetadata, ProcessedImage, TransformEngine};
use crate::image::filters::ImageFilters;
use crate::image::orientation::ImageOrientation;

#[derive(Clone, Default)]
pub struct ImageTransformer {
    limits: ImageLimits,
}

impl ImageTransformer {
    pub fn new(limits: ImageLimits) -> Self {
        Self { limits }
    }

    fn reader<'a>(&self, data: &'a [u8]) -> Result<ImageReader<Cursor<&'a [u8]>>> {
        let mut reader = ImageReader::new(Cursor::new(data))
            .with_guessed_format()
            .context("Failed to read image header")?;

        let mut limits = Limits::default();
        limits.max_image_width = Some(self.limits.max_width);
        limits.max_image_height = Some(self.limits.max_height);
        reader.limits(limits);

        Ok(reader)
    }

    fn source_format(reader: &ImageReader<Cursor<&[u8]>>) -> Option<ImageFormat> {
        match reader.format()? {
            image::ImageFormat::Jpeg => Some(ImageFormat::Jpeg),
            image::ImageFormat::Png => Some(ImageFormat::Png),
            image::ImageFormat::WebP => Some(ImageFormat::Webp),
            image::ImageFormat::Gif => Some(ImageFormat::Gif),
            _ => None,
        }
    }

    fn check_bounds(&self, label: &str, width: u32, height: u32) -> Result<()> {
        if width > self.limits.max_width || height > self.limits.max_height {
            bail!(
                "{} {}x{} exceeds the {}x{} limit",
                label,
                width,
                height,
                self.limits.max_width,
                self.limits.max_height
            );
        }
        Ok(())
    }

    /// Synchronous pipeline; callers on the async runtime go through [`TransformEngine`]
    pub fn transform_blocking(
        &self,
        data: &[u8],
        spec: &TransformationSpec,
    ) -> Result<ProcessedImage> {
        let reader = self.reader(data)?;
        let source_format = Self::source_format(&reader);
        let mut img = reader.decode().context("Failed to decode source image")?;

        if let Some(ref crop) = spec.crop {
            let (src_w, src_h) = img.dimensions();
            let fits = crop.x.checked_add(crop.width).is_some_and(|r| r <= src_w)
                && crop.y.checked_add(crop.height).is_some_and(|b| b <= src_h);
            if !fits {
                bail!(
                    "Crop {}x{}+{}+{} lies outside the {}x{} source",
                    crop.width,
                    crop.height,
                    crop.x,
                    crop.y,
                    src_w,
                    src_h
                );
            }
            tracing::debug!(width = crop.width, height = crop.height, x = crop.x, y = crop.y, "Applying crop");
            img = img.crop_imm(crop.x, crop.y, crop.width, crop.height);
        }

        if let Some(ref resize) = spec.resize {
            self.check_bounds("Resize", resize.width, resize.height)?;
            tracing::debug!(width = resize.width, height = resize.height, "Applying resize");
            img = img.resize_exact(resize.width, resize.height, FilterType::Lanczos3);
        }

        if let Some(angle) = spec.rotate {
            img = ImageOrientation::rotate_by_angle(img, angle);
        }
        if spec.flip {
            img = ImageOrientation::flip(img);
        }
        if spec.mirror {
            img = ImageOrientation::mirror(img);
        }

        if let Some(ref filters) = spec.filters {
            if !filters.is_noop() {
                img = ImageFilters::apply(img, filters);
            }
        }

        let output_format = spec
            .format
            .or(source_format)
            .unwrap_or(ImageFormat::Jpeg);

        let (width, height) = img.dimensions();
        let data = compression::encode(&img, output_format, spec.quality)
            .with_context(|| format!("Failed to encode {:?} output", output_format))?;

        tracing::debug!(
            output_format = ?output_format,
            width,
            height,
            size_bytes = data.len(),
            "Transformation complete"
        );

        Ok(ProcessedImage {
            size: data.len(),
            data,
            mime_type: output_format.mime_type().to_string(),
            width,
            height,
        })
    }

    pub fn inspect_blocking(&self, data: &[u8]) -> Result<ImageMetadata> {
        let reader = self.reader(data)?;
        let Some(format) = Self::source_format(&reader) else {
            bail!("Unsupported or unrecognized image format");
        };
        let (width, height) = reader
            .into_dimensions()
            .context("Failed to read image dimensions")?;

        Ok(ImageMetadata {
            width,
            height,
            mime_type: format.mime_type().to_string(),
            size: data.len(),
        })
    }
}

#[async_trait]
impl TransformEngine for ImageTransformer {
    async fn transform(
        &self,
        source: Bytes,
        spec: &TransformationSpec,
    ) -> Result<ProcessedImage, AppError> {
        let engine = self.clone();
        let spec = spec.clone();
        let result = tokio::task::spawn_blocking(move || engine.transform_blocking(&source, &spec))
            .await
            .map_err(|e| AppError::Internal(format!("Transform task failed: {}", e)))?;

        result.map_err(|e| AppError::TransformationFailed(format!("{:#}", e)))
    }

    async fn inspect(&self, data: Bytes) -> Result<ImageMetadata, AppError> {
        let engine = self.clone();
        let result = tokio::task::spawn_blocking(move || engine.inspect_blocking(&data))
            .await
            .map_err(|e| AppError::Internal(format!("Inspect task failed: {}", e)))?;

        result.map_err(|e| AppError::InvalidRequest(format!("{:#}", e)))
    }
}

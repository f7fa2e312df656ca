//! Output encoding

use anyhow::Result;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GenericImageView};
use prism_core::ImageFormat;
use std::io::Cursor;

/// Quality used for JPEG and WebP when the spec sets none
pub const DEFAULT_QUALITY: u8 = 85;

/// Largest width or height libwebp can encode
pub const WEBP_MAX_DIMENSION: u32 = 16383;

/// Encode `img` to `format`. `quality` is honoured by JPEG and WebP only.
pub fn encode(img: &DynamicImage, format: ImageFormat, quality: Option<u8>) -> Result<Bytes> {
    let quality = quality.unwrap_or(DEFAULT_QUALITY).clamp(1, 100);
    match format {
        ImageFormat::Jpeg => encode_jpeg(img, quality),
        ImageFormat::Png => encode_with(img, image::ImageFormat::Png),
        ImageFormat::Webp => encode_webp(img, quality),
        ImageFormat::Gif => {
            // The GIF encoder wants RGBA input
            let rgba = DynamicImage::ImageRgba8(img.to_rgba8());
            encode_with(&rgba, image::ImageFormat::Gif)
        }
    }
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Bytes> {
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let (width, height) = rgb.dimensions();
    let mut buffer = Vec::with_capacity(jpeg_capacity(width, height));
    let encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
    rgb.write_with_encoder(encoder)?;
    Ok(Bytes::from(buffer))
}

/// Initial buffer guess: a quarter byte per pixel. Computed in usize so large
/// sides do not overflow.
fn jpeg_capacity(width: u32, height: u32) -> usize {
    (width as usize) * (height as usize) / 4
}

fn encode_webp(img: &DynamicImage, quality: u8) -> Result<Bytes> {
    let (width, height) = img.dimensions();
    if width > WEBP_MAX_DIMENSION || height > WEBP_MAX_DIMENSION {
        anyhow::bail!(
            "{}x{} exceeds the WebP limit of {} pixels per side",
            width,
            height,
            WEBP_MAX_DIMENSION
        );
    }
    let rgba = img.to_rgba8();
    let encoder = webp::Encoder::from_rgba(&rgba, width, height);
    let webp_data = encoder.encode(quality as f32);
    Ok(Bytes::copy_from_slice(&webp_data))
}

fn encode_with(img: &DynamicImage, format: image::ImageFormat) -> Result<Bytes> {
    let mut buffer = Vec::new();
    img.write_to(&mut Cursor::new(&mut buffer), format)?;
    Ok(Bytes::from(buffer))
}

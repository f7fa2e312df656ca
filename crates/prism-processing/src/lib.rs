//! Prism image processing
//!
//! The [`TransformEngine`] trait is the boundary the pipeline talks to: source
//! bytes and a spec in, an encoded image out, or a single error with no partial
//! output. [`ImageTransformer`] implements it with `image`, `imageproc` and `webp`.

pub mod compression;
pub mod engine;
pub mod image;

pub use compression::{encode, DEFAULT_QUALITY};
pub use engine::{ImageMetadata, ProcessedImage, TransformEngine};
pub use crate::image::ImageTransformer;

mod image;
mod job;
mod spec;

pub use image::{Image, Variant};
pub use job::TransformJob;
pub use spec::{
    CropSpec, FilterSpec, ImageFormat, ResizeSpec, TransformationSpec, WatermarkSpec,
    ALLOWED_ROTATIONS,
};

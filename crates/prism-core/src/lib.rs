//! Prism Core Library
//!
//! Domain models, the transformation fingerprint, error types and configuration
//! shared by every Prism component.

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod job_error;
pub mod models;
pub mod storage_types;

// Re-export commonly used types
pub use config::{Config, ImageLimits, PrismConfig, QueueConfig};
pub use error::{AppError, ErrorCategory, ErrorMetadata, LogLevel};
pub use fingerprint::fingerprint;
pub use job_error::JobError;
pub use models::{
    CropSpec, FilterSpec, Image, ImageFormat, ResizeSpec, TransformJob, TransformationSpec,
    Variant, WatermarkSpec,
};
pub use storage_types::StorageBackend;

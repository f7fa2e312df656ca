//! Prism use cases
//!
//! [`TransformService`] runs the variant pipeline inline, [`TransformPublisher`]
//! hands it to the job queue, and the worker drains the queue through the same
//! [`VariantPipeline`]. Upload and read use cases sit alongside.

pub mod metrics;
pub mod pipeline;
pub mod publisher;
pub mod query;
pub mod transform;
pub mod upload;

pub use metrics::{PipelineMetrics, TransformMode};
pub use pipeline::{checkpoint, EnsuredVariant, VariantPipeline, VariantSource};
pub use publisher::TransformPublisher;
pub use query::{ImagePage, ImageQueryService, MAX_PAGE_SIZE};
pub use transform::{TransformOutput, TransformService};
pub use upload::UploadService;

pub mod filters;
pub mod orientation;
pub mod transformer;

pub use filters::ImageFilters;
pub use orientation::ImageOrientation;
pub use transformer::ImageTransformer;

//! Prism Storage Library
//!
//! Object store abstraction used for original images and their variants, with
//! local filesystem, S3-compatible and in-memory backends.
//!
//! # Storage key format
//!
//! All backends share one key layout (see the `keys` module):
//!
//! - **Originals**: `users/{owner_id}/images/{image_id}/original`
//! - **Variants**: `variants/{image_id}/{spec_hash}{ext}`, where the extension is
//!   derived from the variant's MIME type
//!
//! Variant keys are a pure function of image and fingerprint, so retries and racing
//! producers always write the same object. Keys must not contain `..` or a leading `/`.

pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
pub mod memory;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use factory::create_storage;
pub use keys::{extension_for_mime, original_key, variant_key};
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
pub use memory::MemoryStorage;
pub use prism_core::StorageBackend;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{Storage, StorageError, StorageResult};

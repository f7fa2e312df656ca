//! Database repositories for images and variants
//!
//! The variant store is the only synchronization point of the pipeline: the
//! `UNIQUE (image_id, spec_hash)` constraint decides which of several racing
//! producers owns a variant. Callers that lose get [`InsertOutcome::Conflict`]
//! and re-read the winning row.

pub mod images;
pub mod memory;
pub mod pool;
pub mod traits;
pub mod variants;

pub use images::PgImageRepository;
pub use memory::InMemoryCatalog;
pub use pool::{connect, run_migrations};
pub use traits::{ImageRepository, InsertOutcome, VariantStore};
pub use variants::PgVariantRepository;

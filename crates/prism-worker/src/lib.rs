//! Transform job consumer
//!
//! [`TransformWorker`] claims messages from a [`prism_queue::JobQueue`] and runs
//! each through the same variant pipeline as the synchronous path. Delivery is
//! at-least-once; redelivered jobs resolve through the variant store.

pub mod consumer;
pub mod telemetry;

pub use consumer::{JobOutcome, TransformWorker, WorkerConfig};
pub use telemetry::init_tracing;

//! Durable job queue for asynchronous transformations
//!
//! Delivery is at-least-once with manual acknowledgment. A nacked message is
//! either requeued or moved to the dead-letter state; dead messages are never
//! delivered again.

pub mod memory;
pub mod postgres;
pub mod traits;

pub use memory::MemoryJobQueue;
pub use postgres::{PgJobQueue, NOTIFY_CHANNEL};
pub use traits::{Delivery, JobQueue, JobState, JobStatus, NackOutcome, QueueError};

/// Requeue delay for a message delivered `delivery_count` times: 2^n seconds, capped
pub fn compute_retry_backoff_seconds(delivery_count: i32, max_backoff_secs: u64) -> u64 {
    let exponent = delivery_count.clamp(0, 32) as u32;
    2_u64.saturating_pow(exponent).min(max_backoff_secs)
}

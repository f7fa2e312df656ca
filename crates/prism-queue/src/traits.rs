use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use prism_core::{AppError, TransformJob};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Failed to encode job: {0}")]
    Encode(String),

    #[error("Unknown delivery tag {0}")]
    UnknownDelivery(i64),

    #[error("Corrupt queue row: {0}")]
    Corrupt(String),
}

impl From<QueueError> for AppError {
    fn from(err: QueueError) -> Self {
        AppError::Queue(err.to_string())
    }
}

/// A claimed message. It stays invisible to other consumers until it is acked,
/// nacked, or its visibility timeout expires.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub tag: i64,
    pub payload: Bytes,
    /// Number of times this message has been handed out, this delivery included
    pub delivery_count: i32,
    pub job_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NackOutcome {
    Requeued,
    DeadLettered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InFlight,
    Acked,
    Dead,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::InFlight => "in_flight",
            JobStatus::Acked => "acked",
            JobStatus::Dead => "dead",
        }
    }
}

impl Display for JobStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "in_flight" => Ok(JobStatus::InFlight),
            "acked" => Ok(JobStatus::Acked),
            "dead" => Ok(JobStatus::Dead),
            other => Err(QueueError::Corrupt(format!("unknown status '{}'", other))),
        }
    }
}

/// Queue-side view of a published job
#[derive(Debug, Clone, Serialize)]
pub struct JobState {
    pub job_id: String,
    pub status: JobStatus,
    pub delivery_count: i32,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn publish(&self, job: &TransformJob) -> Result<(), QueueError>;

    /// Publish an already encoded payload as-is
    async fn publish_raw(&self, payload: Bytes) -> Result<(), QueueError>;

    /// Claim the next deliverable message without waiting
    async fn receive(&self) -> Result<Option<Delivery>, QueueError>;

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError>;

    /// Reject a delivery. With `requeue` the message becomes deliverable again
    /// unless it has reached the redelivery limit, in which case it is dead-lettered.
    async fn nack(
        &self,
        delivery: &Delivery,
        requeue: bool,
        reason: &str,
    ) -> Result<NackOutcome, QueueError>;

    async fn job_status(&self, job_id: &str) -> Result<Option<JobState>, QueueError>;
}

/// Job id recorded next to the payload; jobs published without one are untracked
pub(crate) fn tracked_job_id(job: &TransformJob) -> Option<String> {
    (!job.job_id.is_empty()).then(|| job.job_id.clone())
}

pub(crate) fn encode_job(job: &TransformJob) -> Result<Bytes, QueueError> {
    job.encode()
        .map(Bytes::from)
        .map_err(|e| QueueError::Encode(e.to_string()))
}

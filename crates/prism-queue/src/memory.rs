//! In-process queue with the same ack/nack/dead-letter semantics as the
//! Postgres queue. Requeued messages go to the back of the line at once.
//!
//! Settled (acked or dead) messages stay queryable through `job_status` until
//! `retention` newer messages have settled; older ones are dropped.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use prism_core::TransformJob;
use tokio::sync::Mutex;

use crate::traits::{
    encode_job, tracked_job_id, Delivery, JobQueue, JobState, JobStatus, NackOutcome, QueueError,
};

/// Settled messages kept for status lookups
pub const DEFAULT_SETTLED_RETENTION: usize = 1024;

struct Message {
    job_id: Option<String>,
    payload: Bytes,
    status: JobStatus,
    delivery_count: i32,
    last_error: Option<String>,
    updated_at: DateTime<Utc>,
}

#[derive(Default)]
struct QueueState {
    next_tag: i64,
    messages: HashMap<i64, Message>,
    ready: VecDeque<i64>,
    settled: VecDeque<i64>,
}

impl QueueState {
    /// The in-flight message a delivery refers to. A delivery from an earlier
    /// claim of the same message does not match.
    fn claimed(&mut self, delivery: &Delivery) -> Result<&mut Message, QueueError> {
        self.messages
            .get_mut(&delivery.tag)
            .filter(|m| m.status == JobStatus::InFlight && m.delivery_count == delivery.delivery_count)
            .ok_or(QueueError::UnknownDelivery(delivery.tag))
    }

    fn settle(&mut self, tag: i64, retention: usize) {
        self.settled.push_back(tag);
        while self.settled.len() > retention {
            if let Some(expired) = self.settled.pop_front() {
                self.messages.remove(&expired);
            }
        }
    }
}

#[derive(Clone)]
pub struct MemoryJobQueue {
    state: Arc<Mutex<QueueState>>,
    max_redeliveries: i32,
    retention: usize,
}

impl MemoryJobQueue {
    pub fn new(max_redeliveries: i32) -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState::default())),
            max_redeliveries,
            retention: DEFAULT_SETTLED_RETENTION,
        }
    }

    /// Keep at most `retention` settled messages
    pub fn with_retention(mut self, retention: usize) -> Self {
        self.retention = retention;
        self
    }

    /// Messages waiting for delivery
    pub async fn pending_count(&self) -> usize {
        self.state.lock().await.ready.len()
    }

    /// Messages currently held, settled ones within the retention included
    pub async fn len(&self) -> usize {
        self.state.lock().await.messages.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn count_with_status(&self, status: JobStatus) -> usize {
        self.state
            .lock()
            .await
            .messages
            .values()
            .filter(|m| m.status == status)
            .count()
    }

    /// Reasons recorded for retained dead-lettered messages, oldest first
    pub async fn dead_letters(&self) -> Vec<String> {
        let state = self.state.lock().await;
        let mut dead: Vec<(&i64, &Message)> = state
            .messages
            .iter()
            .filter(|(_, m)| m.status == JobStatus::Dead)
            .collect();
        dead.sort_by_key(|(tag, _)| **tag);
        dead.into_iter()
            .map(|(_, m)| m.last_error.clone().unwrap_or_default())
            .collect()
    }

    async fn push(&self, job_id: Option<String>, payload: Bytes) {
        let mut state = self.state.lock().await;
        state.next_tag += 1;
        let tag = state.next_tag;
        state.messages.insert(
            tag,
            Message {
                job_id,
                payload,
                status: JobStatus::Pending,
                delivery_count: 0,
                last_error: None,
                updated_at: Utc::now(),
            },
        );
        state.ready.push_back(tag);
    }
}

impl Default for MemoryJobQueue {
    fn default() -> Self {
        Self::new(prism_core::QueueConfig::default().max_redeliveries)
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn publish(&self, job: &TransformJob) -> Result<(), QueueError> {
        let payload = encode_job(job)?;
        self.push(tracked_job_id(job), payload).await;
        Ok(())
    }

    async fn publish_raw(&self, payload: Bytes) -> Result<(), QueueError> {
        self.push(None, payload).await;
        Ok(())
    }

    async fn receive(&self) -> Result<Option<Delivery>, QueueError> {
        let mut state = self.state.lock().await;
        let Some(tag) = state.ready.pop_front() else {
            return Ok(None);
        };
        let message = state
            .messages
            .get_mut(&tag)
            .ok_or(QueueError::UnknownDelivery(tag))?;

        message.status = JobStatus::InFlight;
        message.delivery_count += 1;
        message.updated_at = Utc::now();

        Ok(Some(Delivery {
            tag,
            payload: message.payload.clone(),
            delivery_count: message.delivery_count,
            job_id: message.job_id.clone(),
        }))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        let message = state.claimed(delivery)?;
        message.status = JobStatus::Acked;
        message.last_error = None;
        message.updated_at = Utc::now();
        state.settle(delivery.tag, self.retention);
        Ok(())
    }

    async fn nack(
        &self,
        delivery: &Delivery,
        requeue: bool,
        reason: &str,
    ) -> Result<NackOutcome, QueueError> {
        let mut state = self.state.lock().await;
        let message = state.claimed(delivery)?;

        message.last_error = Some(reason.to_string());
        message.updated_at = Utc::now();

        if !requeue || message.delivery_count >= self.max_redeliveries {
            message.status = JobStatus::Dead;
            state.settle(delivery.tag, self.retention);
            return Ok(NackOutcome::DeadLettered);
        }

        message.status = JobStatus::Pending;
        state.ready.push_back(delivery.tag);
        Ok(NackOutcome::Requeued)
    }

    async fn job_status(&self, job_id: &str) -> Result<Option<JobState>, QueueError> {
        let state = self.state.lock().await;
        Ok(state
            .messages
            .iter()
            .filter(|(_, m)| m.job_id.as_deref() == Some(job_id))
            .max_by_key(|(tag, _)| **tag)
            .map(|(_, m)| JobState {
                job_id: job_id.to_string(),
                status: m.status,
                delivery_count: m.delivery_count,
                last_error: m.last_error.clone(),
                updated_at: m.updated_at,
            }))
    }
}

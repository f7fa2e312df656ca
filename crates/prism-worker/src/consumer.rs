//! Worker pool: LISTEN/NOTIFY or polling, bounded prefetch, ack/nack.
//!
//! Shutdown: [`TransformWorker::shutdown`] stops claiming and [`TransformWorker::run`]
//! returns once every in-flight job has been acked or nacked.
//! [`TransformWorker::abort`] additionally cancels in-flight jobs at their next
//! step boundary; they are requeued.

use std::sync::Arc;
use std::time::{Duration, Instant};

use prism_core::{JobError, QueueConfig, TransformJob};
use prism_queue::{Delivery, JobQueue, NackOutcome, QueueError, NOTIFY_CHANNEL};
use prism_services::{PipelineMetrics, VariantPipeline};
use tokio::sync::{mpsc, Semaphore};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

const LISTENER_RETRY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Max jobs in flight at once
    pub prefetch: usize,
    pub poll_interval_ms: u64,
}

impl From<&QueueConfig> for WorkerConfig {
    fn from(config: &QueueConfig) -> Self {
        Self {
            prefetch: config.prefetch_count.max(1),
            poll_interval_ms: config.poll_interval_ms,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self::from(&QueueConfig::default())
    }
}

/// What happened to one delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Acked,
    Requeued,
    DeadLettered,
    /// Payload could not be decoded and was dropped without retry
    Discarded,
}

impl JobOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobOutcome::Acked => "acked",
            JobOutcome::Requeued => "requeued",
            JobOutcome::DeadLettered => "dead_lettered",
            JobOutcome::Discarded => "discarded",
        }
    }
}

#[derive(Clone)]
pub struct TransformWorker {
    handler: JobHandler,
    config: WorkerConfig,
    listener_pool: Option<sqlx::PgPool>,
    shutdown: CancellationToken,
}

impl TransformWorker {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        pipeline: VariantPipeline,
        config: WorkerConfig,
        metrics: PipelineMetrics,
    ) -> Self {
        Self {
            handler: JobHandler {
                queue,
                pipeline,
                metrics,
                cancel: CancellationToken::new(),
            },
            config,
            listener_pool: None,
            shutdown: CancellationToken::new(),
        }
    }

    /// Wake up on Postgres NOTIFY in addition to the poll timer
    pub fn with_listener(mut self, pool: sqlx::PgPool) -> Self {
        self.listener_pool = Some(pool);
        self
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stop claiming new messages
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Stop claiming and cancel in-flight jobs between steps
    pub fn abort(&self) {
        self.shutdown.cancel();
        self.handler.cancel.cancel();
    }

    /// Claim and handle at most one message inline. `None` when the queue is empty.
    pub async fn process_next(&self) -> Result<Option<JobOutcome>, QueueError> {
        match self.handler.queue.receive().await? {
            Some(delivery) => self.handler.handle(delivery).await.map(Some),
            None => Ok(None),
        }
    }

    pub async fn run(&self) {
        let use_listen = self.listener_pool.is_some();
        tracing::info!(
            prefetch = self.config.prefetch,
            poll_interval_ms = self.config.poll_interval_ms,
            listen_notify = use_listen,
            "Transform worker started"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.prefetch));
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);

        // The sender stays alive for the whole loop so recv() pends instead of
        // returning None when there is no listener.
        let (notify_tx, mut notify_rx) = mpsc::channel::<()>(16);
        let listener = self
            .listener_pool
            .clone()
            .map(|pool| tokio::spawn(listen_for_jobs(pool, notify_tx.clone(), self.shutdown.clone())));

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!("Transform worker shutting down");
                    break;
                }
                _ = notify_rx.recv() => self.claim_and_dispatch(&semaphore).await,
                _ = sleep(poll_interval) => self.claim_and_dispatch(&semaphore).await,
            }
        }

        drop(notify_tx);
        if let Some(listener) = listener {
            listener.abort();
        }

        // Every running job holds a permit
        let in_flight = self.config.prefetch - semaphore.available_permits();
        if in_flight > 0 {
            tracing::info!(in_flight = in_flight, "Waiting for in-flight jobs");
        }
        let _all = semaphore.acquire_many(self.config.prefetch as u32).await;

        tracing::info!("Transform worker stopped");
    }

    /// Claim until the queue is empty or every permit is taken
    async fn claim_and_dispatch(&self, semaphore: &Arc<Semaphore>) {
        while !self.shutdown.is_cancelled() {
            let permit = match semaphore.clone().try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    tracing::debug!("No free slots, skipping claim");
                    return;
                }
            };

            match self.handler.queue.receive().await {
                Ok(Some(delivery)) => {
                    let handler = self.handler.clone();
                    tokio::spawn(async move {
                        let _permit = permit;
                        if let Err(e) = handler.handle(delivery).await {
                            tracing::error!(error = %e, "Failed to settle delivery");
                        }
                    });
                }
                Ok(None) => {
                    tracing::trace!("No jobs available in queue");
                    return;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to claim job from queue");
                    return;
                }
            }
        }
    }
}

async fn listen_for_jobs(pool: sqlx::PgPool, tx: mpsc::Sender<()>, shutdown: CancellationToken) {
    while !shutdown.is_cancelled() {
        match sqlx::postgres::PgListener::connect_with(&pool).await {
            Ok(mut listener) => {
                if let Err(e) = listener.listen(NOTIFY_CHANNEL).await {
                    tracing::warn!(error = %e, "LISTEN failed, will retry");
                    sleep(LISTENER_RETRY).await;
                    continue;
                }
                while listener.recv().await.is_ok() {
                    let _ = tx.try_send(());
                }
                tracing::warn!("LISTEN connection lost, reconnecting");
            }
            Err(e) => {
                tracing::warn!(error = %e, "PgListener connect failed, will retry");
                sleep(LISTENER_RETRY).await;
            }
        }
    }
}

#[derive(Clone)]
struct JobHandler {
    queue: Arc<dyn JobQueue>,
    pipeline: VariantPipeline,
    metrics: PipelineMetrics,
    cancel: CancellationToken,
}

impl JobHandler {
    async fn handle(&self, delivery: Delivery) -> Result<JobOutcome, QueueError> {
        self.metrics.record_job_started();
        let result = self.settle(delivery).await;
        self.metrics.record_job_finished(match &result {
            Ok(outcome) => outcome.as_str(),
            Err(_) => "settle_failed",
        });
        result
    }

    async fn settle(&self, delivery: Delivery) -> Result<JobOutcome, QueueError> {
        let job = match TransformJob::decode(&delivery.payload) {
            Ok(job) => job,
            Err(e) => {
                tracing::error!(
                    delivery_tag = delivery.tag,
                    error = %e,
                    data_loss = true,
                    "Discarding malformed transform job"
                );
                self.queue
                    .nack(&delivery, false, &format!("malformed payload: {}", e))
                    .await?;
                return Ok(JobOutcome::Discarded);
            }
        };

        self.execute(&job, &delivery).await
    }

    #[tracing::instrument(
        skip(self, job, delivery),
        fields(job_id = %job.job_id, image_id = %job.image_id, delivery_count = delivery.delivery_count)
    )]
    async fn execute(&self, job: &TransformJob, delivery: &Delivery) -> Result<JobOutcome, QueueError> {
        let start = Instant::now();

        match self.pipeline.run_job(job, &self.cancel).await {
            Ok(ensured) => {
                self.queue.ack(delivery).await?;
                tracing::info!(
                    variant_id = %ensured.variant.id,
                    source = ?ensured.source,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Transform job completed"
                );
                Ok(JobOutcome::Acked)
            }
            Err(e) => {
                let err = JobError::from(e);
                let reason = err.to_string();
                let requeue = err.is_recoverable();

                match self.queue.nack(delivery, requeue, &reason).await? {
                    NackOutcome::Requeued => {
                        tracing::warn!(error = %reason, "Transform job failed, requeued");
                        Ok(JobOutcome::Requeued)
                    }
                    NackOutcome::DeadLettered => {
                        tracing::error!(
                            error = %reason,
                            recoverable = requeue,
                            "Transform job failed, dead-lettered"
                        );
                        Ok(JobOutcome::DeadLettered)
                    }
                }
            }
        }
    }
}

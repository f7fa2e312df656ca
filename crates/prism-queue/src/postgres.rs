use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use prism_core::{QueueConfig, TransformJob};
use sqlx::{PgPool, Postgres};

use crate::compute_retry_backoff_seconds;
use crate::traits::{
    encode_job, tracked_job_id, Delivery, JobQueue, JobState, JobStatus, NackOutcome, QueueError,
};

/// LISTEN/NOTIFY channel signalled on every publish. The payload is the queue name.
pub const NOTIFY_CHANNEL: &str = "prism_transform_jobs";

#[derive(sqlx::FromRow)]
struct ClaimedRow {
    id: i64,
    job_id: Option<String>,
    payload: Vec<u8>,
    delivery_count: i32,
}

#[derive(sqlx::FromRow)]
struct StatusRow {
    job_id: String,
    status: String,
    delivery_count: i32,
    last_error: Option<String>,
    updated_at: DateTime<Utc>,
}

/// Queue stored in the `transform_jobs` table, partitioned by queue name
#[derive(Clone)]
pub struct PgJobQueue {
    pool: PgPool,
    queue_name: String,
    max_redeliveries: i32,
    visibility_timeout_secs: i64,
    retry_backoff_max_secs: u64,
}

impl PgJobQueue {
    pub fn new(pool: PgPool, config: &QueueConfig) -> Self {
        Self {
            pool,
            queue_name: config.name.clone(),
            max_redeliveries: config.max_redeliveries,
            visibility_timeout_secs: config.visibility_timeout_secs,
            retry_backoff_max_secs: config.retry_backoff_max_secs,
        }
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    async fn insert(&self, job_id: Option<String>, payload: &[u8]) -> Result<i64, QueueError> {
        let mut tx = self.pool.begin().await?;

        let id = sqlx::query_scalar::<Postgres, i64>(
            r#"
            INSERT INTO transform_jobs (queue_name, job_id, payload)
            VALUES ($1, $2, $3)
            RETURNING id
            "#,
        )
        .bind(&self.queue_name)
        .bind(job_id)
        .bind(payload)
        .fetch_one(&mut *tx)
        .await?;

        // Delivered to listeners on commit
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(NOTIFY_CHANNEL)
            .bind(&self.queue_name)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(id)
    }
}

#[async_trait]
impl JobQueue for PgJobQueue {
    #[tracing::instrument(skip(self, job), fields(db.table = "transform_jobs", db.operation = "insert", job_id = %job.job_id))]
    async fn publish(&self, job: &TransformJob) -> Result<(), QueueError> {
        let payload = encode_job(job)?;
        let id = self.insert(tracked_job_id(job), &payload).await?;
        tracing::debug!(tag = id, queue = %self.queue_name, "Job published");
        Ok(())
    }

    #[tracing::instrument(skip(self, payload), fields(db.table = "transform_jobs", db.operation = "insert"))]
    async fn publish_raw(&self, payload: Bytes) -> Result<(), QueueError> {
        self.insert(None, &payload).await?;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(db.table = "transform_jobs", db.operation = "claim"))]
    async fn receive(&self) -> Result<Option<Delivery>, QueueError> {
        let mut tx = self.pool.begin().await?;

        // In-flight rows whose lock expired belong to a consumer that died. Once they
        // have used up their deliveries they are dead-lettered instead of handed out again.
        let reaped = sqlx::query(
            r#"
            UPDATE transform_jobs
            SET status = 'dead',
                locked_until = NULL,
                last_error = 'visibility timeout expired on final delivery',
                updated_at = NOW()
            WHERE queue_name = $1
                AND status = 'in_flight'
                AND locked_until < NOW()
                AND delivery_count >= $2
            "#,
        )
        .bind(&self.queue_name)
        .bind(self.max_redeliveries)
        .execute(&mut *tx)
        .await?;

        if reaped.rows_affected() > 0 {
            tracing::warn!(
                count = reaped.rows_affected(),
                queue = %self.queue_name,
                "Dead-lettered abandoned messages"
            );
        }

        let candidate: Option<i64> = sqlx::query_scalar::<Postgres, i64>(
            r#"
            SELECT id
            FROM transform_jobs
            WHERE queue_name = $1
                AND (
                    (status = 'pending' AND available_at <= NOW())
                    OR (status = 'in_flight' AND locked_until < NOW())
                )
            ORDER BY available_at ASC, id ASC
            LIMIT 1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(&self.queue_name)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(id) = candidate else {
            tx.commit().await?;
            return Ok(None);
        };

        let row = sqlx::query_as::<Postgres, ClaimedRow>(
            r#"
            UPDATE transform_jobs
            SET status = 'in_flight',
                delivery_count = delivery_count + 1,
                locked_until = NOW() + make_interval(secs => $2),
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, job_id, payload, delivery_count
            "#,
        )
        .bind(id)
        .bind(self.visibility_timeout_secs as f64)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::debug!(
            tag = row.id,
            delivery_count = row.delivery_count,
            "Message claimed"
        );

        Ok(Some(Delivery {
            tag: row.id,
            payload: Bytes::from(row.payload),
            delivery_count: row.delivery_count,
            job_id: row.job_id,
        }))
    }

    #[tracing::instrument(skip(self, delivery), fields(db.table = "transform_jobs", db.operation = "update", tag = delivery.tag))]
    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let result = sqlx::query(
            r#"
            UPDATE transform_jobs
            SET status = 'acked',
                locked_until = NULL,
                last_error = NULL,
                updated_at = NOW()
            WHERE id = $1 AND status = 'in_flight' AND delivery_count = $2
            "#,
        )
        .bind(delivery.tag)
        .bind(delivery.delivery_count)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            tracing::warn!("Ack for a claim that is no longer current");
            return Err(QueueError::UnknownDelivery(delivery.tag));
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, delivery), fields(db.table = "transform_jobs", db.operation = "update", tag = delivery.tag))]
    async fn nack(
        &self,
        delivery: &Delivery,
        requeue: bool,
        reason: &str,
    ) -> Result<NackOutcome, QueueError> {
        let dead_letter = !requeue || delivery.delivery_count >= self.max_redeliveries;

        let result = if dead_letter {
            sqlx::query(
                r#"
                UPDATE transform_jobs
                SET status = 'dead',
                    locked_until = NULL,
                    last_error = $2,
                    updated_at = NOW()
                WHERE id = $1 AND status = 'in_flight' AND delivery_count = $3
                "#,
            )
            .bind(delivery.tag)
            .bind(reason)
            .bind(delivery.delivery_count)
            .execute(&self.pool)
            .await?
        } else {
            let backoff = compute_retry_backoff_seconds(
                delivery.delivery_count,
                self.retry_backoff_max_secs,
            );
            sqlx::query(
                r#"
                UPDATE transform_jobs
                SET status = 'pending',
                    locked_until = NULL,
                    available_at = NOW() + make_interval(secs => $3),
                    last_error = $2,
                    updated_at = NOW()
                WHERE id = $1 AND status = 'in_flight' AND delivery_count = $4
                "#,
            )
            .bind(delivery.tag)
            .bind(reason)
            .bind(backoff as f64)
            .bind(delivery.delivery_count)
            .execute(&self.pool)
            .await?
        };

        if result.rows_affected() == 0 {
            return Err(QueueError::UnknownDelivery(delivery.tag));
        }

        if dead_letter {
            tracing::warn!(
                delivery_count = delivery.delivery_count,
                reason = %reason,
                "Message dead-lettered"
            );
            Ok(NackOutcome::DeadLettered)
        } else {
            Ok(NackOutcome::Requeued)
        }
    }

    #[tracing::instrument(skip(self), fields(db.table = "transform_jobs", db.operation = "select"))]
    async fn job_status(&self, job_id: &str) -> Result<Option<JobState>, QueueError> {
        let row = sqlx::query_as::<Postgres, StatusRow>(
            r#"
            SELECT job_id, status, delivery_count, last_error, updated_at
            FROM transform_jobs
            WHERE job_id = $1 AND queue_name = $2
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .bind(job_id)
        .bind(&self.queue_name)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(JobState {
            job_id: row.job_id,
            status: row.status.parse::<JobStatus>()?,
            delivery_count: row.delivery_count,
            last_error: row.last_error,
            updated_at: row.updated_at,
        }))
    }
}

//! PostgreSQL implementation of JobStore
//!
//! Production persistence using PostgreSQL with:
//! - Visibility-time scheduling for delayed jobs and retry backoff
//! - Concurrent claiming with SKIP LOCKED
//! - Row-locked failure handling so retries never exceed the attempt budget

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::store::*;
use crate::job::{JobDefinition, JobOptions};

/// PostgreSQL implementation of JobStore
///
/// # Example
///
/// ```ignore
/// use lendwise_durable::PostgresJobStore;
/// use sqlx::PgPool;
///
/// let pool = PgPool::connect("postgres://localhost/lendwise").await?;
/// let store = PostgresJobStore::new(pool);
/// store.migrate().await?;
/// ```
#[derive(Clone)]
pub struct PostgresJobStore {
    pool: PgPool,
}

impl PostgresJobStore {
    /// Create a new PostgreSQL store with the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and run migrations
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url).await.map_err(db_error)?;
        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    /// Apply the job queue schema
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        info!("job queue migrations applied");
        Ok(())
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn db_error(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

fn interval_millis(delay: Duration) -> i64 {
    i64::try_from(delay.as_millis()).unwrap_or(i64::MAX)
}

fn parse_status(s: &str) -> Result<JobStatus, StoreError> {
    s.parse().map_err(StoreError::Serialization)
}

fn row_to_info(row: &PgRow) -> Result<JobInfo, StoreError> {
    let status: String = row.get("status");
    let history: serde_json::Value = row.get("error_history");
    let error_history: Vec<String> =
        serde_json::from_value(history).map_err(|e| StoreError::Serialization(e.to_string()))?;

    Ok(JobInfo {
        id: row.get("id"),
        queue: row.get("queue"),
        job_type: row.get("job_type"),
        payload: row.get("payload"),
        status: parse_status(&status)?,
        attempt: row.get::<i32, _>("attempt") as u32,
        max_attempts: row.get::<i32, _>("max_attempts") as u32,
        last_error: row.get("last_error"),
        error_history,
        output: row.get("output"),
        claimed_by: row.get("claimed_by"),
        enqueued_at: row.get("enqueued_at"),
        visible_at: row.get("visible_at"),
        completed_at: row.get("completed_at"),
    })
}

const JOB_COLUMNS: &str = r#"
    id, queue, job_type, payload, status, attempt, max_attempts, last_error,
    error_history, output, claimed_by, enqueued_at, visible_at, completed_at
"#;

#[async_trait]
impl JobStore for PostgresJobStore {
    #[instrument(skip(self, job), fields(queue = %job.queue, job_type = %job.job_type))]
    async fn enqueue(&self, job: JobDefinition) -> Result<Uuid, StoreError> {
        let id = Uuid::now_v7();
        let options = serde_json::to_value(&job.options)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO lendwise_job_queue
                (id, queue, job_type, payload, options, max_attempts, visible_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW() + ($7 * INTERVAL '1 millisecond'))
            "#,
        )
        .bind(id)
        .bind(&job.queue)
        .bind(&job.job_type)
        .bind(&job.payload)
        .bind(&options)
        .bind(job.max_attempts() as i32)
        .bind(interval_millis(job.delay))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to enqueue job: {}", e);
            db_error(e)
        })?;

        debug!(job_id = %id, delay_ms = job.delay.as_millis() as u64, "enqueued job");
        Ok(id)
    }

    #[instrument(skip(self))]
    async fn claim_jobs(
        &self,
        worker_id: &str,
        queues: &[String],
        max_jobs: usize,
    ) -> Result<Vec<ClaimedJob>, StoreError> {
        if queues.is_empty() || max_jobs == 0 {
            return Ok(vec![]);
        }

        let rows = sqlx::query(
            r#"
            WITH claimable AS (
                SELECT id
                FROM lendwise_job_queue
                WHERE status = 'pending'
                  AND queue = ANY($1)
                  AND visible_at <= NOW()
                ORDER BY visible_at, id
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            UPDATE lendwise_job_queue j
            SET status = 'claimed',
                claimed_by = $3,
                claimed_at = NOW(),
                attempt = attempt + 1
            FROM claimable c
            WHERE j.id = c.id
            RETURNING j.id, j.queue, j.job_type, j.payload, j.options,
                      j.attempt, j.max_attempts
            "#,
        )
        .bind(queues)
        .bind(max_jobs as i64)
        .bind(worker_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to claim jobs: {}", e);
            db_error(e)
        })?;

        let mut claimed = Vec::with_capacity(rows.len());
        for row in rows {
            let options_json: serde_json::Value = row.get("options");
            let options: JobOptions = serde_json::from_value(options_json)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;

            claimed.push(ClaimedJob {
                id: row.get("id"),
                queue: row.get("queue"),
                job_type: row.get("job_type"),
                payload: row.get("payload"),
                options,
                attempt: row.get::<i32, _>("attempt") as u32,
                max_attempts: row.get::<i32, _>("max_attempts") as u32,
            });
        }
        // RETURNING does not preserve the CTE order
        claimed.sort_by_key(|job| job.id);

        if !claimed.is_empty() {
            debug!(worker_id, count = claimed.len(), "claimed jobs");
        }
        Ok(claimed)
    }

    #[instrument(skip(self, output))]
    async fn complete_job(
        &self,
        job_id: Uuid,
        output: serde_json::Value,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE lendwise_job_queue
            SET status = 'completed',
                output = $2,
                claimed_by = NULL,
                completed_at = NOW()
            WHERE id = $1 AND status = 'claimed'
            "#,
        )
        .bind(job_id)
        .bind(&output)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        if result.rows_affected() == 0 {
            let current = self.get_job(job_id).await?;
            return Err(StoreError::InvalidState {
                id: job_id,
                status: current.status,
            });
        }

        debug!(%job_id, "completed job");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn fail_job(&self, job_id: Uuid, error: &str) -> Result<JobFailureOutcome, StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let row = sqlx::query(
            r#"
            SELECT status, attempt, options
            FROM lendwise_job_queue
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(job_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error)?
        .ok_or(StoreError::JobNotFound(job_id))?;

        let status = parse_status(row.get::<String, _>("status").as_str())?;
        if status != JobStatus::Claimed {
            return Err(StoreError::InvalidState { id: job_id, status });
        }

        let attempt = row.get::<i32, _>("attempt") as u32;
        let options: JobOptions = serde_json::from_value(row.get("options"))
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let policy = &options.retry_policy;

        let outcome = if policy.has_attempts_remaining(attempt) {
            let delay = policy.delay_after_attempt(attempt);
            sqlx::query(
                r#"
                UPDATE lendwise_job_queue
                SET status = 'pending',
                    claimed_by = NULL,
                    last_error = $2,
                    error_history = error_history || to_jsonb($2::text),
                    visible_at = NOW() + ($3 * INTERVAL '1 millisecond')
                WHERE id = $1
                "#,
            )
            .bind(job_id)
            .bind(error)
            .bind(interval_millis(delay))
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

            JobFailureOutcome::WillRetry {
                next_attempt: attempt + 1,
                delay,
            }
        } else {
            sqlx::query(
                r#"
                UPDATE lendwise_job_queue
                SET status = 'dead',
                    claimed_by = NULL,
                    last_error = $2,
                    error_history = error_history || to_jsonb($2::text),
                    completed_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(job_id)
            .bind(error)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

            JobFailureOutcome::Exhausted { attempts: attempt }
        };

        tx.commit().await.map_err(db_error)?;
        debug!(%job_id, ?outcome, "failed job");
        Ok(outcome)
    }

    #[instrument(skip(self))]
    async fn reclaim_stale_jobs(&self, stale_threshold: Duration) -> Result<Vec<Uuid>, StoreError> {
        // The abandoned run already counted as an attempt
        let rows = sqlx::query(
            r#"
            UPDATE lendwise_job_queue
            SET status = CASE WHEN attempt >= max_attempts THEN 'dead' ELSE 'pending' END,
                claimed_by = NULL,
                last_error = 'attempt abandoned by worker',
                error_history = error_history || to_jsonb('attempt abandoned by worker'::text),
                visible_at = NOW(),
                completed_at = CASE WHEN attempt >= max_attempts THEN NOW() ELSE NULL END
            WHERE status = 'claimed'
              AND claimed_at < NOW() - ($1 * INTERVAL '1 millisecond')
            RETURNING id
            "#,
        )
        .bind(interval_millis(stale_threshold))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        let ids: Vec<Uuid> = rows.iter().map(|row| row.get("id")).collect();
        if !ids.is_empty() {
            warn!(count = ids.len(), "reclaimed stale jobs");
        }
        Ok(ids)
    }

    #[instrument(skip(self))]
    async fn purge_finished_jobs(&self, retention: Duration) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM lendwise_job_queue
            WHERE status IN ('completed', 'dead')
              AND completed_at < NOW() - ($1 * INTERVAL '1 millisecond')
            "#,
        )
        .bind(interval_millis(retention))
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        let purged = result.rows_affected();
        if purged > 0 {
            debug!(count = purged, "purged finished jobs");
        }
        Ok(purged)
    }

    #[instrument(skip(self))]
    async fn get_job(&self, job_id: Uuid) -> Result<JobInfo, StoreError> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM lendwise_job_queue WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?
            .ok_or(StoreError::JobNotFound(job_id))?;

        row_to_info(&row)
    }

    #[instrument(skip(self))]
    async fn list_jobs(
        &self,
        filter: JobFilter,
        pagination: Pagination,
    ) -> Result<Vec<JobInfo>, StoreError> {
        let sql = format!(
            r#"
            SELECT {JOB_COLUMNS}
            FROM lendwise_job_queue
            WHERE ($1::text IS NULL OR queue = $1)
              AND ($2::text IS NULL OR status = $2)
            ORDER BY id DESC
            OFFSET $3
            LIMIT $4
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(filter.queue.as_deref())
            .bind(filter.status.map(|s| s.as_str()))
            .bind(pagination.offset as i64)
            .bind(pagination.limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        rows.iter().map(row_to_info).collect()
    }

    #[instrument(skip(self))]
    async fn queue_stats(&self, queue: &str) -> Result<QueueStats, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT status, COUNT(*) AS count
            FROM lendwise_job_queue
            WHERE queue = $1
            GROUP BY status
            "#,
        )
        .bind(queue)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        let mut stats = QueueStats::default();
        for row in rows {
            let count = row.get::<i64, _>("count") as u64;
            match parse_status(row.get::<String, _>("status").as_str())? {
                JobStatus::Pending => stats.pending = count,
                JobStatus::Claimed => stats.claimed = count,
                JobStatus::Completed => stats.completed = count,
                JobStatus::Dead => stats.dead = count,
            }
        }
        Ok(stats)
    }
}

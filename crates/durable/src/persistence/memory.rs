//! In-memory implementation of JobStore for testing and single-process runs

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use super::store::{
    ClaimedJob, JobFailureOutcome, JobFilter, JobInfo, JobStatus, JobStore, Pagination,
    QueueStats, StoreError,
};
use crate::job::JobDefinition;

#[derive(Debug, Clone)]
struct JobState {
    definition: JobDefinition,
    status: JobStatus,
    attempt: u32,
    last_error: Option<String>,
    error_history: Vec<String>,
    output: Option<serde_json::Value>,
    claimed_by: Option<String>,
    claimed_at: Option<DateTime<Utc>>,
    enqueued_at: DateTime<Utc>,
    visible_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl JobState {
    fn info(&self, id: Uuid) -> JobInfo {
        JobInfo {
            id,
            queue: self.definition.queue.clone(),
            job_type: self.definition.job_type.clone(),
            payload: self.definition.payload.clone(),
            status: self.status,
            attempt: self.attempt,
            max_attempts: self.definition.max_attempts(),
            last_error: self.last_error.clone(),
            error_history: self.error_history.clone(),
            output: self.output.clone(),
            claimed_by: self.claimed_by.clone(),
            enqueued_at: self.enqueued_at,
            visible_at: self.visible_at,
            completed_at: self.completed_at,
        }
    }

    fn expect_claimed(&self, id: Uuid) -> Result<(), StoreError> {
        if self.status == JobStatus::Claimed {
            Ok(())
        } else {
            Err(StoreError::InvalidState {
                id,
                status: self.status,
            })
        }
    }
}

/// In-memory implementation of JobStore
///
/// Job ids are UUIDv7, so iterating the map visits jobs in enqueue order.
/// Provides the same claim/retry semantics as the PostgreSQL implementation.
/// Finished jobs stay until `purge_finished_jobs` removes them; the worker pool
/// calls it on its reclaim interval.
///
/// # Example
///
/// ```
/// use lendwise_durable::{InMemoryJobStore, JobDefinition, JobStore};
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let store = InMemoryJobStore::new();
/// let id = store
///     .enqueue(JobDefinition::new("emails", "send", json!({})))
///     .await
///     .unwrap();
///
/// let claimed = store
///     .claim_jobs("worker-1", &["emails".to_string()], 10)
///     .await
///     .unwrap();
/// assert_eq!(claimed[0].id, id);
/// # });
/// ```
pub struct InMemoryJobStore {
    jobs: RwLock<BTreeMap<Uuid, JobState>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(BTreeMap::new()),
        }
    }

    /// Number of jobs in any state
    pub fn job_count(&self) -> usize {
        self.jobs.read().len()
    }

    pub fn pending_job_count(&self) -> usize {
        self.jobs
            .read()
            .values()
            .filter(|j| j.status == JobStatus::Pending)
            .count()
    }

    pub fn clear(&self) {
        self.jobs.write().clear();
    }
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

fn chrono_delay(delay: Duration) -> chrono::Duration {
    chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero())
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn enqueue(&self, job: JobDefinition) -> Result<Uuid, StoreError> {
        let id = Uuid::now_v7();
        let now = Utc::now();
        let visible_at = now + chrono_delay(job.delay);

        self.jobs.write().insert(
            id,
            JobState {
                definition: job,
                status: JobStatus::Pending,
                attempt: 0,
                last_error: None,
                error_history: vec![],
                output: None,
                claimed_by: None,
                claimed_at: None,
                enqueued_at: now,
                visible_at,
                completed_at: None,
            },
        );

        Ok(id)
    }

    async fn claim_jobs(
        &self,
        worker_id: &str,
        queues: &[String],
        max_jobs: usize,
    ) -> Result<Vec<ClaimedJob>, StoreError> {
        let now = Utc::now();
        let mut jobs = self.jobs.write();
        let mut claimed = vec![];

        for (job_id, job) in jobs.iter_mut() {
            if claimed.len() >= max_jobs {
                break;
            }

            if job.status == JobStatus::Pending
                && job.visible_at <= now
                && queues.contains(&job.definition.queue)
            {
                job.status = JobStatus::Claimed;
                job.claimed_by = Some(worker_id.to_string());
                job.claimed_at = Some(now);
                job.attempt += 1;

                claimed.push(ClaimedJob {
                    id: *job_id,
                    queue: job.definition.queue.clone(),
                    job_type: job.definition.job_type.clone(),
                    payload: job.definition.payload.clone(),
                    options: job.definition.options.clone(),
                    attempt: job.attempt,
                    max_attempts: job.definition.max_attempts(),
                });
            }
        }

        Ok(claimed)
    }

    async fn complete_job(
        &self,
        job_id: Uuid,
        output: serde_json::Value,
    ) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write();
        let job = jobs
            .get_mut(&job_id)
            .ok_or(StoreError::JobNotFound(job_id))?;
        job.expect_claimed(job_id)?;

        job.status = JobStatus::Completed;
        job.output = Some(output);
        job.claimed_by = None;
        job.completed_at = Some(Utc::now());
        Ok(())
    }

    async fn fail_job(&self, job_id: Uuid, error: &str) -> Result<JobFailureOutcome, StoreError> {
        let mut jobs = self.jobs.write();
        let job = jobs
            .get_mut(&job_id)
            .ok_or(StoreError::JobNotFound(job_id))?;
        job.expect_claimed(job_id)?;

        job.error_history.push(error.to_string());
        job.last_error = Some(error.to_string());
        job.claimed_by = None;

        let policy = &job.definition.options.retry_policy;
        if policy.has_attempts_remaining(job.attempt) {
            let delay = policy.delay_after_attempt(job.attempt);
            job.status = JobStatus::Pending;
            job.visible_at = Utc::now() + chrono_delay(delay);

            Ok(JobFailureOutcome::WillRetry {
                next_attempt: job.attempt + 1,
                delay,
            })
        } else {
            job.status = JobStatus::Dead;
            job.completed_at = Some(Utc::now());
            Ok(JobFailureOutcome::Exhausted {
                attempts: job.attempt,
            })
        }
    }

    async fn reclaim_stale_jobs(&self, stale_threshold: Duration) -> Result<Vec<Uuid>, StoreError> {
        let now = Utc::now();
        let cutoff = now - chrono_delay(stale_threshold);
        let mut jobs = self.jobs.write();
        let mut reclaimed = vec![];

        for (job_id, job) in jobs.iter_mut() {
            let stale = job.status == JobStatus::Claimed
                && job.claimed_at.map_or(false, |at| at < cutoff);
            if !stale {
                continue;
            }

            let error = "attempt abandoned by worker".to_string();
            job.error_history.push(error.clone());
            job.last_error = Some(error);
            job.claimed_by = None;

            // The abandoned run already counted as an attempt
            if job
                .definition
                .options
                .retry_policy
                .has_attempts_remaining(job.attempt)
            {
                job.status = JobStatus::Pending;
                job.visible_at = now;
            } else {
                job.status = JobStatus::Dead;
                job.completed_at = Some(now);
            }
            reclaimed.push(*job_id);
        }

        Ok(reclaimed)
    }

    async fn purge_finished_jobs(&self, retention: Duration) -> Result<u64, StoreError> {
        let cutoff = Utc::now() - chrono_delay(retention);
        let mut jobs = self.jobs.write();
        let before = jobs.len();
        jobs.retain(|_, job| {
            let finished = matches!(job.status, JobStatus::Completed | JobStatus::Dead);
            !(finished && job.completed_at.map_or(false, |at| at <= cutoff))
        });
        Ok((before - jobs.len()) as u64)
    }

    async fn get_job(&self, job_id: Uuid) -> Result<JobInfo, StoreError> {
        self.jobs
            .read()
            .get(&job_id)
            .map(|job| job.info(job_id))
            .ok_or(StoreError::JobNotFound(job_id))
    }

    async fn list_jobs(
        &self,
        filter: JobFilter,
        pagination: Pagination,
    ) -> Result<Vec<JobInfo>, StoreError> {
        let jobs = self.jobs.read();
        Ok(jobs
            .iter()
            .rev()
            .map(|(id, job)| job.info(*id))
            .filter(|info| filter.matches(info))
            .skip(pagination.offset as usize)
            .take(pagination.limit as usize)
            .collect())
    }

    async fn queue_stats(&self, queue: &str) -> Result<QueueStats, StoreError> {
        let jobs = self.jobs.read();
        let mut stats = QueueStats::default();
        for job in jobs.values().filter(|j| j.definition.queue == queue) {
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Claimed => stats.claimed += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Dead => stats.dead += 1,
            }
        }
        Ok(stats)
    }
}

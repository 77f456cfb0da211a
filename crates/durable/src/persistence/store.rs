//! JobStore trait definition

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::job::{JobDefinition, JobOptions};

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Job not found
    #[error("job not found: {0}")]
    JobNotFound(Uuid),

    /// Job is not in a state that allows the operation
    #[error("job {id} is {status}, expected claimed")]
    InvalidState { id: Uuid, status: JobStatus },

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Job status in the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting to be claimed (possibly not yet visible)
    Pending,
    /// Held by a worker
    Claimed,
    Completed,
    /// Every attempt failed
    Dead,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Claimed => "claimed",
            Self::Completed => "completed",
            Self::Dead => "dead",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "claimed" => Ok(Self::Claimed),
            "completed" => Ok(Self::Completed),
            "dead" => Ok(Self::Dead),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// A job that has been claimed by a worker
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub id: Uuid,
    pub queue: String,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub options: JobOptions,
    /// 1-based attempt number of this execution
    pub attempt: u32,
    pub max_attempts: u32,
}

impl ClaimedJob {
    pub fn is_last_attempt(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}

/// Outcome of failing a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobFailureOutcome {
    /// Job was requeued and becomes visible after `delay`
    WillRetry { next_attempt: u32, delay: Duration },

    /// No attempts left; job is dead
    Exhausted { attempts: u32 },
}

/// Stored view of a job
#[derive(Debug, Clone, Serialize)]
pub struct JobInfo {
    pub id: Uuid,
    pub queue: String,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub status: JobStatus,
    pub attempt: u32,
    pub max_attempts: u32,
    pub last_error: Option<String>,
    pub error_history: Vec<String>,
    pub output: Option<serde_json::Value>,
    pub claimed_by: Option<String>,
    pub enqueued_at: DateTime<Utc>,
    /// Earliest time the job may next be claimed
    pub visible_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Filter for listing jobs
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub queue: Option<String>,
    pub status: Option<JobStatus>,
}

impl JobFilter {
    pub fn queue(queue: impl Into<String>) -> Self {
        Self {
            queue: Some(queue.into()),
            status: None,
        }
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn matches(&self, job: &JobInfo) -> bool {
        self.queue.as_deref().map_or(true, |q| q == job.queue)
            && self.status.map_or(true, |s| s == job.status)
    }
}

/// Pagination parameters
#[derive(Debug, Clone)]
pub struct Pagination {
    pub offset: u32,
    pub limit: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 100,
        }
    }
}

/// Per-status counts for one queue
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct QueueStats {
    pub pending: u64,
    pub claimed: u64,
    pub completed: u64,
    pub dead: u64,
}

/// Durable job queue
///
/// Implementations must be thread-safe and support concurrent claimers. A job
/// is handed to at most one worker at a time, and never claimed before its
/// visibility time.
#[async_trait]
pub trait JobStore: Send + Sync + 'static {
    /// Enqueue a job; it becomes claimable after `job.delay`
    async fn enqueue(&self, job: JobDefinition) -> Result<Uuid, StoreError>;

    /// Claim up to `max_jobs` visible jobs from `queues`, oldest first.
    ///
    /// Claiming increments the attempt counter.
    async fn claim_jobs(
        &self,
        worker_id: &str,
        queues: &[String],
        max_jobs: usize,
    ) -> Result<Vec<ClaimedJob>, StoreError>;

    /// Mark a claimed job completed
    async fn complete_job(&self, job_id: Uuid, output: serde_json::Value)
        -> Result<(), StoreError>;

    /// Record a failed attempt. Requeues with the policy's delay while attempts
    /// remain, otherwise marks the job dead.
    async fn fail_job(&self, job_id: Uuid, error: &str)
        -> Result<JobFailureOutcome, StoreError>;

    /// Return jobs claimed longer than `stale_threshold` ago to pending
    async fn reclaim_stale_jobs(&self, stale_threshold: Duration)
        -> Result<Vec<Uuid>, StoreError>;

    /// Delete completed and dead jobs that finished more than `retention` ago.
    /// Returns the number of jobs removed.
    async fn purge_finished_jobs(&self, retention: Duration) -> Result<u64, StoreError>;

    async fn get_job(&self, job_id: Uuid) -> Result<JobInfo, StoreError>;

    async fn list_jobs(
        &self,
        filter: JobFilter,
        pagination: Pagination,
    ) -> Result<Vec<JobInfo>, StoreError>;

    async fn queue_stats(&self, queue: &str) -> Result<QueueStats, StoreError>;
}

//! # Durable Job Queue
//!
//! A job queue with at-least-once delivery, used to take slow side effects
//! (email delivery) off the request path.
//!
//! ## Features
//!
//! - **Named queues**: jobs are placed on a queue and claimed by workers subscribed to it
//! - **Delayed visibility**: a job can be held back for a fixed delay after enqueue
//! - **Bounded retries**: a retry policy caps the total number of attempts
//! - **Per-attempt timeout**: an attempt that runs too long counts as failed
//! - **Terminal failure hooks**: run once when a job exhausts its attempts
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         JobStore                            │
//! │  (InMemoryJobStore | PostgresJobStore: lendwise_job_queue)  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        WorkerPool                           │
//! │  (claims jobs, runs handlers, records completion/failure)   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use lendwise_durable::prelude::*;
//!
//! let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
//! store
//!     .enqueue(
//!         JobDefinition::new("emails", "send_notification", payload)
//!             .with_options(JobOptions::new().with_max_attempts(3))
//!             .with_delay(Duration::from_secs(5)),
//!     )
//!     .await?;
//! ```

pub mod job;
pub mod persistence;
pub mod reliability;
pub mod worker;

/// Prelude for common imports
pub mod prelude {
    pub use crate::job::{JobDefinition, JobOptions};
    pub use crate::persistence::{
        ClaimedJob, InMemoryJobStore, JobStatus, JobStore, PostgresJobStore, StoreError,
    };
    pub use crate::reliability::{ExecutionTimeout, RetryPolicy};
    pub use crate::worker::{WorkerPool, WorkerPoolConfig, WorkerPoolError};
}

// Re-export key types at crate root
pub use job::{JobDefinition, JobOptions};
pub use persistence::{
    ClaimedJob, InMemoryJobStore, JobFailureOutcome, JobFilter, JobInfo, JobStatus, JobStore,
    Pagination, PostgresJobStore, QueueStats, StoreError,
};
pub use reliability::{ExecutionTimeout, RetryPolicy, TimeoutError};
pub use worker::{
    ExecutionOutcome, JobExecutor, JobResult, PollerConfig, WorkerPool, WorkerPoolConfig,
    WorkerPoolError, WorkerPoolStatus,
};

//! Worker pool for job execution
//!
//! This module provides:
//! - [`WorkerPool`] - Concurrent job execution with graceful shutdown
//! - [`JobExecutor`] - Runs one attempt under its timeout and records the result
//! - [`JobPoller`] - Job claiming with backoff while queues are idle
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       WorkerPool                            │
//! │  ┌─────────────┐                  ┌─────────────────────┐   │
//! │  │  JobPoller  │                  │  Stale Reclaimer    │   │
//! │  │  (polling)  │                  │     (30s)           │   │
//! │  └──────┬──────┘                  └─────────────────────┘   │
//! │         │                                                   │
//! │         ▼                                                   │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │      JobExecutor (Semaphore-limited, per job)       │    │
//! │  │  [Job 1] [Job 2] [Job 3] ... [Job N]                │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod executor;
mod poller;
mod pool;

pub use executor::{ExecutionOutcome, ExhaustedHook, JobExecutor, JobHandler, JobResult};
pub use poller::{JobPoller, PollerConfig, PollerError};
pub use pool::{WorkerPool, WorkerPoolConfig, WorkerPoolError, WorkerPoolStatus};

//! Persistence layer for the job queue
//!
//! This module provides:
//! - [`JobStore`] trait for queue persistence
//! - [`InMemoryJobStore`] for tests and single-process deployments
//! - [`PostgresJobStore`] for production

mod memory;
mod postgres;
mod store;

pub use memory::InMemoryJobStore;
pub use postgres::PostgresJobStore;
pub use store::{
    ClaimedJob, JobFailureOutcome, JobFilter, JobInfo, JobStatus, JobStore, Pagination,
    QueueStats, StoreError,
};

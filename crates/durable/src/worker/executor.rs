//! Single-job execution
//!
//! Runs the handler for a claimed job under the job's timeout and records the
//! result in the store. A handler error, a timeout and a panic all count as a
//! failed attempt.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::RwLock;
use tracing::{debug, error, instrument, warn};

use crate::persistence::{ClaimedJob, JobFailureOutcome, JobStore, StoreError};

/// Job execution result
pub type JobResult = Result<serde_json::Value, String>;

/// Job handler function type
pub type JobHandler =
    Arc<dyn Fn(ClaimedJob) -> Pin<Box<dyn Future<Output = JobResult> + Send>> + Send + Sync>;

/// Called once when a job fails its last attempt
pub type ExhaustedHook = Arc<dyn Fn(&ClaimedJob, &str) + Send + Sync>;

/// What happened to a job after one execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Completed,
    Retrying { next_attempt: u32, delay: Duration },
    Exhausted { attempts: u32 },
}

/// Dispatches claimed jobs to their registered handlers
pub struct JobExecutor {
    store: Arc<dyn JobStore>,
    handlers: RwLock<HashMap<String, JobHandler>>,
    exhausted_hooks: RwLock<HashMap<String, ExhaustedHook>>,
}

impl JobExecutor {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self {
            store,
            handlers: RwLock::new(HashMap::new()),
            exhausted_hooks: RwLock::new(HashMap::new()),
        }
    }

    /// Register a handler for `job_type`, replacing any previous one
    pub fn register_handler<F, Fut>(&self, job_type: &str, handler: F)
    where
        F: Fn(ClaimedJob) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = JobResult> + Send + 'static,
    {
        let handler: JobHandler = Arc::new(move |job| Box::pin(handler(job)));
        self.handlers.write().insert(job_type.to_string(), handler);
    }

    /// Register the terminal failure hook for `job_type`
    pub fn on_exhausted<F>(&self, job_type: &str, hook: F)
    where
        F: Fn(&ClaimedJob, &str) + Send + Sync + 'static,
    {
        self.exhausted_hooks
            .write()
            .insert(job_type.to_string(), Arc::new(hook));
    }

    pub fn has_handler(&self, job_type: &str) -> bool {
        self.handlers.read().contains_key(job_type)
    }

    /// Run one attempt of `job` and record the result
    #[instrument(
        skip(self, job),
        fields(job_id = %job.id, job_type = %job.job_type, attempt = job.attempt)
    )]
    pub async fn execute(&self, job: ClaimedJob) -> Result<ExecutionOutcome, StoreError> {
        let handler = self.handlers.read().get(&job.job_type).cloned();

        let result = match handler {
            Some(handler) => self.run_handler(handler, &job).await,
            None => Err(format!(
                "no handler registered for job type: {}",
                job.job_type
            )),
        };

        match result {
            Ok(output) => {
                self.store.complete_job(job.id, output).await?;
                debug!("job completed");
                Ok(ExecutionOutcome::Completed)
            }
            Err(err) => self.record_failure(&job, &err).await,
        }
    }

    async fn run_handler(&self, handler: JobHandler, job: &ClaimedJob) -> JobResult {
        let attempt = AssertUnwindSafe(handler(job.clone())).catch_unwind();

        match job.options.timeout.run(attempt).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err("job handler panicked".to_string()),
            Err(timeout) => Err(timeout.to_string()),
        }
    }

    async fn record_failure(
        &self,
        job: &ClaimedJob,
        err: &str,
    ) -> Result<ExecutionOutcome, StoreError> {
        match self.store.fail_job(job.id, err).await? {
            JobFailureOutcome::WillRetry {
                next_attempt,
                delay,
            } => {
                warn!(
                    error = %err,
                    next_attempt,
                    delay_ms = delay.as_millis() as u64,
                    "job attempt failed, will retry"
                );
                Ok(ExecutionOutcome::Retrying {
                    next_attempt,
                    delay,
                })
            }
            JobFailureOutcome::Exhausted { attempts } => {
                error!(error = %err, attempts, "job failed permanently");
                let hook = self.exhausted_hooks.read().get(&job.job_type).cloned();
                if let Some(hook) = hook {
                    hook(job, err);
                }
                Ok(ExecutionOutcome::Exhausted { attempts })
            }
        }
    }
}

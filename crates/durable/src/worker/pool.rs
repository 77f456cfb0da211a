//! Worker pool for job execution
//!
//! Claims jobs from its queues, runs them concurrently up to a limit and shuts
//! down gracefully.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::executor::{JobExecutor, JobResult};
use super::poller::{JobPoller, PollerConfig};
use crate::persistence::{ClaimedJob, JobStore, StoreError};
use crate::reliability::duration_millis;

/// Worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerPoolConfig {
    /// Unique worker ID (generated if not provided)
    pub worker_id: String,

    /// Queues this worker claims from
    pub queues: Vec<String>,

    /// Maximum concurrent job executions
    pub max_concurrency: usize,

    pub poller: PollerConfig,

    /// Stale job reclamation interval
    #[serde(with = "duration_millis")]
    pub stale_reclaim_interval: Duration,

    /// How long a claim may be held before the job is reclaimed.
    /// Must exceed the longest job timeout.
    #[serde(with = "duration_millis")]
    pub stale_threshold: Duration,

    /// How long completed and dead jobs are kept before the reclaim loop purges them
    #[serde(with = "duration_millis")]
    pub finished_retention: Duration,

    /// Graceful shutdown timeout
    #[serde(with = "duration_millis")]
    pub shutdown_timeout: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", Uuid::now_v7()),
            queues: vec![],
            max_concurrency: 4,
            poller: PollerConfig::default(),
            stale_reclaim_interval: Duration::from_secs(30),
            stale_threshold: Duration::from_secs(120),
            finished_retention: Duration::from_secs(24 * 60 * 60),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl WorkerPoolConfig {
    pub fn new(queues: Vec<String>) -> Self {
        Self {
            queues,
            ..Default::default()
        }
    }

    pub fn with_worker_id(mut self, id: impl Into<String>) -> Self {
        self.worker_id = id.into();
        self
    }

    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }

    pub fn with_poller(mut self, config: PollerConfig) -> Self {
        self.poller = config;
        self
    }

    pub fn with_stale_threshold(mut self, threshold: Duration) -> Self {
        self.stale_threshold = threshold;
        self
    }

    pub fn with_finished_retention(mut self, retention: Duration) -> Self {
        self.finished_retention = retention;
        self
    }

    pub fn with_stale_reclaim_interval(mut self, interval: Duration) -> Self {
        self.stale_reclaim_interval = interval;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

/// Worker pool status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPoolStatus {
    /// Claiming and running jobs
    Running,
    /// Finishing current jobs, not claiming new ones
    Draining,
    Stopped,
}

/// Worker pool errors
#[derive(Debug, thiserror::Error)]
pub enum WorkerPoolError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("worker pool is already running")]
    AlreadyRunning,

    #[error("graceful shutdown timed out")]
    ShutdownTimeout,
}

/// Worker pool for executing queued jobs
///
/// # Example
///
/// ```ignore
/// use lendwise_durable::{WorkerPool, WorkerPoolConfig};
///
/// let config = WorkerPoolConfig::new(vec!["emails".to_string()]).with_max_concurrency(4);
/// let pool = WorkerPool::new(store, config);
///
/// pool.register_handler("send_notification", |job| async move {
///     // Deliver the email...
///     Ok(serde_json::Value::Null)
/// });
///
/// pool.start().await?;
/// // ... later
/// pool.shutdown().await?;
/// ```
pub struct WorkerPool {
    store: Arc<dyn JobStore>,
    executor: Arc<JobExecutor>,
    config: WorkerPoolConfig,
    shutdown_tx: watch::Sender<bool>,
    status: RwLock<WorkerPoolStatus>,
    active_jobs: Arc<Semaphore>,
    poll_handle: Mutex<Option<JoinHandle<()>>>,
    reclaim_handle: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(store: Arc<dyn JobStore>, config: WorkerPoolConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        let executor = Arc::new(JobExecutor::new(Arc::clone(&store)));

        Self {
            store,
            executor,
            active_jobs: Arc::new(Semaphore::new(config.max_concurrency)),
            config,
            shutdown_tx,
            status: RwLock::new(WorkerPoolStatus::Stopped),
            poll_handle: Mutex::new(None),
            reclaim_handle: Mutex::new(None),
        }
    }

    /// Register a job handler
    pub fn register_handler<F, Fut>(&self, job_type: &str, handler: F)
    where
        F: Fn(ClaimedJob) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = JobResult> + Send + 'static,
    {
        self.executor.register_handler(job_type, handler);
    }

    /// Register a hook run when a job of `job_type` fails its last attempt
    pub fn on_exhausted<F>(&self, job_type: &str, hook: F)
    where
        F: Fn(&ClaimedJob, &str) + Send + Sync + 'static,
    {
        self.executor.on_exhausted(job_type, hook);
    }

    /// Start the poll and reclaim loops
    #[instrument(skip(self), fields(worker_id = %self.config.worker_id))]
    pub async fn start(&self) -> Result<(), WorkerPoolError> {
        {
            let mut status = self.status.write();
            if *status != WorkerPoolStatus::Stopped {
                return Err(WorkerPoolError::AlreadyRunning);
            }
            *status = WorkerPoolStatus::Running;
        }
        self.shutdown_tx.send_replace(false);

        info!(
            worker_id = %self.config.worker_id,
            queues = ?self.config.queues,
            max_concurrency = self.config.max_concurrency,
            "Starting worker pool"
        );

        self.start_poll_loop();
        self.start_reclaim_loop();
        Ok(())
    }

    /// Stop claiming and wait for running jobs to finish
    #[instrument(skip(self), fields(worker_id = %self.config.worker_id))]
    pub async fn shutdown(&self) -> Result<(), WorkerPoolError> {
        {
            let mut status = self.status.write();
            if *status == WorkerPoolStatus::Stopped {
                return Ok(());
            }
            *status = WorkerPoolStatus::Draining;
        }

        info!(worker_id = %self.config.worker_id, "Initiating graceful shutdown");
        self.shutdown_tx.send_replace(true);

        let handles = [self.poll_handle.lock().take(), self.reclaim_handle.lock().take()];
        for handle in handles.into_iter().flatten() {
            if let Err(e) = handle.await {
                error!("Worker loop ended abnormally: {}", e);
            }
        }

        let deadline = tokio::time::Instant::now() + self.config.shutdown_timeout;
        loop {
            let available = self.active_jobs.available_permits();
            if available == self.config.max_concurrency {
                debug!("All jobs completed");
                break;
            }

            if tokio::time::Instant::now() >= deadline {
                warn!(
                    remaining_jobs = self.config.max_concurrency - available,
                    "Shutdown timeout reached"
                );
                *self.status.write() = WorkerPoolStatus::Stopped;
                return Err(WorkerPoolError::ShutdownTimeout);
            }

            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        *self.status.write() = WorkerPoolStatus::Stopped;
        info!(worker_id = %self.config.worker_id, "Worker pool stopped");
        Ok(())
    }

    pub fn status(&self) -> WorkerPoolStatus {
        *self.status.read()
    }

    /// Jobs currently executing
    pub fn current_load(&self) -> usize {
        self.config.max_concurrency - self.active_jobs.available_permits()
    }

    pub fn worker_id(&self) -> &str {
        &self.config.worker_id
    }

    fn start_poll_loop(&self) {
        let executor = Arc::clone(&self.executor);
        let active_jobs = Arc::clone(&self.active_jobs);
        let mut poller = JobPoller::new(
            Arc::clone(&self.store),
            self.config.worker_id.clone(),
            self.config.queues.clone(),
            self.config.poller.clone(),
            self.shutdown_tx.subscribe(),
        );

        let handle = tokio::spawn(async move {
            loop {
                if poller.is_shutdown() {
                    debug!("Poll loop: shutdown requested");
                    break;
                }

                let available = active_jobs.available_permits();
                if available == 0 {
                    if poller.wait().await {
                        break;
                    }
                    continue;
                }

                match poller.poll(available).await {
                    Ok(jobs) => {
                        for job in jobs {
                            // At most `available` jobs were claimed, so this never waits long
                            let permit = match Arc::clone(&active_jobs).acquire_owned().await {
                                Ok(permit) => permit,
                                Err(_) => break,
                            };

                            let executor = Arc::clone(&executor);
                            tokio::spawn(async move {
                                let job_id = job.id;
                                if let Err(e) = executor.execute(job).await {
                                    error!(%job_id, "Failed to record job result: {}", e);
                                }
                                drop(permit);
                            });
                        }
                    }
                    Err(e) => {
                        error!("Poll error: {}", e);
                    }
                }

                if poller.wait().await {
                    break;
                }
            }

            debug!("Poll loop exited");
        });

        *self.poll_handle.lock() = Some(handle);
    }

    fn start_reclaim_loop(&self) {
        let store = Arc::clone(&self.store);
        let interval = self.config.stale_reclaim_interval;
        let threshold = self.config.stale_threshold;
        let retention = self.config.finished_retention;
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match store.reclaim_stale_jobs(threshold).await {
                            Ok(reclaimed) => {
                                if !reclaimed.is_empty() {
                                    info!(count = reclaimed.len(), "Reclaimed stale jobs");
                                }
                            }
                            Err(e) => {
                                error!("Stale job reclamation failed: {}", e);
                            }
                        }
                        match store.purge_finished_jobs(retention).await {
                            Ok(0) => {}
                            Ok(purged) => debug!(count = purged, "Purged finished jobs"),
                            Err(e) => error!("Finished job purge failed: {}", e),
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        debug!("Reclaim loop: shutdown requested");
                        break;
                    }
                }
            }

            debug!("Reclaim loop exited");
        });

        *self.reclaim_handle.lock() = Some(handle);
    }
}

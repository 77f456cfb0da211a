//! Per-attempt execution timeout
//!
//! A job attempt that runs past its limit is abandoned and counts as a failed
//! attempt, the same as a handler error.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::duration_millis;

/// Timeout-related errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TimeoutError {
    /// The attempt ran longer than allowed
    #[error("job execution timed out after {limit:?}")]
    Elapsed { limit: Duration },
}

/// Wall clock limit for a single job attempt
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct ExecutionTimeout(#[serde(with = "duration_millis")] Duration);

impl Default for ExecutionTimeout {
    fn default() -> Self {
        Self(Duration::from_secs(60))
    }
}

impl ExecutionTimeout {
    pub fn new(limit: Duration) -> Self {
        Self(limit)
    }

    pub fn from_secs(secs: u64) -> Self {
        Self(Duration::from_secs(secs))
    }

    pub fn limit(&self) -> Duration {
        self.0
    }

    /// Run `fut`, giving up once the limit passes
    pub async fn run<F, T>(&self, fut: F) -> Result<T, TimeoutError>
    where
        F: Future<Output = T>,
    {
        run_with_timeout(self.0, fut).await
    }
}

impl From<Duration> for ExecutionTimeout {
    fn from(limit: Duration) -> Self {
        Self(limit)
    }
}

/// Await `fut` for at most `limit`
pub async fn run_with_timeout<F, T>(limit: Duration, fut: F) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| TimeoutError::Elapsed { limit })
}

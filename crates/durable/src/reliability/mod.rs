//! Reliability patterns for queued jobs
//!
//! This module provides:
//! - [`RetryPolicy`] - Attempt budget with backoff between attempts
//! - [`ExecutionTimeout`] - Per-attempt wall clock limit

mod retry;
mod timeout;

pub use retry::RetryPolicy;
pub use timeout::{run_with_timeout, ExecutionTimeout, TimeoutError};

/// Serde support for Duration as milliseconds
pub(crate) mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

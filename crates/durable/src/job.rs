//! Job definitions

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::reliability::{duration_millis, ExecutionTimeout, RetryPolicy};

/// Per-job execution options, stored alongside the job
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct JobOptions {
    pub retry_policy: RetryPolicy,
    pub timeout: ExecutionTimeout,
}

impl JobOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.retry_policy = self.retry_policy.with_max_attempts(max_attempts);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = ExecutionTimeout::new(timeout);
        self
    }
}

/// A job to be enqueued
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDefinition {
    /// Named queue the job is placed on
    pub queue: String,
    /// Selects the handler
    pub job_type: String,
    pub payload: serde_json::Value,
    pub options: JobOptions,
    /// First attempt becomes claimable only after this delay
    #[serde(with = "duration_millis")]
    pub delay: Duration,
}

impl JobDefinition {
    pub fn new(
        queue: impl Into<String>,
        job_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            queue: queue.into(),
            job_type: job_type.into(),
            payload,
            options: JobOptions::default(),
            delay: Duration::ZERO,
        }
    }

    pub fn with_options(mut self, options: JobOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.options.retry_policy.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder() {
        let job = JobDefinition::new("emails", "send_notification", json!({"id": 1}))
            .with_options(
                JobOptions::new()
                    .with_max_attempts(3)
                    .with_timeout(Duration::from_secs(60)),
            )
            .with_delay(Duration::from_secs(5));

        assert_eq!(job.queue, "emails");
        assert_eq!(job.job_type, "send_notification");
        assert_eq!(job.max_attempts(), 3);
        assert_eq!(job.options.timeout.limit(), Duration::from_secs(60));
        assert_eq!(job.delay, Duration::from_secs(5));
    }
}

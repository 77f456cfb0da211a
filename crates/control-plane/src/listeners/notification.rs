// Queue subscriber: maps status events to email notification jobs
//
// The job payload carries identifiers only. The worker re-reads the entity
// after the delay, so it always renders committed state.

use async_trait::async_trait;
use lendwise_core::{
    EventListener, NotificationJob, StatusChangeEvent, EMAILS_QUEUE, SEND_NOTIFICATION_JOB,
};
use lendwise_durable::{JobDefinition, JobOptions, JobStore};
use std::sync::Arc;
use tracing::{error, info};

use crate::config::NotificationSettings;

pub struct NotificationListener {
    jobs: Arc<dyn JobStore>,
    settings: NotificationSettings,
}

impl NotificationListener {
    pub fn new(jobs: Arc<dyn JobStore>, settings: NotificationSettings) -> Self {
        Self { jobs, settings }
    }

    fn job_definition(&self, job: &NotificationJob) -> Result<JobDefinition, serde_json::Error> {
        let payload = serde_json::to_value(job)?;
        let options = JobOptions::new()
            .with_retry_policy(self.settings.retry_policy.clone())
            .with_timeout(self.settings.timeout);

        Ok(
            JobDefinition::new(EMAILS_QUEUE, SEND_NOTIFICATION_JOB, payload)
                .with_options(options)
                .with_delay(self.settings.delay),
        )
    }
}

#[async_trait]
impl EventListener for NotificationListener {
    async fn on_event(&self, event: &StatusChangeEvent) {
        let Some(job) = NotificationJob::from_event(event) else {
            info!(
                entity_kind = %event.entity_kind,
                entity_id = %event.entity_id,
                old_status = ?event.old_status,
                new_status = %event.new_status,
                "No notification for this transition"
            );
            return;
        };

        let definition = match self.job_definition(&job) {
            Ok(definition) => definition,
            Err(e) => {
                error!(entity_id = %event.entity_id, error = %e, "Failed to serialize notification job");
                return;
            }
        };

        match self.jobs.enqueue(definition).await {
            Ok(job_id) => info!(
                %job_id,
                entity_kind = %job.entity_kind,
                entity_id = %job.entity_id,
                notification_type = job.notification_type.as_str(),
                "Notification queued"
            ),
            Err(e) => error!(
                entity_kind = %job.entity_kind,
                entity_id = %job.entity_id,
                notification_type = job.notification_type.as_str(),
                error = %e,
                "Failed to queue notification"
            ),
        }
    }

    fn name(&self) -> &'static str {
        "notification"
    }
}

// Notification rules
//
// Maps a committed status transition to zero or one notification intents.
// Loan:        -> active (from new/null/pending) = borrowed
//              -> returned                       = returned
// Transaction: -> completed                      = completed
//              -> cancelled                      = cancelled
// Anything else produces no notification.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::events::{EntityKind, StatusChangeEvent, NEW_STATUS};

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// Queue that notification jobs are enqueued on
pub const EMAILS_QUEUE: &str = "emails";

/// Job type handled by the notification worker
pub const SEND_NOTIFICATION_JOB: &str = "send_notification";

/// Total attempts per notification job, including the first
pub const NOTIFICATION_MAX_ATTEMPTS: u32 = 3;

/// Execution limit per attempt
pub const NOTIFICATION_TIMEOUT: Duration = Duration::from_secs(60);

/// Default delay before a freshly enqueued job becomes eligible
pub const NOTIFICATION_DELAY: Duration = Duration::from_secs(5);

/// Kind of email a transition triggers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    Borrowed,
    Returned,
    Completed,
    Cancelled,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::Borrowed => "borrowed",
            NotificationType::Returned => "returned",
            NotificationType::Completed => "completed",
            NotificationType::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decide which notification, if any, a transition triggers.
///
/// `old_status` is `None` when the entity had no previous status.
pub fn notification_intent(
    kind: EntityKind,
    old_status: Option<&str>,
    new_status: &str,
) -> Option<NotificationType> {
    match (kind, new_status) {
        (EntityKind::Loan, "active") => match old_status {
            None | Some(NEW_STATUS) | Some("pending") => Some(NotificationType::Borrowed),
            Some(_) => None,
        },
        (EntityKind::Loan, "returned") => Some(NotificationType::Returned),
        (EntityKind::Transaction, "completed") => Some(NotificationType::Completed),
        (EntityKind::Transaction, "cancelled") => Some(NotificationType::Cancelled),
        _ => None,
    }
}

/// Job payload: firm identifiers only. The worker re-reads the entity when it runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationJob {
    pub entity_kind: EntityKind,
    pub entity_id: Uuid,
    pub notification_type: NotificationType,
}

impl NotificationJob {
    /// Build the job for an event, or `None` if the transition is not notifiable
    pub fn from_event(event: &StatusChangeEvent) -> Option<Self> {
        notification_intent(
            event.entity_kind,
            event.old_status.as_deref(),
            &event.new_status,
        )
        .map(|notification_type| Self {
            entity_kind: event.entity_kind,
            entity_id: event.entity_id,
            notification_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loan_creation_is_borrowed() {
        assert_eq!(
            notification_intent(EntityKind::Loan, Some("new"), "active"),
            Some(NotificationType::Borrowed)
        );
        assert_eq!(
            notification_intent(EntityKind::Loan, None, "active"),
            Some(NotificationType::Borrowed)
        );
        assert_eq!(
            notification_intent(EntityKind::Loan, Some("pending"), "active"),
            Some(NotificationType::Borrowed)
        );
    }

    #[test]
    fn test_reactivated_loan_is_not_borrowed() {
        assert_eq!(
            notification_intent(EntityKind::Loan, Some("overdue"), "active"),
            None
        );
        assert_eq!(
            notification_intent(EntityKind::Loan, Some("returned"), "active"),
            None
        );
    }

    #[test]
    fn test_loan_returned_from_any_status() {
        for old in [None, Some("active"), Some("overdue"), Some("new")] {
            assert_eq!(
                notification_intent(EntityKind::Loan, old, "returned"),
                Some(NotificationType::Returned)
            );
        }
    }

    #[test]
    fn test_loan_overdue_is_silent() {
        assert_eq!(
            notification_intent(EntityKind::Loan, Some("active"), "overdue"),
            None
        );
    }

    #[test]
    fn test_transaction_rules() {
        assert_eq!(
            notification_intent(EntityKind::Transaction, Some("pending"), "completed"),
            Some(NotificationType::Completed)
        );
        assert_eq!(
            notification_intent(EntityKind::Transaction, Some("completed"), "cancelled"),
            Some(NotificationType::Cancelled)
        );
        assert_eq!(
            notification_intent(EntityKind::Transaction, Some("completed"), "pending"),
            None
        );
    }

    #[test]
    fn test_job_payload_serialization() {
        let job = NotificationJob {
            entity_kind: EntityKind::Transaction,
            entity_id: Uuid::nil(),
            notification_type: NotificationType::Cancelled,
        };
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["entity_kind"], "transaction");
        assert_eq!(json["notification_type"], "cancelled");
    }

    #[test]
    fn test_job_policy_constants() {
        assert_eq!(EMAILS_QUEUE, "emails");
        assert_eq!(NOTIFICATION_MAX_ATTEMPTS, 3);
        assert_eq!(NOTIFICATION_TIMEOUT, Duration::from_secs(60));
        assert_eq!(NOTIFICATION_DELAY, Duration::from_secs(5));
    }
}

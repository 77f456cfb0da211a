// Notification job handler
//
// Runs `send_notification` jobs from the `emails` queue: re-reads the entity,
// renders the template for the notification type and sends it.
//
// Failure semantics:
// - entity not found: error, retried (the job may run before a replica sees the write)
// - no student or no email address: warning, job succeeds with nothing sent
// - render or send failure: error, retried
// After the last attempt fails, the exhausted hook logs the notification.

use std::sync::Arc;

use lendwise_core::{
    EmailTemplate, EntityKind, EntitySnapshot, LendingError, LibraryStore, MailError,
    MailRenderer, Mailer, NotificationJob, SEND_NOTIFICATION_JOB,
};
use lendwise_durable::{ClaimedJob, WorkerPool};
use serde::Serialize;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::services::{load_loan_snapshot, load_transaction_snapshot};

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("invalid notification payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: Uuid },

    #[error("no email template for {kind} notification {notification}")]
    NoTemplate {
        kind: EntityKind,
        notification: &'static str,
    },

    #[error(transparent)]
    Lending(#[from] LendingError),

    #[error(transparent)]
    Mail(#[from] MailError),
}

/// What a successful run did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "delivery", rename_all = "snake_case")]
pub enum Delivery {
    Sent { to: String, template: String },
    Skipped { reason: String },
}

pub struct NotificationHandler {
    store: Arc<dyn LibraryStore>,
    renderer: MailRenderer,
    mailer: Arc<dyn Mailer>,
}

impl NotificationHandler {
    pub fn new(store: Arc<dyn LibraryStore>, renderer: MailRenderer, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            store,
            renderer,
            mailer,
        }
    }

    /// Register the handler and its exhausted hook on `pool`
    pub fn register(self: Arc<Self>, pool: &WorkerPool) {
        let handler = Arc::clone(&self);
        pool.register_handler(SEND_NOTIFICATION_JOB, move |job: ClaimedJob| {
            let handler = Arc::clone(&handler);
            async move {
                let notification: NotificationJob =
                    serde_json::from_value(job.payload).map_err(|e| {
                        NotificationError::Payload(e).to_string()
                    })?;
                let delivery = handler
                    .handle(&notification)
                    .await
                    .map_err(|e| e.to_string())?;
                serde_json::to_value(&delivery).map_err(|e| e.to_string())
            }
        });

        pool.on_exhausted(SEND_NOTIFICATION_JOB, log_exhausted);
    }

    /// Deliver one notification
    #[instrument(
        skip(self, job),
        fields(
            entity_kind = %job.entity_kind,
            entity_id = %job.entity_id,
            notification_type = job.notification_type.as_str()
        )
    )]
    pub async fn handle(&self, job: &NotificationJob) -> Result<Delivery, NotificationError> {
        let snapshot = self.load(job.entity_kind, job.entity_id).await?;

        let Some(student) = snapshot.student() else {
            warn!("No student on record, notification skipped");
            return Ok(Delivery::Skipped {
                reason: "student not found".to_string(),
            });
        };
        let Some(to) = student.deliverable_email() else {
            warn!(student_id = %student.id, "Student has no email address, notification skipped");
            return Ok(Delivery::Skipped {
                reason: "student has no email address".to_string(),
            });
        };

        let template = EmailTemplate::for_notification(job.entity_kind, job.notification_type)
            .ok_or(NotificationError::NoTemplate {
                kind: job.entity_kind,
                notification: job.notification_type.as_str(),
            })?;

        let email = self.renderer.render(template, to, &snapshot)?;
        self.mailer.send(&email).await?;

        info!(to = %email.to, template = template.name(), mailer = self.mailer.name(), "Notification sent");
        Ok(Delivery::Sent {
            to: email.to,
            template: template.name().to_string(),
        })
    }

    async fn load(&self, kind: EntityKind, id: Uuid) -> Result<EntitySnapshot, NotificationError> {
        let store = self.store.as_ref();
        match kind {
            EntityKind::Loan => {
                let loan = store
                    .get_loan(id)
                    .await?
                    .ok_or(NotificationError::NotFound { kind, id })?;
                Ok(EntitySnapshot::Loan(load_loan_snapshot(store, loan).await?))
            }
            EntityKind::Transaction => {
                let transaction = store
                    .get_transaction(id)
                    .await?
                    .ok_or(NotificationError::NotFound { kind, id })?;
                Ok(EntitySnapshot::Transaction(
                    load_transaction_snapshot(store, transaction).await?,
                ))
            }
        }
    }
}

fn log_exhausted(job: &ClaimedJob, last_error: &str) {
    match serde_json::from_value::<NotificationJob>(job.payload.clone()) {
        Ok(notification) => error!(
            job_id = %job.id,
            entity_kind = %notification.entity_kind,
            entity_id = %notification.entity_id,
            notification_type = notification.notification_type.as_str(),
            attempts = job.attempt,
            error = %last_error,
            "Notification failed permanently"
        ),
        Err(_) => error!(
            job_id = %job.id,
            attempts = job.attempt,
            error = %last_error,
            "Notification with unreadable payload failed permanently"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryLibraryStore;
    use chrono::{Duration, Utc};
    use lendwise_core::{
        BookStatus, InMemoryMailer, LoanStatus, NewBook, NewLoan, NewPerson, NewTransaction,
        NotificationType, TransactionStatus, TransactionType,
    };

    struct Fixture {
        store: Arc<InMemoryLibraryStore>,
        mailer: Arc<InMemoryMailer>,
        handler: NotificationHandler,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryLibraryStore::new());
        let mailer = Arc::new(InMemoryMailer::new());
        let handler = NotificationHandler::new(
            store.clone(),
            MailRenderer::new("Test Library").unwrap(),
            mailer.clone(),
        );
        Fixture {
            store,
            mailer,
            handler,
        }
    }

    async fn seed_loan(store: &InMemoryLibraryStore, email: Option<&str>) -> Uuid {
        let student = store
            .create_student(NewPerson {
                first_name: "Ada".to_string(),
                last_name: "Lovelace".to_string(),
                email: email.map(str::to_string),
            })
            .await
            .unwrap();
        let attendant = store
            .create_attendant(NewPerson {
                first_name: "Alan".to_string(),
                last_name: "Turing".to_string(),
                email: None,
            })
            .await
            .unwrap();
        let book = store
            .create_book(NewBook {
                title: "Dune".to_string(),
                author: "Frank Herbert".to_string(),
                status: BookStatus::Available,
            })
            .await
            .unwrap();
        store
            .create_loan(NewLoan {
                book_id: book.id,
                transaction: NewTransaction {
                    student_id: student.id,
                    attendant_id: attendant.id,
                    transaction_date: Utc::now(),
                    transaction_type: TransactionType::Borrow,
                    status: TransactionStatus::Completed,
                },
                loan_date: Utc::now(),
                due_date: Utc::now() + Duration::days(14),
                status: LoanStatus::Active,
            })
            .await
            .unwrap()
            .id
    }

    fn borrowed(loan_id: Uuid) -> NotificationJob {
        NotificationJob {
            entity_kind: EntityKind::Loan,
            entity_id: loan_id,
            notification_type: NotificationType::Borrowed,
        }
    }

    #[tokio::test]
    async fn test_sends_borrowed_email() {
        let f = fixture();
        let loan_id = seed_loan(&f.store, Some("ada@example.com")).await;

        let delivery = f.handler.handle(&borrowed(loan_id)).await.unwrap();
        assert_eq!(
            delivery,
            Delivery::Sent {
                to: "ada@example.com".to_string(),
                template: EmailTemplate::BookBorrowed.name().to_string(),
            }
        );

        let sent = f.mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "Book Loan Confirmed - Test Library");
        assert!(sent[0].body.contains("Dune"));
    }

    #[tokio::test]
    async fn test_missing_email_is_skipped() {
        let f = fixture();
        let loan_id = seed_loan(&f.store, None).await;

        let delivery = f.handler.handle(&borrowed(loan_id)).await.unwrap();
        assert!(matches!(delivery, Delivery::Skipped { .. }));
        assert_eq!(f.mailer.attempts(), 0);
    }

    #[tokio::test]
    async fn test_missing_entity_is_retryable_error() {
        let f = fixture();
        let err = f.handler.handle(&borrowed(Uuid::now_v7())).await.unwrap_err();
        assert!(matches!(
            err,
            NotificationError::NotFound {
                kind: EntityKind::Loan,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_send_failure_is_error() {
        let f = fixture();
        let loan_id = seed_loan(&f.store, Some("ada@example.com")).await;
        f.mailer.fail_next(1);

        let err = f.handler.handle(&borrowed(loan_id)).await.unwrap_err();
        assert!(matches!(err, NotificationError::Mail(_)));
        assert!(f.mailer.sent().is_empty());
    }
}

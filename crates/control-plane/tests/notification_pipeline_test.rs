//! End-to-end tests for the status-change pipeline
//!
//! write -> transition -> event bus -> {notification queue, broadcast channels} -> worker -> mailer
//!
//! Everything runs in memory: InMemoryLibraryStore, InMemoryJobStore and a
//! recording InMemoryMailer.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal_macros::dec;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::broadcast::Receiver;
use uuid::Uuid;

use lendwise_control_plane::api::library::{CreateBookRequest, CreatePersonRequest};
use lendwise_control_plane::api::loans::{CreateLoanRequest, ReturnLoanRequest};
use lendwise_control_plane::api::transactions::CreateTransactionRequest;
use lendwise_control_plane::config::NotificationSettings;
use lendwise_control_plane::storage::InMemoryLibraryStore;
use lendwise_control_plane::LendwiseApp;
use lendwise_core::{
    BookStatus, BroadcastMessage, BroadcastPayload, EntityKind, InMemoryMailer, LendingError,
    Loan, LoanStatus, NotificationJob, NotificationType, Transaction, TransactionStatus,
    TransactionType, EMAILS_QUEUE, LOANS_CHANNEL, LOAN_STATUS_CHANGED, TRANSACTIONS_CHANNEL,
};
use lendwise_durable::{InMemoryJobStore, JobFilter, JobInfo, JobStatus, JobStore, Pagination};

// ============================================
// Harness
// ============================================

struct Harness {
    app: LendwiseApp,
    jobs: Arc<InMemoryJobStore>,
    mailer: Arc<InMemoryMailer>,
}

struct People {
    student_id: Uuid,
    attendant_id: Uuid,
}

fn harness() -> Harness {
    let jobs = Arc::new(InMemoryJobStore::new());
    let mailer = Arc::new(InMemoryMailer::new());
    let app = LendwiseApp::new(
        Arc::new(InMemoryLibraryStore::new()),
        jobs.clone(),
        mailer.clone(),
        NotificationSettings::immediate().with_library_name("Campus Library"),
    )
    .unwrap();
    Harness { app, jobs, mailer }
}

impl Harness {
    async fn people(&self, email: Option<&str>) -> People {
        let student = self
            .app
            .catalog
            .create_student(CreatePersonRequest {
                first_name: "Ada".to_string(),
                last_name: "Lovelace".to_string(),
                email: email.map(str::to_string),
            })
            .await
            .unwrap();
        let attendant = self
            .app
            .catalog
            .create_attendant(CreatePersonRequest {
                first_name: "Alan".to_string(),
                last_name: "Turing".to_string(),
                email: None,
            })
            .await
            .unwrap();
        People {
            student_id: student.id,
            attendant_id: attendant.id,
        }
    }

    async fn book(&self) -> Uuid {
        self.app
            .catalog
            .create_book(CreateBookRequest {
                title: "Dune".to_string(),
                author: "Frank Herbert".to_string(),
                status: None,
            })
            .await
            .unwrap()
            .id
    }

    async fn lend(&self, people: &People, book_id: Uuid, due_in_days: i64) -> Loan {
        let now = Utc::now();
        let loan_date = if due_in_days > 0 {
            now
        } else {
            now + chrono::Duration::days(due_in_days - 14)
        };
        self.app
            .lending
            .create_loan(CreateLoanRequest {
                student_id: people.student_id,
                attendant_id: people.attendant_id,
                book_id,
                loan_date: Some(loan_date),
                due_date: now + chrono::Duration::days(due_in_days),
            })
            .await
            .unwrap()
    }

    async fn pending_transaction(&self, people: &People) -> Transaction {
        self.app
            .lending
            .create_transaction(CreateTransactionRequest {
                student_id: people.student_id,
                attendant_id: people.attendant_id,
                transaction_type: TransactionType::Borrow,
                status: None,
                transaction_date: None,
            })
            .await
            .unwrap()
    }

    async fn queued(&self) -> Vec<JobInfo> {
        self.jobs
            .list_jobs(JobFilter::queue(EMAILS_QUEUE), Pagination::default())
            .await
            .unwrap()
    }

    async fn queued_notifications(&self) -> Vec<NotificationJob> {
        self.queued()
            .await
            .into_iter()
            .map(|job| serde_json::from_value(job.payload).unwrap())
            .collect()
    }

    async fn notifications_for(&self, entity_id: Uuid) -> Vec<NotificationJob> {
        self.queued_notifications()
            .await
            .into_iter()
            .filter(|job| job.entity_id == entity_id)
            .collect()
    }
}

fn drain(rx: &mut Receiver<BroadcastMessage>) -> Vec<BroadcastMessage> {
    let mut messages = vec![];
    loop {
        match rx.try_recv() {
            Ok(message) => messages.push(message),
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return messages,
            Err(TryRecvError::Lagged(_)) => continue,
        }
    }
}

async fn wait_until_job_status(jobs: &InMemoryJobStore, id: Uuid, status: JobStatus) -> JobInfo {
    for _ in 0..500 {
        let job = jobs.get_job(id).await.unwrap();
        if job.status == status {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {id} never reached {status}");
}

// ============================================
// Scenarios
// ============================================

#[tokio::test]
async fn test_creating_loan_borrows_book_queues_and_broadcasts() {
    let h = harness();
    let people = h.people(Some("ada@example.com")).await;
    let book_id = h.book().await;
    let mut loans_rx = h.app.hub.subscribe(LOANS_CHANNEL);
    let mut transactions_rx = h.app.hub.subscribe(TRANSACTIONS_CHANNEL);

    let loan = h.lend(&people, book_id, 14).await;

    let book = h.app.catalog.get_book(book_id).await.unwrap();
    assert_eq!(book.status, BookStatus::Borrowed);

    // The borrow transaction is created completed and emits nothing itself
    assert_eq!(
        h.queued_notifications().await,
        vec![NotificationJob {
            entity_kind: EntityKind::Loan,
            entity_id: loan.id,
            notification_type: NotificationType::Borrowed,
        }]
    );

    let messages = drain(&mut loans_rx);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].event, LOAN_STATUS_CHANGED);
    match &messages[0].payload {
        BroadcastPayload::Loan { loan: payload, .. } => {
            assert_eq!(payload.id, loan.id);
            assert_eq!(payload.old_status.as_deref(), Some("new"));
            assert_eq!(payload.new_status, "active");
            assert_eq!(payload.book.as_ref().unwrap().book_title, "Dune");
        }
        other => panic!("unexpected payload: {other:?}"),
    }
    assert_eq!(drain(&mut transactions_rx).len(), 1);
}

#[tokio::test]
async fn test_late_return_with_payment() {
    let h = harness();
    let people = h.people(Some("ada@example.com")).await;
    let book_id = h.book().await;
    let loan = h.lend(&people, book_id, -1).await;

    let returned = h
        .app
        .lending
        .return_loan(
            loan.id,
            ReturnLoanRequest {
                payment_amount: Some(dec!(30.00)),
                attendant_id: None,
            },
        )
        .await
        .unwrap();

    assert_eq!(returned.status, LoanStatus::Returned);
    assert_eq!(returned.payment_amount, dec!(30.00));
    assert!(returned.returned_late());
    let book = h.app.catalog.get_book(book_id).await.unwrap();
    assert_eq!(book.status, BookStatus::Available);

    let notifications = h.notifications_for(loan.id).await;
    assert_eq!(notifications.len(), 2);
    assert!(notifications.contains(&NotificationJob {
        entity_kind: EntityKind::Loan,
        entity_id: loan.id,
        notification_type: NotificationType::Returned,
    }));

    // A completed return transaction was recorded alongside
    let transactions = h.app.lending.list_transactions().await.unwrap();
    assert!(transactions
        .iter()
        .any(|t| t.transaction_type == TransactionType::Return
            && t.status == TransactionStatus::Completed));

    h.app.worker.start().await.unwrap();
    for job in h.queued().await {
        wait_until_job_status(&h.jobs, job.id, JobStatus::Completed).await;
    }
    h.app.worker.shutdown().await.unwrap();

    let sent = h.mailer.sent();
    let returned_email = sent
        .iter()
        .find(|email| email.subject.starts_with("Book Return Confirmed"))
        .expect("return email sent");
    assert_eq!(returned_email.to, "ada@example.com");
    assert_eq!(
        returned_email.subject,
        "Book Return Confirmed - Campus Library"
    );
    assert!(returned_email.body.contains("A payment of $30.00"));
    assert!(returned_email.body.contains("late fees"));
    assert!(returned_email.body.contains("1 day(s) after the due date"));
}

#[tokio::test]
async fn test_transaction_completion_notifies_once() {
    let h = harness();
    let people = h.people(Some("ada@example.com")).await;
    let transaction = h.pending_transaction(&people).await;
    let mut rx = h.app.hub.subscribe(TRANSACTIONS_CHANNEL);

    let updated = h
        .app
        .lending
        .update_transaction_status(transaction.id, TransactionStatus::Completed)
        .await
        .unwrap();
    assert_eq!(updated.status, TransactionStatus::Completed);

    let err = h
        .app
        .lending
        .update_transaction_status(transaction.id, TransactionStatus::Completed)
        .await
        .unwrap_err();
    assert!(matches!(err, LendingError::StatusUnchanged { .. }));

    assert_eq!(
        h.notifications_for(transaction.id).await,
        vec![NotificationJob {
            entity_kind: EntityKind::Transaction,
            entity_id: transaction.id,
            notification_type: NotificationType::Completed,
        }]
    );
    assert_eq!(drain(&mut rx).len(), 1);
}

// ============================================
// Properties
// ============================================

#[tokio::test]
async fn test_loan_events_only_on_real_change() {
    let h = harness();
    let people = h.people(Some("ada@example.com")).await;
    let book_id = h.book().await;
    let loan = h.lend(&people, book_id, 14).await;
    let mut rx = h.app.hub.subscribe(LOANS_CHANNEL);
    let queued_before = h.queued().await.len();

    // Same status: no event, no job
    h.app
        .lending
        .update_loan_status(loan.id, LoanStatus::Active)
        .await
        .unwrap();
    assert!(drain(&mut rx).is_empty());
    assert_eq!(h.queued().await.len(), queued_before);

    // active -> overdue: event but no notification
    h.app
        .lending
        .update_loan_status(loan.id, LoanStatus::Overdue)
        .await
        .unwrap();
    let messages = drain(&mut rx);
    assert_eq!(messages.len(), 1);
    assert_eq!(h.queued().await.len(), queued_before);

    // overdue -> returned: exactly one returned notification
    h.app
        .lending
        .update_loan_status(loan.id, LoanStatus::Returned)
        .await
        .unwrap();
    let returned: Vec<_> = h
        .notifications_for(loan.id)
        .await
        .into_iter()
        .filter(|job| job.notification_type == NotificationType::Returned)
        .collect();
    assert_eq!(returned.len(), 1);

    // Replaying the committed status changes nothing
    h.app
        .lending
        .update_loan_status(loan.id, LoanStatus::Returned)
        .await
        .unwrap();
    assert_eq!(drain(&mut rx).len(), 1);
    assert_eq!(h.queued().await.len(), queued_before + 1);
}

#[tokio::test]
async fn test_reopened_transaction_is_not_notified() {
    let h = harness();
    let people = h.people(Some("ada@example.com")).await;
    let transaction = h.pending_transaction(&people).await;
    h.app
        .lending
        .update_transaction_status(transaction.id, TransactionStatus::Cancelled)
        .await
        .unwrap();
    let mut rx = h.app.hub.subscribe(TRANSACTIONS_CHANNEL);

    h.app
        .lending
        .update_transaction_status(transaction.id, TransactionStatus::Pending)
        .await
        .unwrap();

    let types: Vec<_> = h
        .notifications_for(transaction.id)
        .await
        .into_iter()
        .map(|job| job.notification_type)
        .collect();
    assert_eq!(types, vec![NotificationType::Cancelled]);
    // Still broadcast so dashboards refresh
    assert_eq!(drain(&mut rx).len(), 1);
}

#[tokio::test]
async fn test_concurrent_identical_updates_emit_once() {
    let h = Arc::new(harness());
    let people = h.people(Some("ada@example.com")).await;
    let transaction_id = h.pending_transaction(&people).await.id;

    let mut tasks = vec![];
    for _ in 0..8 {
        let h = h.clone();
        tasks.push(tokio::spawn(async move {
            h.app
                .lending
                .update_transaction_status(transaction_id, TransactionStatus::Completed)
                .await
                .is_ok()
        }));
    }

    let mut succeeded = 0;
    for task in tasks {
        if task.await.unwrap() {
            succeeded += 1;
        }
    }
    assert_eq!(succeeded, 1);
    assert_eq!(h.notifications_for(transaction_id).await.len(), 1);
}

#[tokio::test]
async fn test_student_without_email_completes_without_mail() {
    let h = harness();
    let people = h.people(None).await;
    let book_id = h.book().await;
    h.lend(&people, book_id, 14).await;
    let job_id = h.queued().await[0].id;

    h.app.worker.start().await.unwrap();
    let job = wait_until_job_status(&h.jobs, job_id, JobStatus::Completed).await;
    h.app.worker.shutdown().await.unwrap();

    assert_eq!(job.attempt, 1);
    assert_eq!(h.mailer.attempts(), 0);
    assert_eq!(job.output.unwrap()["delivery"], "skipped");
}

#[tokio::test]
async fn test_transient_send_failure_stops_after_three_attempts() {
    let h = harness();
    let people = h.people(Some("ada@example.com")).await;
    let book_id = h.book().await;
    h.lend(&people, book_id, 14).await;
    let job_id = h.queued().await[0].id;
    h.mailer.fail_next(10);

    h.app.worker.start().await.unwrap();
    let job = wait_until_job_status(&h.jobs, job_id, JobStatus::Dead).await;

    // Give the pool a chance to misbehave
    tokio::time::sleep(Duration::from_millis(100)).await;
    h.app.worker.shutdown().await.unwrap();

    assert_eq!(job.attempt, 3);
    assert_eq!(job.error_history.len(), 3);
    assert_eq!(h.mailer.attempts(), 3);
    assert!(h.mailer.sent().is_empty());
}

#[tokio::test]
async fn test_recovers_after_one_failed_send() {
    let h = harness();
    let people = h.people(Some("ada@example.com")).await;
    let book_id = h.book().await;
    h.lend(&people, book_id, 14).await;
    let job_id = h.queued().await[0].id;
    h.mailer.fail_next(1);

    h.app.worker.start().await.unwrap();
    let job = wait_until_job_status(&h.jobs, job_id, JobStatus::Completed).await;
    h.app.worker.shutdown().await.unwrap();

    assert_eq!(job.attempt, 2);
    assert_eq!(h.mailer.sent().len(), 1);
    assert_eq!(
        h.mailer.sent()[0].subject,
        "Book Loan Confirmed - Campus Library"
    );
}

#[tokio::test]
async fn test_rejected_writes_emit_nothing() {
    let h = harness();
    let people = h.people(Some("ada@example.com")).await;
    let book_id = h.book().await;
    let loan = h.lend(&people, book_id, 14).await;
    let mut rx = h.app.hub.subscribe(LOANS_CHANNEL);
    let queued_before = h.queued().await.len();

    // Book already lent
    let err = h
        .app
        .lending
        .create_loan(CreateLoanRequest {
            student_id: people.student_id,
            attendant_id: people.attendant_id,
            book_id,
            loan_date: None,
            due_date: Utc::now() + chrono::Duration::days(7),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, LendingError::BookUnavailable(_)));

    // Negative payment
    let err = h
        .app
        .lending
        .return_loan(
            loan.id,
            ReturnLoanRequest {
                payment_amount: Some(dec!(-1)),
                attendant_id: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LendingError::Validation(_)));

    // Second return
    h.app
        .lending
        .return_loan(loan.id, ReturnLoanRequest::default())
        .await
        .unwrap();
    drain(&mut rx);
    let err = h
        .app
        .lending
        .return_loan(loan.id, ReturnLoanRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, LendingError::Validation(_)));

    assert!(drain(&mut rx).is_empty());
    assert_eq!(h.queued().await.len(), queued_before + 1);
}

#[tokio::test]
async fn test_concurrent_returns_keep_the_winning_write() {
    let h = Arc::new(harness());
    let people = h.people(Some("ada@example.com")).await;
    let book_id = h.book().await;
    let loan_id = h.lend(&people, book_id, 14).await.id;

    let mut tasks = vec![];
    for cents in 1..=8i64 {
        let h = h.clone();
        tasks.push(tokio::spawn(async move {
            h.app
                .lending
                .return_loan(
                    loan_id,
                    ReturnLoanRequest {
                        payment_amount: Some(rust_decimal::Decimal::new(cents * 100, 2)),
                        attendant_id: None,
                    },
                )
                .await
        }));
    }

    let mut winners = vec![];
    for task in tasks {
        match task.await.unwrap() {
            Ok(loan) => winners.push(loan),
            Err(err) => assert!(matches!(err, LendingError::Validation(_))),
        }
    }
    assert_eq!(winners.len(), 1);

    let stored = h.app.lending.get_loan(loan_id).await.unwrap();
    assert_eq!(stored.payment_amount, winners[0].payment_amount);
    assert_eq!(stored.return_date, winners[0].return_date);

    let returns = h
        .app
        .lending
        .list_transactions()
        .await
        .unwrap()
        .into_iter()
        .filter(|t| t.transaction_type == TransactionType::Return)
        .count();
    assert_eq!(returns, 1);

    let returned = h
        .notifications_for(loan_id)
        .await
        .into_iter()
        .filter(|job| job.notification_type == NotificationType::Returned)
        .count();
    assert_eq!(returned, 1);
}

#[tokio::test]
async fn test_concurrent_loans_on_one_book_record_one_borrow() {
    let h = Arc::new(harness());
    let people = Arc::new(h.people(Some("ada@example.com")).await);
    let book_id = h.book().await;

    let mut tasks = vec![];
    for _ in 0..8 {
        let h = h.clone();
        let people = people.clone();
        tasks.push(tokio::spawn(async move {
            h.app
                .lending
                .create_loan(CreateLoanRequest {
                    student_id: people.student_id,
                    attendant_id: people.attendant_id,
                    book_id,
                    loan_date: None,
                    due_date: Utc::now() + chrono::Duration::days(7),
                })
                .await
        }));
    }

    let mut created = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => created += 1,
            Err(err) => assert!(matches!(err, LendingError::BookUnavailable(_))),
        }
    }
    assert_eq!(created, 1);
    assert_eq!(h.app.lending.list_transactions().await.unwrap().len(), 1);
    assert_eq!(h.app.lending.list_loans().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_returned_loan_reactivated_then_returned_again() {
    let h = harness();
    let people = h.people(Some("ada@example.com")).await;
    let book_id = h.book().await;
    let loan = h.lend(&people, book_id, 14).await;

    let returned = h
        .app
        .lending
        .return_loan(loan.id, ReturnLoanRequest::default())
        .await
        .unwrap();
    let first_return = returned.return_date.unwrap();

    let reopened = h
        .app
        .lending
        .update_loan_status(loan.id, LoanStatus::Active)
        .await
        .unwrap();
    assert_eq!(reopened.return_date, None);
    let book = h.app.catalog.get_book(book_id).await.unwrap();
    assert_eq!(book.status, BookStatus::Borrowed);

    tokio::time::sleep(Duration::from_millis(5)).await;
    let closed = h
        .app
        .lending
        .update_loan_status(loan.id, LoanStatus::Returned)
        .await
        .unwrap();
    assert!(closed.return_date.unwrap() > first_return);
    let book = h.app.catalog.get_book(book_id).await.unwrap();
    assert_eq!(book.status, BookStatus::Available);

    let types: Vec<_> = h
        .notifications_for(loan.id)
        .await
        .into_iter()
        .map(|job| job.notification_type)
        .collect();
    assert_eq!(
        types
            .iter()
            .filter(|t| **t == NotificationType::Returned)
            .count(),
        2
    );
    assert_eq!(
        types
            .iter()
            .filter(|t| **t == NotificationType::Borrowed)
            .count(),
        1
    );
}

#[tokio::test]
async fn test_reactivation_rejected_while_book_unavailable() {
    let h = harness();
    let people = h.people(Some("ada@example.com")).await;
    let book_id = h.book().await;
    let first = h.lend(&people, book_id, 14).await;
    h.app
        .lending
        .return_loan(first.id, ReturnLoanRequest::default())
        .await
        .unwrap();

    // Another loan holds the book, overdue counts too
    let second = h.lend(&people, book_id, 14).await;
    h.app
        .lending
        .update_loan_status(second.id, LoanStatus::Overdue)
        .await
        .unwrap();
    let mut rx = h.app.hub.subscribe(LOANS_CHANNEL);
    let err = h
        .app
        .lending
        .update_loan_status(first.id, LoanStatus::Active)
        .await
        .unwrap_err();
    assert!(matches!(err, LendingError::BookUnavailable(_)));

    // Book pulled for maintenance once the holder returns it
    h.app
        .lending
        .return_loan(second.id, ReturnLoanRequest::default())
        .await
        .unwrap();
    h.app
        .catalog
        .update_book_status(book_id, BookStatus::Maintenance)
        .await
        .unwrap();
    drain(&mut rx);
    let err = h
        .app
        .lending
        .update_loan_status(first.id, LoanStatus::Active)
        .await
        .unwrap_err();
    assert!(matches!(err, LendingError::BookUnavailable(_)));

    assert!(drain(&mut rx).is_empty());
    let first = h.app.lending.get_loan(first.id).await.unwrap();
    assert_eq!(first.status, LoanStatus::Returned);
    assert!(first.return_date.is_some());
    let book = h.app.catalog.get_book(book_id).await.unwrap();
    assert_eq!(book.status, BookStatus::Maintenance);
}

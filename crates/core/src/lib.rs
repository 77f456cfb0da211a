// Lending Core
//
// This crate provides the DB-agnostic core of the loan/transaction status-change
// notification pipeline.
//
// Key design decisions:
// - Domain entities (Book, Student, Attendant, Transaction, Loan) are defined here
// - Status transitions are reported by the store (LibraryStore) from inside its write
// - Events are published through an injected EventPublisher; EventBus fans them out
//   inline to EventListeners in registration order
// - Notification rules are a pure function over (entity kind, old, new)
// - Mail rendering and the Mailer seam live here so any worker renders the same bodies
// - Broadcast payloads are a separate public view that never leaks contact details

pub mod telemetry;

// Domain entities
pub mod book;
pub mod loan;
pub mod person;
pub mod stats;
pub mod transaction;

// Pipeline
pub mod broadcast;
pub mod error;
pub mod event_listeners;
pub mod events;
pub mod mail;
pub mod notifications;
pub mod traits;

pub use error::{LendingError, Result};

pub use book::{Book, BookStatus};
pub use loan::{Loan, LoanStatus, DEFAULT_DAILY_FINE};
pub use person::{Attendant, Student};
pub use stats::LibraryStats;
pub use transaction::{Transaction, TransactionStatus, TransactionType};

pub use broadcast::{
    BookSummary, BroadcastMessage, BroadcastPayload, LoanPayload, LoanTransactionSummary,
    PersonSummary, TransactionLoanSummary, TransactionPayload,
};
pub use event_listeners::{EventBus, EventListener, EventPublisher};
pub use events::{
    EntityKind, EntitySnapshot, LoanSnapshot, LoanWithBook, StatusChangeEvent, StatusTransition,
    TransactionSnapshot, CHANNELS, LOANS_CHANNEL, LOAN_STATUS_CHANGED, NEW_STATUS,
    TRANSACTIONS_CHANNEL, TRANSACTION_STATUS_CHANGED,
};
pub use mail::{
    EmailTemplate, InMemoryMailer, LogMailer, MailError, MailRenderer, Mailer, OutgoingEmail,
    DEFAULT_LIBRARY_NAME,
};
pub use notifications::{
    notification_intent, NotificationJob, NotificationType, EMAILS_QUEUE,
    NOTIFICATION_DELAY, NOTIFICATION_MAX_ATTEMPTS, NOTIFICATION_TIMEOUT, SEND_NOTIFICATION_JOB,
};
pub use traits::{
    LibraryStore, LoanUpdate, NewBook, NewLoan, NewPerson, NewTransaction, WriteOutcome,
};

// Public wire view of status change events
//
// Broadcast payloads carry ids and display fields only (no contact details, no
// internal fields). Shape for a loan event:
//
//   { "loan": { id, status, old_status, new_status, loan_date, due_date,
//               return_date?, payment_amount, book: {id, book_title, author},
//               transaction: { id, student: {id, first_name, last_name},
//                              attendant: {id, first_name, last_name} } },
//     "timestamp": "<RFC 3339>" }
//
// Transaction events carry `transaction` with a `loans` array instead.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::book::Book;
use crate::events::{EntitySnapshot, LoanWithBook, StatusChangeEvent};
use crate::loan::LoanStatus;
use crate::person::{Attendant, Student};
use crate::transaction::{TransactionStatus, TransactionType};

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct BookSummary {
    pub id: Uuid,
    pub book_title: String,
    pub author: String,
}

impl From<&Book> for BookSummary {
    fn from(book: &Book) -> Self {
        Self {
            id: book.id,
            book_title: book.title.clone(),
            author: book.author.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct PersonSummary {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
}

impl From<&Student> for PersonSummary {
    fn from(student: &Student) -> Self {
        Self {
            id: student.id,
            first_name: student.first_name.clone(),
            last_name: student.last_name.clone(),
        }
    }
}

impl From<&Attendant> for PersonSummary {
    fn from(attendant: &Attendant) -> Self {
        Self {
            id: attendant.id,
            first_name: attendant.first_name.clone(),
            last_name: attendant.last_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct LoanTransactionSummary {
    pub id: Uuid,
    pub student: Option<PersonSummary>,
    pub attendant: Option<PersonSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct LoanPayload {
    pub id: Uuid,
    pub status: LoanStatus,
    pub old_status: Option<String>,
    pub new_status: String,
    pub loan_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_date: Option<DateTime<Utc>>,
    #[cfg_attr(feature = "openapi", schema(value_type = f64))]
    pub payment_amount: Decimal,
    pub book: Option<BookSummary>,
    pub transaction: Option<LoanTransactionSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct TransactionLoanSummary {
    pub id: Uuid,
    pub status: LoanStatus,
    pub book: Option<BookSummary>,
}

impl From<&LoanWithBook> for TransactionLoanSummary {
    fn from(entry: &LoanWithBook) -> Self {
        Self {
            id: entry.loan.id,
            status: entry.loan.status,
            book: entry.book.as_ref().map(BookSummary::from),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct TransactionPayload {
    pub id: Uuid,
    pub status: TransactionStatus,
    pub old_status: Option<String>,
    pub new_status: String,
    pub transaction_type: TransactionType,
    pub student: Option<PersonSummary>,
    pub attendant: Option<PersonSummary>,
    pub loans: Vec<TransactionLoanSummary>,
}

/// Serialized body of a broadcast message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum BroadcastPayload {
    Loan {
        loan: LoanPayload,
        timestamp: DateTime<Utc>,
    },
    Transaction {
        transaction: TransactionPayload,
        timestamp: DateTime<Utc>,
    },
}

impl BroadcastPayload {
    /// Build the public view of an event
    pub fn from_event(event: &StatusChangeEvent) -> Self {
        match &event.snapshot {
            EntitySnapshot::Loan(snapshot) => BroadcastPayload::Loan {
                loan: LoanPayload {
                    id: snapshot.loan.id,
                    status: snapshot.loan.status,
                    old_status: event.old_status.clone(),
                    new_status: event.new_status.clone(),
                    loan_date: snapshot.loan.loan_date,
                    due_date: snapshot.loan.due_date,
                    return_date: snapshot.loan.return_date,
                    payment_amount: snapshot.loan.payment_amount,
                    book: snapshot.book.as_ref().map(BookSummary::from),
                    transaction: snapshot.transaction.as_ref().map(|transaction| {
                        LoanTransactionSummary {
                            id: transaction.id,
                            student: snapshot.student.as_ref().map(PersonSummary::from),
                            attendant: snapshot.attendant.as_ref().map(PersonSummary::from),
                        }
                    }),
                },
                timestamp: event.occurred_at,
            },
            EntitySnapshot::Transaction(snapshot) => BroadcastPayload::Transaction {
                transaction: TransactionPayload {
                    id: snapshot.transaction.id,
                    status: snapshot.transaction.status,
                    old_status: event.old_status.clone(),
                    new_status: event.new_status.clone(),
                    transaction_type: snapshot.transaction.transaction_type,
                    student: snapshot.student.as_ref().map(PersonSummary::from),
                    attendant: snapshot.attendant.as_ref().map(PersonSummary::from),
                    loans: snapshot
                        .loans
                        .iter()
                        .map(TransactionLoanSummary::from)
                        .collect(),
                },
                timestamp: event.occurred_at,
            },
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            BroadcastPayload::Loan { timestamp, .. } => *timestamp,
            BroadcastPayload::Transaction { timestamp, .. } => *timestamp,
        }
    }

    /// Whether a transaction payload lists any loans. Loan payloads always concern one.
    pub fn has_loans(&self) -> bool {
        match self {
            BroadcastPayload::Loan { .. } => true,
            BroadcastPayload::Transaction { transaction, .. } => !transaction.loans.is_empty(),
        }
    }
}

/// One message as delivered to a channel subscriber.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BroadcastMessage {
    /// Message ID, shared across channels for the same event
    pub id: Uuid,
    pub channel: String,
    /// Dotted event name, e.g. "loan.status.changed"
    pub event: String,
    pub payload: BroadcastPayload,
}

impl BroadcastMessage {
    pub fn for_channel(channel: &str, event: &StatusChangeEvent) -> Self {
        Self {
            id: event.id,
            channel: channel.to_string(),
            event: event.event_type.clone(),
            payload: BroadcastPayload::from_event(event),
        }
    }
}

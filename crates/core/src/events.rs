// Status change events
//
// A StatusChangeEvent is built once per committed status transition on a Loan or
// Transaction, handed to every subscriber on the event bus, then dropped. It is
// never persisted.
//
// Event type naming: dotted "<entity>.status.changed".
// Every event is relevant to both dashboard channels, so channels() always
// returns `loans` and `transactions`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::book::Book;
use crate::loan::{Loan, LoanStatus};
use crate::person::{Attendant, Student};
use crate::transaction::{Transaction, TransactionStatus};

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

// ============================================================================
// Event type constants
// ============================================================================

pub const LOAN_STATUS_CHANGED: &str = "loan.status.changed";
pub const TRANSACTION_STATUS_CHANGED: &str = "transaction.status.changed";

/// Broadcast channel carrying loan-related updates
pub const LOANS_CHANNEL: &str = "loans";
/// Broadcast channel carrying transaction-related updates
pub const TRANSACTIONS_CHANNEL: &str = "transactions";

/// Every channel a dashboard may subscribe to
pub const CHANNELS: [&str; 2] = [LOANS_CHANNEL, TRANSACTIONS_CHANNEL];

/// Sentinel old status reported when a loan is created
pub const NEW_STATUS: &str = "new";

// ============================================================================
// Entity kind
// ============================================================================

/// Which entity a status event or notification refers to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Loan,
    Transaction,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Loan => "loan",
            EntityKind::Transaction => "transaction",
        }
    }

    /// Dotted event name published for status changes of this kind
    pub fn event_type(&self) -> &'static str {
        match self {
            EntityKind::Loan => LOAN_STATUS_CHANGED,
            EntityKind::Transaction => TRANSACTION_STATUS_CHANGED,
        }
    }

    /// Channels an event of this kind is published to, primary channel first
    pub fn channels(&self) -> [&'static str; 2] {
        match self {
            EntityKind::Loan => [LOANS_CHANNEL, TRANSACTIONS_CHANNEL],
            EntityKind::Transaction => [TRANSACTIONS_CHANNEL, LOANS_CHANNEL],
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Transitions
// ============================================================================

/// Old/new status pair observed by a single write.
///
/// Stores produce this from the value they read and the value they wrote inside
/// the same critical section, so each writer sees its own pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusTransition<S> {
    pub old: S,
    pub new: S,
}

impl<S: PartialEq> StatusTransition<S> {
    /// Returns a transition only when the status actually changes
    pub fn between(old: S, new: S) -> Option<Self> {
        if old == new {
            None
        } else {
            Some(Self { old, new })
        }
    }
}

// ============================================================================
// Snapshots
// ============================================================================

/// A loan together with its book.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoanWithBook {
    pub loan: Loan,
    pub book: Option<Book>,
}

/// Loan aggregate loaded right after the write: book, transaction and the
/// transaction's student and attendant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoanSnapshot {
    pub loan: Loan,
    pub book: Option<Book>,
    pub transaction: Option<Transaction>,
    pub student: Option<Student>,
    pub attendant: Option<Attendant>,
}

/// Transaction aggregate: student, attendant and every child loan with its book.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransactionSnapshot {
    pub transaction: Transaction,
    pub student: Option<Student>,
    pub attendant: Option<Attendant>,
    pub loans: Vec<LoanWithBook>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EntitySnapshot {
    Loan(LoanSnapshot),
    Transaction(TransactionSnapshot),
}

impl EntitySnapshot {
    pub fn student(&self) -> Option<&Student> {
        match self {
            EntitySnapshot::Loan(s) => s.student.as_ref(),
            EntitySnapshot::Transaction(s) => s.student.as_ref(),
        }
    }
}

// ============================================================================
// StatusChangeEvent
// ============================================================================

/// A committed status transition with the related aggregate attached.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusChangeEvent {
    /// Event ID (UUID v7)
    pub id: Uuid,

    /// Dotted event type, e.g. "loan.status.changed"
    #[serde(rename = "type")]
    pub event_type: String,

    pub entity_kind: EntityKind,
    pub entity_id: Uuid,

    /// Previous status. `None` when the entity had no status; "new" for loan creation.
    pub old_status: Option<String>,
    pub new_status: String,

    pub snapshot: EntitySnapshot,

    /// When the transition was committed
    pub occurred_at: DateTime<Utc>,
}

impl StatusChangeEvent {
    /// Loan transition. `old_status` is [`NEW_STATUS`] for a freshly created loan.
    pub fn loan(old_status: Option<String>, new_status: LoanStatus, snapshot: LoanSnapshot) -> Self {
        Self {
            id: Uuid::now_v7(),
            event_type: LOAN_STATUS_CHANGED.to_string(),
            entity_kind: EntityKind::Loan,
            entity_id: snapshot.loan.id,
            old_status,
            new_status: new_status.to_string(),
            snapshot: EntitySnapshot::Loan(snapshot),
            occurred_at: Utc::now(),
        }
    }

    /// Transaction transition
    pub fn transaction(
        transition: StatusTransition<TransactionStatus>,
        snapshot: TransactionSnapshot,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            event_type: TRANSACTION_STATUS_CHANGED.to_string(),
            entity_kind: EntityKind::Transaction,
            entity_id: snapshot.transaction.id,
            old_status: Some(transition.old.to_string()),
            new_status: transition.new.to_string(),
            snapshot: EntitySnapshot::Transaction(snapshot),
            occurred_at: Utc::now(),
        }
    }

    /// Channels this event is broadcast on
    pub fn channels(&self) -> [&'static str; 2] {
        self.entity_kind.channels()
    }

    /// Check if this is an event of a specific type
    pub fn is_type(&self, event_type: &str) -> bool {
        self.event_type == event_type
    }
}

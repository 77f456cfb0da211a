// Storage seam for the lending domain
//
// Decision: Status writes return the observed transition from inside the
// store's critical section. The read of the old status, the write and the diff
// happen atomically, so concurrent writers each get their own consistent pair
// and per-entity events follow commit order.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::book::{Book, BookStatus};
use crate::error::Result;
use crate::events::StatusTransition;
use crate::loan::{Loan, LoanStatus};
use crate::person::{Attendant, Student};
use crate::stats::LibraryStats;
use crate::transaction::{Transaction, TransactionStatus, TransactionType};

// ============================================================================
// Inputs
// ============================================================================

#[derive(Debug, Clone)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub status: BookStatus,
}

/// Input shared by students and attendants
#[derive(Debug, Clone)]
pub struct NewPerson {
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub student_id: Uuid,
    pub attendant_id: Uuid,
    pub transaction_date: DateTime<Utc>,
    pub transaction_type: TransactionType,
    pub status: TransactionStatus,
}

/// A loan together with the borrow transaction it is recorded under.
/// Both are created in one store write or not at all.
#[derive(Debug, Clone)]
pub struct NewLoan {
    pub book_id: Uuid,
    pub transaction: NewTransaction,
    pub loan_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub status: LoanStatus,
}

/// Partial loan update. `None` fields are left unchanged.
///
/// When `status` equals the stored status nothing is written at all, so a
/// losing writer cannot overwrite the winner's fields.
#[derive(Debug, Clone, Default)]
pub struct LoanUpdate {
    pub status: Option<LoanStatus>,
    /// Recorded when the loan moves to `returned`. Defaults to the write time.
    pub return_date: Option<DateTime<Utc>>,
    pub payment_amount: Option<Decimal>,
}

/// Result of a status-bearing write.
#[derive(Debug, Clone)]
pub struct WriteOutcome<T, S> {
    /// Record as persisted
    pub record: T,
    /// Present only when the persisted status differs from the previous one
    pub transition: Option<StatusTransition<S>>,
}

// ============================================================================
// LibraryStore Trait
// ============================================================================

/// Entity persistence consumed by the lending services.
#[async_trait]
pub trait LibraryStore: Send + Sync {
    // Books
    async fn create_book(&self, input: NewBook) -> Result<Book>;
    async fn get_book(&self, id: Uuid) -> Result<Option<Book>>;
    async fn list_books(&self) -> Result<Vec<Book>>;

    /// Set a book's shelf status.
    ///
    /// `borrowed` is owned by loans and cannot be set directly. Any other
    /// status fails with `BookUnavailable` while a loan holds the book.
    async fn update_book_status(&self, id: Uuid, status: BookStatus) -> Result<Book>;

    // People
    async fn create_student(&self, input: NewPerson) -> Result<Student>;
    async fn get_student(&self, id: Uuid) -> Result<Option<Student>>;
    async fn create_attendant(&self, input: NewPerson) -> Result<Attendant>;
    async fn get_attendant(&self, id: Uuid) -> Result<Option<Attendant>>;

    // Transactions
    async fn create_transaction(&self, input: NewTransaction) -> Result<Transaction>;
    async fn get_transaction(&self, id: Uuid) -> Result<Option<Transaction>>;
    async fn list_transactions(&self) -> Result<Vec<Transaction>>;

    /// Set the status and report the transition observed by this write
    async fn update_transaction_status(
        &self,
        id: Uuid,
        status: TransactionStatus,
    ) -> Result<WriteOutcome<Transaction, TransactionStatus>>;

    // Loans

    /// Insert the borrow transaction and the loan, and mark the book borrowed,
    /// in one step.
    ///
    /// Fails with `BookUnavailable` if the book is not available or another
    /// loan still holds it. A failed call leaves no transaction behind.
    async fn create_loan(&self, input: NewLoan) -> Result<Loan>;
    async fn get_loan(&self, id: Uuid) -> Result<Option<Loan>>;
    async fn list_loans(&self) -> Result<Vec<Loan>>;
    async fn loans_for_transaction(&self, transaction_id: Uuid) -> Result<Vec<Loan>>;

    /// Apply a partial update and report the transition observed by this write.
    ///
    /// The book follows the loan: moving to `returned` makes it available and
    /// sets the return date; moving out of `returned` clears the return date
    /// and borrows the book again. Reopening fails with `BookUnavailable` when
    /// the book is under maintenance or another loan holds it.
    async fn update_loan(
        &self,
        id: Uuid,
        update: LoanUpdate,
    ) -> Result<WriteOutcome<Loan, LoanStatus>>;

    /// Aggregate counters as of `now`
    async fn stats(&self, now: DateTime<Utc>) -> Result<LibraryStats>;
}

// Lending service: loans and transactions
//
// Every status-bearing write goes through here. The store reports the
// transition it observed inside its critical section; the service emits an
// event only for real transitions and only after the write committed.

use chrono::Utc;
use lendwise_core::{
    LendingError, LibraryStore, Loan, LoanStatus, LoanUpdate, NewLoan, NewTransaction, Result, Transaction, TransactionStatus, TransactionType, NEW_STATUS,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use super::emitter::StatusEventEmitter;
use crate::api::loans::{CreateLoanRequest, ReturnLoanRequest};
use crate::api::transactions::CreateTransactionRequest;

pub struct LendingService {
    store: Arc<dyn LibraryStore>,
    emitter: StatusEventEmitter,
}

impl LendingService {
    pub fn new(store: Arc<dyn LibraryStore>, emitter: StatusEventEmitter) -> Self {
        Self { store, emitter }
    }

    // ============================================
    // Loans
    // ============================================

    /// Lend a book: records a completed borrow transaction, the active loan
    /// and marks the book borrowed, all in one store write.
    #[instrument(skip(self, req), fields(book_id = %req.book_id, student_id = %req.student_id))]
    pub async fn create_loan(&self, req: CreateLoanRequest) -> Result<Loan> {
        let loan_date = req.loan_date.unwrap_or_else(Utc::now);
        if req.due_date <= loan_date {
            return Err(LendingError::validation("due_date must be after loan_date"));
        }

        self.require_student(req.student_id).await?;
        self.require_attendant(req.attendant_id).await?;
        let book = self
            .store
            .get_book(req.book_id)
            .await?
            .ok_or_else(|| LendingError::not_found("Book", req.book_id))?;
        if !book.is_available() {
            return Err(LendingError::BookUnavailable(book.id));
        }

        let loan = self
            .store
            .create_loan(NewLoan {
                book_id: book.id,
                transaction: NewTransaction {
                    student_id: req.student_id,
                    attendant_id: req.attendant_id,
                    transaction_date: loan_date,
                    transaction_type: TransactionType::Borrow,
                    status: TransactionStatus::Completed,
                },
                loan_date,
                due_date: req.due_date,
                status: LoanStatus::Active,
            })
            .await?;

        info!(loan_id = %loan.id, transaction_id = %loan.transaction_id, "Loan created");
        self.emitter
            .loan_changed(&loan, Some(NEW_STATUS.to_string()), loan.status)
            .await;

        Ok(loan)
    }

    /// Return a loaned book, recording an optional payment
    #[instrument(skip(self, req))]
    pub async fn return_loan(&self, id: Uuid, req: ReturnLoanRequest) -> Result<Loan> {
        let payment = req.payment_amount.unwrap_or(Decimal::ZERO);
        if payment < Decimal::ZERO {
            return Err(LendingError::validation("payment_amount must not be negative"));
        }

        let loan = self.require_loan(id).await?;
        if loan.is_returned() {
            return Err(LendingError::validation(format!(
                "Loan {} has already been returned",
                id
            )));
        }

        let borrow = self
            .store
            .get_transaction(loan.transaction_id)
            .await?
            .ok_or_else(|| LendingError::not_found("Transaction", loan.transaction_id))?;
        let attendant_id = match req.attendant_id {
            Some(attendant_id) => {
                self.require_attendant(attendant_id).await?;
                attendant_id
            }
            None => borrow.attendant_id,
        };

        let now = Utc::now();
        let outcome = self
            .store
            .update_loan(
                id,
                LoanUpdate {
                    status: Some(LoanStatus::Returned),
                    return_date: Some(now),
                    payment_amount: Some(payment),
                },
            )
            .await?;

        let Some(transition) = outcome.transition else {
            // A concurrent return won the race and its fields stand
            return Err(LendingError::validation(format!(
                "Loan {} has already been returned",
                id
            )));
        };

        self.store
            .create_transaction(NewTransaction {
                student_id: borrow.student_id,
                attendant_id,
                transaction_date: now,
                transaction_type: TransactionType::Return,
                status: TransactionStatus::Completed,
            })
            .await?;

        info!(loan_id = %id, payment = %payment, late = outcome.record.returned_late(), "Loan returned");
        self.emitter
            .loan_changed(
                &outcome.record,
                Some(transition.old.to_string()),
                transition.new,
            )
            .await;

        Ok(outcome.record)
    }

    /// Set a loan's status directly. Writing the current status is a no-op
    /// and emits nothing. The store keeps the book and return date in step.
    #[instrument(skip(self))]
    pub async fn update_loan_status(&self, id: Uuid, status: LoanStatus) -> Result<Loan> {
        let outcome = self
            .store
            .update_loan(
                id,
                LoanUpdate {
                    status: Some(status),
                    ..Default::default()
                },
            )
            .await?;
        if let Some(transition) = outcome.transition {
            self.emitter
                .loan_changed(
                    &outcome.record,
                    Some(transition.old.to_string()),
                    transition.new,
                )
                .await;
        }

        Ok(outcome.record)
    }

    pub async fn get_loan(&self, id: Uuid) -> Result<Loan> {
        self.require_loan(id).await
    }

    pub async fn list_loans(&self) -> Result<Vec<Loan>> {
        self.store.list_loans().await
    }

    // ============================================
    // Transactions
    // ============================================

    /// Record a transaction. Creation emits nothing; only status updates do.
    pub async fn create_transaction(&self, req: CreateTransactionRequest) -> Result<Transaction> {
        self.require_student(req.student_id).await?;
        self.require_attendant(req.attendant_id).await?;

        self.store
            .create_transaction(NewTransaction {
                student_id: req.student_id,
                attendant_id: req.attendant_id,
                transaction_date: req.transaction_date.unwrap_or_else(Utc::now),
                transaction_type: req.transaction_type,
                status: req.status.unwrap_or_default(),
            })
            .await
    }

    /// Change a transaction's status. Writing the current status is rejected
    /// with `StatusUnchanged`.
    #[instrument(skip(self))]
    pub async fn update_transaction_status(
        &self,
        id: Uuid,
        status: TransactionStatus,
    ) -> Result<Transaction> {
        let outcome = self.store.update_transaction_status(id, status).await?;

        match outcome.transition {
            Some(transition) => {
                info!(transaction_id = %id, old = %transition.old, new = %transition.new, "Transaction status changed");
                self.emitter
                    .transaction_changed(&outcome.record, transition)
                    .await;
                Ok(outcome.record)
            }
            None => Err(LendingError::StatusUnchanged {
                kind: "Transaction",
                id,
                status: status.to_string(),
            }),
        }
    }

    pub async fn get_transaction(&self, id: Uuid) -> Result<Transaction> {
        self.store
            .get_transaction(id)
            .await?
            .ok_or_else(|| LendingError::not_found("Transaction", id))
    }

    pub async fn list_transactions(&self) -> Result<Vec<Transaction>> {
        self.store.list_transactions().await
    }

    // ============================================
    // Lookups
    // ============================================

    async fn require_loan(&self, id: Uuid) -> Result<Loan> {
        self.store
            .get_loan(id)
            .await?
            .ok_or_else(|| LendingError::not_found("Loan", id))
    }

    async fn require_student(&self, id: Uuid) -> Result<()> {
        self.store
            .get_student(id)
            .await?
            .map(|_| ())
            .ok_or_else(|| LendingError::not_found("Student", id))
    }

    async fn require_attendant(&self, id: Uuid) -> Result<()> {
        self.store
            .get_attendant(id)
            .await?
            .map(|_| ())
            .ok_or_else(|| LendingError::not_found("Attendant", id))
    }
}

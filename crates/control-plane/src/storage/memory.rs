// In-memory library store
// Decision: Use parking_lot for thread-safe access
// Decision: One lock over all tables so a loan write and its book status change are
// a single atomic step, and the old/new status pair is read and written together.
//
// Entity data lives in memory and is lost on restart.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lendwise_core::{
    Attendant, Book, BookStatus, LendingError, LibraryStats, LibraryStore, Loan, LoanStatus,
    LoanUpdate, NewBook, NewLoan, NewPerson, NewTransaction, Result, StatusTransition, Student,
    Transaction, TransactionStatus, WriteOutcome,
};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::{debug, instrument};
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    books: HashMap<Uuid, Book>,
    students: HashMap<Uuid, Student>,
    attendants: HashMap<Uuid, Attendant>,
    transactions: HashMap<Uuid, Transaction>,
    loans: HashMap<Uuid, Loan>,
}

impl Tables {
    /// Whether an unreturned loan other than `except` holds the book
    fn book_is_held(&self, book_id: Uuid, except: Option<Uuid>) -> bool {
        self.loans
            .values()
            .any(|l| l.book_id == book_id && l.holds_book() && Some(l.id) != except)
    }

    fn insert_transaction(&mut self, input: NewTransaction, now: DateTime<Utc>) -> Transaction {
        let transaction = Transaction {
            id: Uuid::now_v7(),
            student_id: input.student_id,
            attendant_id: input.attendant_id,
            transaction_date: input.transaction_date,
            transaction_type: input.transaction_type,
            status: input.status,
            created_at: now,
            updated_at: now,
        };
        self.transactions.insert(transaction.id, transaction.clone());
        transaction
    }

    fn set_book_status(&mut self, book_id: Uuid, status: BookStatus) {
        if let Some(book) = self.books.get_mut(&book_id) {
            book.status = status;
        }
    }
}

/// Newest first; ids are UUIDv7
fn newest_first<T: Clone>(rows: &HashMap<Uuid, T>) -> Vec<T> {
    let mut ids: Vec<&Uuid> = rows.keys().collect();
    ids.sort_unstable_by(|a, b| b.cmp(a));
    ids.into_iter().map(|id| rows[id].clone()).collect()
}

/// In-memory implementation of [`LibraryStore`]
#[derive(Default)]
pub struct InMemoryLibraryStore {
    tables: RwLock<Tables>,
}

impl InMemoryLibraryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn now() -> DateTime<Utc> {
        Utc::now()
    }
}

#[async_trait]
impl LibraryStore for InMemoryLibraryStore {
    // ============================================
    // Books
    // ============================================

    async fn create_book(&self, input: NewBook) -> Result<Book> {
        let book = Book {
            id: Uuid::now_v7(),
            title: input.title,
            author: input.author,
            status: input.status,
            created_at: Self::now(),
        };
        self.tables.write().books.insert(book.id, book.clone());
        Ok(book)
    }

    async fn get_book(&self, id: Uuid) -> Result<Option<Book>> {
        Ok(self.tables.read().books.get(&id).cloned())
    }

    async fn list_books(&self) -> Result<Vec<Book>> {
        Ok(newest_first(&self.tables.read().books))
    }

    #[instrument(skip(self))]
    async fn update_book_status(&self, id: Uuid, status: BookStatus) -> Result<Book> {
        if status == BookStatus::Borrowed {
            return Err(LendingError::validation(
                "books become borrowed through loans only",
            ));
        }

        let mut tables = self.tables.write();
        if !tables.books.contains_key(&id) {
            return Err(LendingError::not_found("Book", id));
        }
        if tables.book_is_held(id, None) {
            return Err(LendingError::BookUnavailable(id));
        }

        tables.set_book_status(id, status);
        debug!(book_id = %id, status = %status, "book status written");
        tables
            .books
            .get(&id)
            .cloned()
            .ok_or_else(|| LendingError::not_found("Book", id))
    }

    // ============================================
    // People
    // ============================================

    async fn create_student(&self, input: NewPerson) -> Result<Student> {
        let student = Student {
            id: Uuid::now_v7(),
            first_name: input.first_name,
            last_name: input.last_name,
            email: input.email,
            created_at: Self::now(),
        };
        self.tables
            .write()
            .students
            .insert(student.id, student.clone());
        Ok(student)
    }

    async fn get_student(&self, id: Uuid) -> Result<Option<Student>> {
        Ok(self.tables.read().students.get(&id).cloned())
    }

    async fn create_attendant(&self, input: NewPerson) -> Result<Attendant> {
        let attendant = Attendant {
            id: Uuid::now_v7(),
            first_name: input.first_name,
            last_name: input.last_name,
            email: input.email,
            created_at: Self::now(),
        };
        self.tables
            .write()
            .attendants
            .insert(attendant.id, attendant.clone());
        Ok(attendant)
    }

    async fn get_attendant(&self, id: Uuid) -> Result<Option<Attendant>> {
        Ok(self.tables.read().attendants.get(&id).cloned())
    }

    // ============================================
    // Transactions
    // ============================================

    async fn create_transaction(&self, input: NewTransaction) -> Result<Transaction> {
        Ok(self.tables.write().insert_transaction(input, Self::now()))
    }

    async fn get_transaction(&self, id: Uuid) -> Result<Option<Transaction>> {
        Ok(self.tables.read().transactions.get(&id).cloned())
    }

    async fn list_transactions(&self) -> Result<Vec<Transaction>> {
        Ok(newest_first(&self.tables.read().transactions))
    }

    #[instrument(skip(self))]
    async fn update_transaction_status(
        &self,
        id: Uuid,
        status: TransactionStatus,
    ) -> Result<WriteOutcome<Transaction, TransactionStatus>> {
        let mut tables = self.tables.write();
        let transaction = tables
            .transactions
            .get_mut(&id)
            .ok_or_else(|| LendingError::not_found("Transaction", id))?;

        let transition = StatusTransition::between(transaction.status, status);
        if transition.is_some() {
            transaction.status = status;
            transaction.updated_at = Self::now();
        }
        debug!(transaction_id = %id, changed = transition.is_some(), "transaction status written");

        Ok(WriteOutcome {
            record: transaction.clone(),
            transition,
        })
    }

    // ============================================
    // Loans
    // ============================================

    #[instrument(skip(self, input), fields(book_id = %input.book_id))]
    async fn create_loan(&self, input: NewLoan) -> Result<Loan> {
        let mut tables = self.tables.write();

        // Every check runs before the first insert so a rejection writes nothing
        let book_available = tables
            .books
            .get(&input.book_id)
            .ok_or_else(|| LendingError::not_found("Book", input.book_id))?
            .is_available();
        if !book_available || tables.book_is_held(input.book_id, None) {
            return Err(LendingError::BookUnavailable(input.book_id));
        }

        let now = Self::now();
        let transaction = tables.insert_transaction(input.transaction, now);
        let loan = Loan {
            id: Uuid::now_v7(),
            book_id: input.book_id,
            transaction_id: transaction.id,
            loan_date: input.loan_date,
            due_date: input.due_date,
            return_date: None,
            status: input.status,
            payment_amount: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        };
        tables.loans.insert(loan.id, loan.clone());
        tables.set_book_status(input.book_id, BookStatus::Borrowed);

        debug!(loan_id = %loan.id, transaction_id = %transaction.id, "loan created, book borrowed");
        Ok(loan)
    }

    async fn get_loan(&self, id: Uuid) -> Result<Option<Loan>> {
        Ok(self.tables.read().loans.get(&id).cloned())
    }

    async fn list_loans(&self) -> Result<Vec<Loan>> {
        Ok(newest_first(&self.tables.read().loans))
    }

    async fn loans_for_transaction(&self, transaction_id: Uuid) -> Result<Vec<Loan>> {
        let mut loans: Vec<Loan> = self
            .tables
            .read()
            .loans
            .values()
            .filter(|l| l.transaction_id == transaction_id)
            .cloned()
            .collect();
        loans.sort_by_key(|l| l.id);
        Ok(loans)
    }

    #[instrument(skip(self, update))]
    async fn update_loan(
        &self,
        id: Uuid,
        update: LoanUpdate,
    ) -> Result<WriteOutcome<Loan, LoanStatus>> {
        let mut tables = self.tables.write();
        let current = tables
            .loans
            .get(&id)
            .cloned()
            .ok_or_else(|| LendingError::not_found("Loan", id))?;

        // Compare-and-set: rewriting the stored status changes nothing
        if update.status == Some(current.status) {
            debug!(loan_id = %id, changed = false, "loan status unchanged");
            return Ok(WriteOutcome {
                record: current,
                transition: None,
            });
        }

        let transition = update
            .status
            .and_then(|status| StatusTransition::between(current.status, status));
        let closing = transition.is_some_and(|t| t.new == LoanStatus::Returned);
        let reopening = transition.is_some_and(|t| t.old == LoanStatus::Returned);

        if reopening {
            let in_maintenance = tables
                .books
                .get(&current.book_id)
                .is_some_and(|book| book.status == BookStatus::Maintenance);
            if in_maintenance || tables.book_is_held(current.book_id, Some(id)) {
                return Err(LendingError::BookUnavailable(current.book_id));
            }
        }

        let now = Self::now();
        let record = {
            let loan = tables
                .loans
                .get_mut(&id)
                .ok_or_else(|| LendingError::not_found("Loan", id))?;
            if let Some(transition) = transition {
                loan.status = transition.new;
            }
            if closing {
                loan.return_date = Some(update.return_date.unwrap_or(now));
            }
            if reopening {
                loan.return_date = None;
            }
            if let Some(payment) = update.payment_amount {
                loan.payment_amount = payment;
            }
            loan.updated_at = now;
            loan.clone()
        };

        if closing {
            tables.set_book_status(current.book_id, BookStatus::Available);
        }
        if reopening {
            tables.set_book_status(current.book_id, BookStatus::Borrowed);
        }

        debug!(loan_id = %id, changed = transition.is_some(), "loan written");
        Ok(WriteOutcome { record, transition })
    }

    async fn stats(&self, now: DateTime<Utc>) -> Result<LibraryStats> {
        let tables = self.tables.read();
        Ok(LibraryStats::compute(
            tables.loans.values(),
            tables.books.values(),
            now,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use lendwise_core::TransactionType;
    use std::sync::Arc;

    async fn seed(store: &InMemoryLibraryStore) -> Book {
        store
            .create_book(NewBook {
                title: "Dune".to_string(),
                author: "Frank Herbert".to_string(),
                status: BookStatus::Available,
            })
            .await
            .unwrap()
    }

    fn new_loan(book: &Book) -> NewLoan {
        NewLoan {
            book_id: book.id,
            transaction: NewTransaction {
                student_id: Uuid::now_v7(),
                attendant_id: Uuid::now_v7(),
                transaction_date: Utc::now(),
                transaction_type: TransactionType::Borrow,
                status: TransactionStatus::Completed,
            },
            loan_date: Utc::now(),
            due_date: Utc::now() + Duration::days(14),
            status: LoanStatus::Active,
        }
    }

    fn to_status(status: LoanStatus) -> LoanUpdate {
        LoanUpdate {
            status: Some(status),
            ..Default::default()
        }
    }

    async fn book_status(store: &InMemoryLibraryStore, id: Uuid) -> BookStatus {
        store.get_book(id).await.unwrap().unwrap().status
    }

    #[tokio::test]
    async fn test_create_loan_records_transaction_and_borrows_book() {
        let store = InMemoryLibraryStore::new();
        let book = seed(&store).await;

        let loan = store.create_loan(new_loan(&book)).await.unwrap();
        assert_eq!(loan.status, LoanStatus::Active);
        assert_eq!(loan.payment_amount, Decimal::ZERO);

        let transaction = store
            .get_transaction(loan.transaction_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(transaction.transaction_type, TransactionType::Borrow);
        assert_eq!(
            store.loans_for_transaction(transaction.id).await.unwrap(),
            vec![loan]
        );
        assert_eq!(book_status(&store, book.id).await, BookStatus::Borrowed);
    }

    #[tokio::test]
    async fn test_rejected_loan_leaves_no_transaction() {
        let store = InMemoryLibraryStore::new();
        let book = seed(&store).await;
        store.create_loan(new_loan(&book)).await.unwrap();

        let err = store.create_loan(new_loan(&book)).await.unwrap_err();
        assert!(matches!(err, LendingError::BookUnavailable(id) if id == book.id));
        assert_eq!(store.list_loans().await.unwrap().len(), 1);
        assert_eq!(store.list_transactions().await.unwrap().len(), 1);

        let mut input = new_loan(&book);
        input.book_id = Uuid::now_v7();
        assert!(matches!(
            store.create_loan(input).await,
            Err(LendingError::NotFound { kind: "Book", .. })
        ));
        assert_eq!(store.list_transactions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_loans_on_one_book_record_one_borrow() {
        let store = Arc::new(InMemoryLibraryStore::new());
        let book = seed(&store).await;

        let mut handles = vec![];
        for _ in 0..8 {
            let store = store.clone();
            let input = new_loan(&book);
            handles.push(tokio::spawn(async move { store.create_loan(input).await }));
        }

        let mut created = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => created += 1,
                Err(e) => assert!(matches!(e, LendingError::BookUnavailable(_))),
            }
        }
        assert_eq!(created, 1);
        assert_eq!(store.list_transactions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_loan_reports_transition_only_on_change() {
        let store = InMemoryLibraryStore::new();
        let book = seed(&store).await;
        let loan = store.create_loan(new_loan(&book)).await.unwrap();

        let same = store
            .update_loan(loan.id, to_status(LoanStatus::Active))
            .await
            .unwrap();
        assert!(same.transition.is_none());

        let returned_at = Utc::now();
        let returned = store
            .update_loan(
                loan.id,
                LoanUpdate {
                    status: Some(LoanStatus::Returned),
                    return_date: Some(returned_at),
                    payment_amount: Some(Decimal::new(3000, 2)),
                },
            )
            .await
            .unwrap();
        let transition = returned.transition.unwrap();
        assert_eq!(transition.old, LoanStatus::Active);
        assert_eq!(transition.new, LoanStatus::Returned);
        assert_eq!(returned.record.payment_amount, Decimal::new(3000, 2));
        assert_eq!(returned.record.return_date, Some(returned_at));
        assert_eq!(book_status(&store, book.id).await, BookStatus::Available);
    }

    #[tokio::test]
    async fn test_repeated_return_writes_nothing() {
        let store = InMemoryLibraryStore::new();
        let book = seed(&store).await;
        let loan = store.create_loan(new_loan(&book)).await.unwrap();

        let first = store
            .update_loan(
                loan.id,
                LoanUpdate {
                    status: Some(LoanStatus::Returned),
                    return_date: Some(Utc::now()),
                    payment_amount: Some(Decimal::new(500, 2)),
                },
            )
            .await
            .unwrap();

        let second = store
            .update_loan(
                loan.id,
                LoanUpdate {
                    status: Some(LoanStatus::Returned),
                    return_date: Some(Utc::now() + Duration::hours(1)),
                    payment_amount: Some(Decimal::new(9900, 2)),
                },
            )
            .await
            .unwrap();
        assert!(second.transition.is_none());
        assert_eq!(second.record, first.record);
        assert_eq!(store.get_loan(loan.id).await.unwrap().unwrap(), first.record);
    }

    #[tokio::test]
    async fn test_return_reactivate_return_round_trip() {
        let store = InMemoryLibraryStore::new();
        let book = seed(&store).await;
        let loan = store.create_loan(new_loan(&book)).await.unwrap();

        let returned = store
            .update_loan(loan.id, to_status(LoanStatus::Returned))
            .await
            .unwrap();
        let first_return = returned.record.return_date.unwrap();
        assert_eq!(book_status(&store, book.id).await, BookStatus::Available);

        let reopened = store
            .update_loan(loan.id, to_status(LoanStatus::Active))
            .await
            .unwrap();
        assert_eq!(reopened.record.return_date, None);
        assert_eq!(book_status(&store, book.id).await, BookStatus::Borrowed);

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let returned_again = store
            .update_loan(loan.id, to_status(LoanStatus::Returned))
            .await
            .unwrap();
        assert!(returned_again.transition.is_some());
        assert!(returned_again.record.return_date.unwrap() > first_return);
        assert_eq!(book_status(&store, book.id).await, BookStatus::Available);
    }

    #[tokio::test]
    async fn test_returned_to_overdue_borrows_book_again() {
        let store = InMemoryLibraryStore::new();
        let book = seed(&store).await;
        let loan = store.create_loan(new_loan(&book)).await.unwrap();
        store
            .update_loan(loan.id, to_status(LoanStatus::Returned))
            .await
            .unwrap();

        let outcome = store
            .update_loan(loan.id, to_status(LoanStatus::Overdue))
            .await
            .unwrap();
        assert_eq!(outcome.record.return_date, None);
        assert_eq!(book_status(&store, book.id).await, BookStatus::Borrowed);

        // Overdue still holds the book
        assert!(matches!(
            store.create_loan(new_loan(&book)).await,
            Err(LendingError::BookUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_reactivation_blocked_by_other_holder() {
        let store = InMemoryLibraryStore::new();
        let book = seed(&store).await;
        let first = store.create_loan(new_loan(&book)).await.unwrap();
        store
            .update_loan(first.id, to_status(LoanStatus::Returned))
            .await
            .unwrap();

        let second = store.create_loan(new_loan(&book)).await.unwrap();
        store
            .update_loan(second.id, to_status(LoanStatus::Overdue))
            .await
            .unwrap();

        for status in [LoanStatus::Active, LoanStatus::Overdue] {
            let err = store.update_loan(first.id, to_status(status)).await.unwrap_err();
            assert!(matches!(err, LendingError::BookUnavailable(id) if id == book.id));
        }

        let first = store.get_loan(first.id).await.unwrap().unwrap();
        assert_eq!(first.status, LoanStatus::Returned);
        assert!(first.return_date.is_some());
        assert_eq!(book_status(&store, book.id).await, BookStatus::Borrowed);
    }

    #[tokio::test]
    async fn test_reactivation_blocked_by_maintenance() {
        let store = InMemoryLibraryStore::new();
        let book = seed(&store).await;
        let loan = store.create_loan(new_loan(&book)).await.unwrap();

        // Held books cannot be pulled from circulation
        assert!(matches!(
            store
                .update_book_status(book.id, BookStatus::Maintenance)
                .await,
            Err(LendingError::BookUnavailable(_))
        ));

        store
            .update_loan(loan.id, to_status(LoanStatus::Returned))
            .await
            .unwrap();
        let book = store
            .update_book_status(book.id, BookStatus::Maintenance)
            .await
            .unwrap();
        assert_eq!(book.status, BookStatus::Maintenance);

        let err = store
            .update_loan(loan.id, to_status(LoanStatus::Active))
            .await
            .unwrap_err();
        assert!(matches!(err, LendingError::BookUnavailable(_)));
        assert_eq!(book_status(&store, book.id).await, BookStatus::Maintenance);
        assert_eq!(
            store.get_loan(loan.id).await.unwrap().unwrap().status,
            LoanStatus::Returned
        );
    }

    #[tokio::test]
    async fn test_update_book_status_rules() {
        let store = InMemoryLibraryStore::new();
        let book = seed(&store).await;

        assert!(matches!(
            store.update_book_status(book.id, BookStatus::Borrowed).await,
            Err(LendingError::Validation(_))
        ));
        assert!(matches!(
            store
                .update_book_status(Uuid::now_v7(), BookStatus::Available)
                .await,
            Err(LendingError::NotFound { kind: "Book", .. })
        ));

        store
            .update_book_status(book.id, BookStatus::Maintenance)
            .await
            .unwrap();
        assert!(matches!(
            store.create_loan(new_loan(&book)).await,
            Err(LendingError::BookUnavailable(_))
        ));

        store
            .update_book_status(book.id, BookStatus::Available)
            .await
            .unwrap();
        store.create_loan(new_loan(&book)).await.unwrap();
    }

    #[tokio::test]
    async fn test_update_transaction_status() {
        let store = InMemoryLibraryStore::new();
        let transaction = store
            .create_transaction(NewTransaction {
                status: TransactionStatus::Pending,
                ..new_loan(&seed(&store).await).transaction
            })
            .await
            .unwrap();

        let outcome = store
            .update_transaction_status(transaction.id, TransactionStatus::Completed)
            .await
            .unwrap();
        assert_eq!(outcome.record.status, TransactionStatus::Completed);
        assert_eq!(
            outcome.transition,
            Some(StatusTransition {
                old: TransactionStatus::Pending,
                new: TransactionStatus::Completed
            })
        );

        let again = store
            .update_transaction_status(transaction.id, TransactionStatus::Completed)
            .await
            .unwrap();
        assert!(again.transition.is_none());

        assert!(matches!(
            store
                .update_transaction_status(Uuid::now_v7(), TransactionStatus::Cancelled)
                .await,
            Err(LendingError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_concurrent_writers_each_see_consistent_transition() {
        let store = Arc::new(InMemoryLibraryStore::new());
        let book = seed(&store).await;
        let loan_id = store.create_loan(new_loan(&book)).await.unwrap().id;

        let mut handles = vec![];
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .update_loan(loan_id, to_status(LoanStatus::Returned))
                    .await
                    .unwrap()
                    .transition
            }));
        }

        let mut changed = 0;
        for handle in handles {
            if handle.await.unwrap().is_some() {
                changed += 1;
            }
        }
        assert_eq!(changed, 1);
    }

    #[tokio::test]
    async fn test_stats_follow_loan_writes() {
        let store = InMemoryLibraryStore::new();
        let book = seed(&store).await;
        let first = store.create_loan(new_loan(&book)).await.unwrap();
        store
            .update_loan(first.id, to_status(LoanStatus::Returned))
            .await
            .unwrap();
        store.create_loan(new_loan(&book)).await.unwrap();

        let stats = store.stats(Utc::now()).await.unwrap();
        assert_eq!(stats.active_loans, 1);
        assert_eq!(stats.today_returns, 1);
        assert_eq!(stats.available_books, 0);
        assert_eq!(store.list_transactions().await.unwrap().len(), 2);
    }
}

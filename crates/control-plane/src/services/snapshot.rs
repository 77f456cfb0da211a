// Snapshot loading
//
// Builds the aggregates attached to status events and read by the notification
// worker. Missing related rows show up as `None` rather than errors so a
// half-populated aggregate still produces an event.

use lendwise_core::{
    Loan, LoanSnapshot, LoanWithBook, LibraryStore, Result, Transaction, TransactionSnapshot,
};

/// Load a loan's book, transaction and the transaction's people
pub async fn load_loan_snapshot(store: &dyn LibraryStore, loan: Loan) -> Result<LoanSnapshot> {
    let book = store.get_book(loan.book_id).await?;
    let transaction = store.get_transaction(loan.transaction_id).await?;

    let (student, attendant) = match &transaction {
        Some(tx) => (
            store.get_student(tx.student_id).await?,
            store.get_attendant(tx.attendant_id).await?,
        ),
        None => (None, None),
    };

    Ok(LoanSnapshot {
        loan,
        book,
        transaction,
        student,
        attendant,
    })
}

/// Load a transaction's people and every child loan with its book
pub async fn load_transaction_snapshot(
    store: &dyn LibraryStore,
    transaction: Transaction,
) -> Result<TransactionSnapshot> {
    let student = store.get_student(transaction.student_id).await?;
    let attendant = store.get_attendant(transaction.attendant_id).await?;

    let mut loans = Vec::new();
    for loan in store.loans_for_transaction(transaction.id).await? {
        let book = store.get_book(loan.book_id).await?;
        loans.push(LoanWithBook { loan, book });
    }

    Ok(TransactionSnapshot {
        transaction,
        student,
        attendant,
        loans,
    })
}

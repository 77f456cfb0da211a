// Status event emitter
//
// Turns a committed transition into a StatusChangeEvent and hands it to the
// publisher. Runs after the write has committed: a failure here is logged and
// never undoes or fails the write.

use std::sync::Arc;

use lendwise_core::{
    EventPublisher, LibraryStore, Loan, LoanStatus, StatusChangeEvent, StatusTransition,
    Transaction, TransactionStatus,
};
use tracing::{debug, error};

use super::snapshot::{load_loan_snapshot, load_transaction_snapshot};

pub struct StatusEventEmitter {
    store: Arc<dyn LibraryStore>,
    publisher: Arc<dyn EventPublisher>,
}

impl StatusEventEmitter {
    pub fn new(store: Arc<dyn LibraryStore>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self { store, publisher }
    }

    /// Emit `loan.status.changed`. `old_status` is "new" for a freshly created loan.
    pub async fn loan_changed(
        &self,
        loan: &Loan,
        old_status: Option<String>,
        new_status: LoanStatus,
    ) -> Option<StatusChangeEvent> {
        let snapshot = match load_loan_snapshot(self.store.as_ref(), loan.clone()).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!(loan_id = %loan.id, error = %e, "Failed to load loan snapshot, event dropped");
                return None;
            }
        };

        let event = StatusChangeEvent::loan(old_status, new_status, snapshot);
        self.publish(event).await
    }

    /// Emit `transaction.status.changed`
    pub async fn transaction_changed(
        &self,
        transaction: &Transaction,
        transition: StatusTransition<TransactionStatus>,
    ) -> Option<StatusChangeEvent> {
        let snapshot =
            match load_transaction_snapshot(self.store.as_ref(), transaction.clone()).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    error!(
                        transaction_id = %transaction.id,
                        error = %e,
                        "Failed to load transaction snapshot, event dropped"
                    );
                    return None;
                }
            };

        let event = StatusChangeEvent::transaction(transition, snapshot);
        self.publish(event).await
    }

    async fn publish(&self, event: StatusChangeEvent) -> Option<StatusChangeEvent> {
        debug!(
            event_type = %event.event_type,
            entity_id = %event.entity_id,
            old_status = ?event.old_status,
            new_status = %event.new_status,
            "Emitting status change"
        );
        self.publisher.publish(&event).await;
        Some(event)
    }
}

// Event Listeners and the in-process event bus
//
// Status change events are published once per committed transition. The bus
// invokes every subscribed listener inline, in registration order, before
// publish() returns. Listeners are the fan-out points of the pipeline:
// - notification dispatch (enqueue an email job)
// - realtime broadcast to connected dashboards
// - audit logging
//
// A listener that panics is contained by the bus; the remaining listeners
// still receive the event and the publishing write is unaffected.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::RwLock;
use tracing::{debug, error};

use crate::events::StatusChangeEvent;

// ============================================================================
// EventListener Trait
// ============================================================================

/// Trait for reacting to status change events.
///
/// Listeners must not let failures escape: anything that can go wrong inside
/// `on_event` should be logged and swallowed there. Long-running work belongs
/// on the job queue, not inline in the listener.
///
/// # Example
///
/// ```ignore
/// use lendwise_core::{EventListener, StatusChangeEvent};
///
/// struct AuditListener;
///
/// #[async_trait]
/// impl EventListener for AuditListener {
///     async fn on_event(&self, event: &StatusChangeEvent) {
///         tracing::info!(entity_id = %event.entity_id, "status changed");
///     }
/// }
/// ```
#[async_trait]
pub trait EventListener: Send + Sync {
    /// Called after the transition has been committed.
    async fn on_event(&self, event: &StatusChangeEvent);

    /// Optional: Filter which event types this listener cares about.
    ///
    /// Return `None` to receive all events (default).
    /// Return `Some(vec!["loan.status.changed"])` to filter.
    fn event_types(&self) -> Option<Vec<&'static str>> {
        None
    }

    /// Human-readable name for logging/debugging.
    fn name(&self) -> &'static str {
        "EventListener"
    }
}

// ============================================================================
// EventPublisher Trait
// ============================================================================

/// Publishing side of the bus, injected into the write services.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Deliver the event to every interested subscriber.
    ///
    /// Never fails from the caller's point of view.
    async fn publish(&self, event: &StatusChangeEvent);
}

// ============================================================================
// EventBus
// ============================================================================

/// Synchronous in-process publish/subscribe bus.
///
/// Constructed once at process start and shared via `Arc`.
#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<Vec<Arc<dyn EventListener>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. Listeners run in the order they were subscribed.
    pub fn subscribe(&self, listener: Arc<dyn EventListener>) {
        debug!(listener = listener.name(), "Subscribing event listener");
        self.listeners.write().push(listener);
    }

    /// Builder-style registration
    pub fn with_listener(self, listener: Arc<dyn EventListener>) -> Self {
        self.subscribe(listener);
        self
    }

    /// Get the number of registered listeners.
    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    /// Check if there are no registered listeners.
    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// Deliver an event and return how many listeners received it
    pub async fn dispatch(&self, event: &StatusChangeEvent) -> usize {
        // Snapshot so listeners may subscribe others without deadlocking
        let listeners: Vec<Arc<dyn EventListener>> = self.listeners.read().clone();
        let mut delivered = 0;

        for listener in listeners {
            if let Some(types) = listener.event_types() {
                if !types.contains(&event.event_type.as_str()) {
                    continue;
                }
            }

            let outcome = AssertUnwindSafe(listener.on_event(event))
                .catch_unwind()
                .await;
            match outcome {
                Ok(()) => delivered += 1,
                Err(_) => {
                    error!(
                        listener = listener.name(),
                        event_id = %event.id,
                        event_type = %event.event_type,
                        entity_id = %event.entity_id,
                        "Event listener panicked"
                    );
                }
            }
        }

        delivered
    }
}

#[async_trait]
impl EventPublisher for EventBus {
    async fn publish(&self, event: &StatusChangeEvent) {
        let delivered = self.dispatch(event).await;
        debug!(
            event_type = %event.event_type,
            entity_id = %event.entity_id,
            delivered,
            "Published status change event"
        );
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{
        LoanSnapshot, StatusChangeEvent, LOAN_STATUS_CHANGED, NEW_STATUS,
        TRANSACTION_STATUS_CHANGED,
    };
    use crate::loan::{Loan, LoanStatus};
    use chrono::Utc;
    use parking_lot::Mutex;
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicU32, Ordering};
    use uuid::Uuid;

    fn create_test_event() -> StatusChangeEvent {
        let now = Utc::now();
        StatusChangeEvent::loan(
            Some(NEW_STATUS.to_string()),
            LoanStatus::Active,
            LoanSnapshot {
                loan: Loan {
                    id: Uuid::now_v7(),
                    book_id: Uuid::now_v7(),
                    transaction_id: Uuid::now_v7(),
                    loan_date: now,
                    due_date: now,
                    return_date: None,
                    status: LoanStatus::Active,
                    payment_amount: Decimal::ZERO,
                    created_at: now,
                    updated_at: now,
                },
                book: None,
                transaction: None,
                student: None,
                attendant: None,
            },
        )
    }

    struct OrderListener {
        label: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
        types: Option<Vec<&'static str>>,
    }

    #[async_trait]
    impl EventListener for OrderListener {
        async fn on_event(&self, _event: &StatusChangeEvent) {
            self.log.lock().push(self.label);
        }

        fn event_types(&self) -> Option<Vec<&'static str>> {
            self.types.clone()
        }

        fn name(&self) -> &'static str {
            self.label
        }
    }

    struct PanickingListener;

    #[async_trait]
    impl EventListener for PanickingListener {
        async fn on_event(&self, _event: &StatusChangeEvent) {
            panic!("listener blew up");
        }

        fn name(&self) -> &'static str {
            "PanickingListener"
        }
    }

    #[tokio::test]
    async fn test_event_listener_default_event_types() {
        struct TestListener;

        #[async_trait]
        impl EventListener for TestListener {
            async fn on_event(&self, _event: &StatusChangeEvent) {}
        }

        let listener = TestListener;
        assert!(listener.event_types().is_none());
        assert_eq!(listener.name(), "EventListener");
    }

    #[tokio::test]
    async fn test_empty_bus() {
        let bus = EventBus::new();
        assert!(bus.is_empty());
        assert_eq!(bus.dispatch(&create_test_event()).await, 0);
    }

    #[tokio::test]
    async fn test_listeners_run_in_registration_order() {
        let log = Arc::new(Mutex::new(vec![]));
        let bus = EventBus::new();
        for label in ["first", "second", "third"] {
            bus.subscribe(Arc::new(OrderListener {
                label,
                log: log.clone(),
                types: None,
            }));
        }

        assert_eq!(bus.len(), 3);
        bus.publish(&create_test_event()).await;
        assert_eq!(*log.lock(), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_event_type_filter() {
        let log = Arc::new(Mutex::new(vec![]));
        let bus = EventBus::new()
            .with_listener(Arc::new(OrderListener {
                label: "loans",
                log: log.clone(),
                types: Some(vec![LOAN_STATUS_CHANGED]),
            }))
            .with_listener(Arc::new(OrderListener {
                label: "transactions",
                log: log.clone(),
                types: Some(vec![TRANSACTION_STATUS_CHANGED]),
            }));

        let delivered = bus.dispatch(&create_test_event()).await;
        assert_eq!(delivered, 1);
        assert_eq!(*log.lock(), vec!["loans"]);
    }

    #[tokio::test]
    async fn test_panicking_listener_is_contained() {
        struct CountingListener {
            count: Arc<AtomicU32>,
        }

        #[async_trait]
        impl EventListener for CountingListener {
            async fn on_event(&self, _event: &StatusChangeEvent) {
                self.count.fetch_add(1, Ordering::SeqCst);
            }
        }

        let count = Arc::new(AtomicU32::new(0));
        let bus = EventBus::new()
            .with_listener(Arc::new(PanickingListener))
            .with_listener(Arc::new(CountingListener {
                count: count.clone(),
            }));

        let delivered = bus.dispatch(&create_test_event()).await;
        assert_eq!(delivered, 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}

// Services layer for business logic
// Services own validation and status-change emission, calling storage directly

pub mod catalog;
pub mod dashboard;
pub mod emitter;
pub mod lending;
pub mod snapshot;

pub use catalog::CatalogService;
pub use dashboard::{DashboardProp, DashboardProps, DashboardService};
pub use emitter::StatusEventEmitter;
pub use lending::LendingService;
pub use snapshot::{load_loan_snapshot, load_transaction_snapshot};

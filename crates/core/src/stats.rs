// Dashboard stats read model
//
// active_loans    = loans with status active
// overdue_loans   = active loans whose due date is before now
// today_returns   = returned loans whose return date falls on today's (UTC) date
// available_books = books with status available

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::book::{Book, BookStatus};
use crate::loan::{Loan, LoanStatus};

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// Aggregate counters shown on the dashboard.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct LibraryStats {
    pub active_loans: u64,
    pub overdue_loans: u64,
    pub today_returns: u64,
    pub available_books: u64,
}

impl LibraryStats {
    pub fn compute<'a>(
        loans: impl IntoIterator<Item = &'a Loan>,
        books: impl IntoIterator<Item = &'a Book>,
        now: DateTime<Utc>,
    ) -> Self {
        let today = now.date_naive();
        let mut stats = LibraryStats::default();

        for loan in loans {
            match loan.status {
                LoanStatus::Active => {
                    stats.active_loans += 1;
                    if loan.due_date < now {
                        stats.overdue_loans += 1;
                    }
                }
                LoanStatus::Returned => {
                    if loan.return_date.map(|d| d.date_naive()) == Some(today) {
                        stats.today_returns += 1;
                    }
                }
                LoanStatus::Overdue => {}
            }
        }

        stats.available_books = books
            .into_iter()
            .filter(|book| book.status == BookStatus::Available)
            .count() as u64;

        stats
    }
}

// Loan domain types
//
// A Loan records one book lent to a student under a borrow transaction.
// Loans are never deleted while active; they move through statuses instead.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// Daily late fee applied by [`Loan::calculate_fine`] when no rate is configured.
pub const DEFAULT_DAILY_FINE: Decimal = Decimal::from_parts(500, 0, 0, false, 2);

/// Loan status.
/// - `active`: Book is out with the student
/// - `returned`: Book came back
/// - `overdue`: Flagged past its due date
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Active,
    Returned,
    Overdue,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Active => "active",
            LoanStatus::Returned => "returned",
            LoanStatus::Overdue => "overdue",
        }
    }
}

impl std::fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LoanStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(LoanStatus::Active),
            "returned" => Ok(LoanStatus::Returned),
            "overdue" => Ok(LoanStatus::Overdue),
            other => Err(format!("unknown loan status: {}", other)),
        }
    }
}

/// A single book lent to a student.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct Loan {
    pub id: Uuid,
    /// Book being lent.
    pub book_id: Uuid,
    /// Borrow transaction this loan belongs to.
    pub transaction_id: Uuid,
    pub loan_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_date: Option<DateTime<Utc>>,
    pub status: LoanStatus,
    /// Amount collected on return. Never negative.
    #[cfg_attr(feature = "openapi", schema(value_type = f64))]
    pub payment_amount: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loan {
    pub fn is_active(&self) -> bool {
        self.status == LoanStatus::Active
    }

    pub fn is_returned(&self) -> bool {
        self.status == LoanStatus::Returned
    }

    /// Active and overdue loans both keep the book off the shelf
    pub fn holds_book(&self) -> bool {
        !self.is_returned()
    }

    /// Flagged overdue, or still active past its due date
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == LoanStatus::Overdue
            || (self.status == LoanStatus::Active && now > self.due_date)
    }

    /// Whole days between the due date and the return date (or `now` when not yet returned).
    /// Zero unless the loan is overdue.
    pub fn days_overdue(&self, now: DateTime<Utc>) -> i64 {
        if !self.is_overdue(now) {
            return 0;
        }
        let end = self.return_date.unwrap_or(now);
        (end - self.due_date).num_days().max(0)
    }

    /// Late fee owed at `daily_rate` per overdue day
    pub fn calculate_fine(&self, now: DateTime<Utc>, daily_rate: Decimal) -> Decimal {
        Decimal::from(self.days_overdue(now)) * daily_rate
    }

    /// Whether the book came back after its due date
    pub fn returned_late(&self) -> bool {
        self.return_date
            .map(|returned| returned > self.due_date)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn loan(status: LoanStatus, due_in_days: i64) -> Loan {
        let now = Utc::now();
        Loan {
            id: Uuid::now_v7(),
            book_id: Uuid::now_v7(),
            transaction_id: Uuid::now_v7(),
            loan_date: now - Duration::days(14),
            due_date: now + Duration::days(due_in_days),
            return_date: None,
            status,
            payment_amount: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_default_daily_fine() {
        assert_eq!(DEFAULT_DAILY_FINE, dec!(5.00));
    }

    #[test]
    fn test_active_loan_within_due_date_is_not_overdue() {
        let loan = loan(LoanStatus::Active, 3);
        assert!(!loan.is_overdue(Utc::now()));
        assert_eq!(loan.days_overdue(Utc::now()), 0);
        assert_eq!(loan.calculate_fine(Utc::now(), DEFAULT_DAILY_FINE), dec!(0));
    }

    #[test]
    fn test_active_loan_past_due_accrues_fine() {
        let loan = loan(LoanStatus::Active, -3);
        let now = Utc::now();
        assert!(loan.is_overdue(now));
        assert_eq!(loan.days_overdue(now), 3);
        assert_eq!(loan.calculate_fine(now, DEFAULT_DAILY_FINE), dec!(15.00));
    }

    #[test]
    fn test_overdue_status_counts_even_before_due_date() {
        let loan = loan(LoanStatus::Overdue, 2);
        assert!(loan.is_overdue(Utc::now()));
        assert_eq!(loan.days_overdue(Utc::now()), 0);
    }

    #[test]
    fn test_returned_loan_is_not_overdue() {
        let mut loan = loan(LoanStatus::Returned, -2);
        loan.return_date = Some(Utc::now());
        assert!(!loan.is_overdue(Utc::now()));
        assert!(loan.returned_late());
    }

    #[test]
    fn test_only_returned_loans_release_the_book() {
        assert!(loan(LoanStatus::Active, 3).holds_book());
        assert!(loan(LoanStatus::Overdue, -3).holds_book());
        assert!(!loan(LoanStatus::Returned, 3).holds_book());
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("returned".parse::<LoanStatus>(), Ok(LoanStatus::Returned));
        assert!("lost".parse::<LoanStatus>().is_err());
        assert_eq!(
            serde_json::to_value(LoanStatus::Overdue).unwrap(),
            serde_json::json!("overdue")
        );
    }
}

// Book domain types
//
// A Book's status is kept consistent with the loans referencing it: at most
// one unreturned (active or overdue) loan holds a book at a time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// Book availability status.
/// - `available`: On the shelf, may be lent
/// - `borrowed`: Held by an active or overdue loan
/// - `maintenance`: Pulled from circulation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum BookStatus {
    Available,
    Borrowed,
    Maintenance,
}

impl std::fmt::Display for BookStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BookStatus::Available => write!(f, "available"),
            BookStatus::Borrowed => write!(f, "borrowed"),
            BookStatus::Maintenance => write!(f, "maintenance"),
        }
    }
}

/// A catalog entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct Book {
    /// Unique identifier for the book.
    pub id: Uuid,
    /// Title as displayed to patrons.
    pub title: String,
    /// Author name.
    pub author: String,
    /// Current availability.
    pub status: BookStatus,
    /// Timestamp when the book was catalogued.
    pub created_at: DateTime<Utc>,
}

impl Book {
    pub fn is_available(&self) -> bool {
        self.status == BookStatus::Available
    }
}

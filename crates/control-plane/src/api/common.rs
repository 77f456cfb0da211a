// Common DTOs for public API
//
// These types are shared across multiple API endpoints.

use axum::http::StatusCode;
use axum::Json;
use lendwise_core::LendingError;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Standard error response for API endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Error message describing what went wrong.
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }

    /// Convert to axum response tuple
    pub fn into_response(self, status: StatusCode) -> (StatusCode, Json<Self>) {
        (status, Json(self))
    }
}

/// Error half of every handler result
pub type ApiError = (StatusCode, Json<ErrorResponse>);

/// Map a domain error to its HTTP status.
///
/// Client errors carry their message; infrastructure errors are logged and
/// reported generically.
pub fn api_error(err: LendingError) -> ApiError {
    let status = match &err {
        LendingError::NotFound { .. } => StatusCode::NOT_FOUND,
        LendingError::Validation(_) => StatusCode::BAD_REQUEST,
        LendingError::BookUnavailable(_) | LendingError::StatusUnchanged { .. } => {
            StatusCode::CONFLICT
        }
        LendingError::Storage(_) | LendingError::Internal(_) => {
            tracing::error!("Request failed: {}", err);
            return ErrorResponse::new("Internal server error")
                .into_response(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };
    ErrorResponse::new(err.to_string()).into_response(status)
}

/// Response wrapper for list endpoints.
/// All list endpoints return responses wrapped in a `data` field.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ListResponse<T> {
    /// Array of items returned by the list operation.
    pub data: Vec<T>,
}

impl<T> ListResponse<T> {
    pub fn new(data: Vec<T>) -> Self {
        Self { data }
    }
}

impl<T> From<Vec<T>> for ListResponse<T> {
    fn from(data: Vec<T>) -> Self {
        Self { data }
    }
}

// Loan HTTP routes

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use lendwise_core::{Loan, LoanStatus, DEFAULT_DAILY_FINE};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use super::common::{api_error, ApiError, ErrorResponse, ListResponse};
use crate::services::LendingService;

// ============================================
// Request / Response DTOs
// ============================================

/// Request to lend a book to a student
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateLoanRequest {
    pub student_id: Uuid,
    pub attendant_id: Uuid,
    pub book_id: Uuid,
    /// Defaults to now
    #[serde(default)]
    pub loan_date: Option<DateTime<Utc>>,
    pub due_date: DateTime<Utc>,
}

/// Request to return a loaned book
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ReturnLoanRequest {
    /// Amount paid at return (fines). Defaults to 0; must not be negative.
    #[serde(default)]
    #[schema(value_type = Option<f64>, example = 30.0)]
    pub payment_amount: Option<Decimal>,
    /// Attendant handling the return. Defaults to the lending attendant.
    #[serde(default)]
    pub attendant_id: Option<Uuid>,
}

/// Request to set a loan's status
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateLoanStatusRequest {
    pub status: LoanStatus,
}

/// A loan with its overdue figures as of the request
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoanDetails {
    #[serde(flatten)]
    pub loan: Loan,
    pub is_overdue: bool,
    pub days_overdue: i64,
    /// Fine accrued so far at the default daily rate
    #[schema(value_type = f64)]
    pub fine: Decimal,
}

impl LoanDetails {
    pub fn at(loan: Loan, now: DateTime<Utc>) -> Self {
        Self {
            is_overdue: loan.is_overdue(now),
            days_overdue: loan.days_overdue(now),
            fine: loan.calculate_fine(now, DEFAULT_DAILY_FINE),
            loan,
        }
    }
}

// ============================================
// App State and Routes
// ============================================

#[derive(Clone)]
pub struct AppState {
    pub lending: Arc<LendingService>,
}

impl AppState {
    pub fn new(lending: Arc<LendingService>) -> Self {
        Self { lending }
    }
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/v1/loans", post(create_loan).get(list_loans))
        .route("/v1/loans/:id", get(get_loan))
        .route("/v1/loans/:id/return", post(return_loan))
        .route("/v1/loans/:id/status", patch(update_loan_status))
        .with_state(state)
}

// ============================================
// HTTP Handlers
// ============================================

/// POST /v1/loans - Lend a book
#[utoipa::path(
    post,
    path = "/v1/loans",
    request_body = CreateLoanRequest,
    responses(
        (status = 201, description = "Loan created", body = Loan),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 404, description = "Student, attendant or book not found", body = ErrorResponse),
        (status = 409, description = "Book is not available", body = ErrorResponse)
    ),
    tag = "loans"
)]
pub async fn create_loan(
    State(state): State<AppState>,
    Json(req): Json<CreateLoanRequest>,
) -> Result<(StatusCode, Json<Loan>), ApiError> {
    let loan = state.lending.create_loan(req).await.map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(loan)))
}

/// GET /v1/loans - List loans, most recent first
#[utoipa::path(
    get,
    path = "/v1/loans",
    responses(
        (status = 200, description = "List of loans", body = ListResponse<Loan>)
    ),
    tag = "loans"
)]
pub async fn list_loans(
    State(state): State<AppState>,
) -> Result<Json<ListResponse<Loan>>, ApiError> {
    let loans = state.lending.list_loans().await.map_err(api_error)?;
    Ok(Json(ListResponse::new(loans)))
}

/// GET /v1/loans/{id} - Get a loan with overdue figures
#[utoipa::path(
    get,
    path = "/v1/loans/{id}",
    params(("id" = Uuid, Path, description = "Loan ID")),
    responses(
        (status = 200, description = "Loan found", body = LoanDetails),
        (status = 404, description = "Loan not found", body = ErrorResponse)
    ),
    tag = "loans"
)]
pub async fn get_loan(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<LoanDetails>, ApiError> {
    let loan = state.lending.get_loan(id).await.map_err(api_error)?;
    Ok(Json(LoanDetails::at(loan, Utc::now())))
}

/// POST /v1/loans/{id}/return - Return a book
#[utoipa::path(
    post,
    path = "/v1/loans/{id}/return",
    params(("id" = Uuid, Path, description = "Loan ID")),
    request_body = ReturnLoanRequest,
    responses(
        (status = 200, description = "Loan returned", body = Loan),
        (status = 400, description = "Negative payment or already returned", body = ErrorResponse),
        (status = 404, description = "Loan not found", body = ErrorResponse)
    ),
    tag = "loans"
)]
pub async fn return_loan(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ReturnLoanRequest>,
) -> Result<Json<Loan>, ApiError> {
    state
        .lending
        .return_loan(id, req)
        .await
        .map(Json)
        .map_err(api_error)
}

/// PATCH /v1/loans/{id}/status - Set a loan's status
///
/// Writing the current status succeeds without emitting a status event.
#[utoipa::path(
    patch,
    path = "/v1/loans/{id}/status",
    params(("id" = Uuid, Path, description = "Loan ID")),
    request_body = UpdateLoanStatusRequest,
    responses(
        (status = 200, description = "Loan updated", body = Loan),
        (status = 404, description = "Loan not found", body = ErrorResponse),
        (status = 409, description = "Book is held by another loan or under maintenance", body = ErrorResponse)
    ),
    tag = "loans"
)]
pub async fn update_loan_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateLoanStatusRequest>,
) -> Result<Json<Loan>, ApiError> {
    state
        .lending
        .update_loan_status(id, req.status)
        .await
        .map(Json)
        .map_err(api_error)
}

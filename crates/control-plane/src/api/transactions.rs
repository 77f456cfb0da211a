// Transaction HTTP routes

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use lendwise_core::{Transaction, TransactionStatus, TransactionType};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use super::common::{api_error, ApiError, ErrorResponse, ListResponse};
use crate::services::LendingService;

// ============================================
// Request DTOs
// ============================================

/// Request to record a transaction
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateTransactionRequest {
    pub student_id: Uuid,
    pub attendant_id: Uuid,
    pub transaction_type: TransactionType,
    /// Defaults to `pending`
    #[serde(default)]
    pub status: Option<TransactionStatus>,
    /// Defaults to now
    #[serde(default)]
    pub transaction_date: Option<DateTime<Utc>>,
}

/// Request to change a transaction's status
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateTransactionStatusRequest {
    pub status: TransactionStatus,
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
        .route(
            "/v1/transactions",
            post(create_transaction).get(list_transactions),
        )
        .route("/v1/transactions/:id", get(get_transaction))
        .route(
            "/v1/transactions/:id/status",
            patch(update_transaction_status),
        )
        .with_state(state)
}

// ============================================
// HTTP Handlers
// ============================================

/// POST /v1/transactions - Record a transaction
#[utoipa::path(
    post,
    path = "/v1/transactions",
    request_body = CreateTransactionRequest,
    responses(
        (status = 201, description = "Transaction created", body = Transaction),
        (status = 404, description = "Student or attendant not found", body = ErrorResponse)
    ),
    tag = "transactions"
)]
pub async fn create_transaction(
    State(state): State<AppState>,
    Json(req): Json<CreateTransactionRequest>,
) -> Result<(StatusCode, Json<Transaction>), ApiError> {
    let transaction = state
        .lending
        .create_transaction(req)
        .await
        .map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(transaction)))
}

/// GET /v1/transactions - List transactions, most recent first
#[utoipa::path(
    get,
    path = "/v1/transactions",
    responses(
        (status = 200, description = "List of transactions", body = ListResponse<Transaction>)
    ),
    tag = "transactions"
)]
pub async fn list_transactions(
    State(state): State<AppState>,
) -> Result<Json<ListResponse<Transaction>>, ApiError> {
    let transactions = state.lending.list_transactions().await.map_err(api_error)?;
    Ok(Json(ListResponse::new(transactions)))
}

/// GET /v1/transactions/{id} - Get a transaction
#[utoipa::path(
    get,
    path = "/v1/transactions/{id}",
    params(("id" = Uuid, Path, description = "Transaction ID")),
    responses(
        (status = 200, description = "Transaction found", body = Transaction),
        (status = 404, description = "Transaction not found", body = ErrorResponse)
    ),
    tag = "transactions"
)]
pub async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Transaction>, ApiError> {
    state
        .lending
        .get_transaction(id)
        .await
        .map(Json)
        .map_err(api_error)
}

/// PATCH /v1/transactions/{id}/status - Change a transaction's status
#[utoipa::path(
    patch,
    path = "/v1/transactions/{id}/status",
    params(("id" = Uuid, Path, description = "Transaction ID")),
    request_body = UpdateTransactionStatusRequest,
    responses(
        (status = 200, description = "Transaction updated", body = Transaction),
        (status = 404, description = "Transaction not found", body = ErrorResponse),
        (status = 409, description = "Transaction already has this status", body = ErrorResponse)
    ),
    tag = "transactions"
)]
pub async fn update_transaction_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateTransactionStatusRequest>,
) -> Result<Json<Transaction>, ApiError> {
    state
        .lending
        .update_transaction_status(id, req.status)
        .await
        .map(Json)
        .map_err(api_error)
}

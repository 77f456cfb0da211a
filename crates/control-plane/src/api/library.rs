// Catalog HTTP routes: books, students, attendants

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use lendwise_core::{Attendant, Book, BookStatus, Student};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use super::common::{api_error, ApiError, ErrorResponse, ListResponse};
use crate::services::CatalogService;

// ============================================
// Request DTOs
// ============================================

/// Request to add a book to the catalog
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateBookRequest {
    #[schema(example = "Dune")]
    pub title: String,
    #[schema(example = "Frank Herbert")]
    pub author: String,
    /// Initial status. Defaults to `available`.
    #[serde(default)]
    pub status: Option<BookStatus>,
}

/// Request to move a book on or off the shelf
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateBookStatusRequest {
    /// `available` or `maintenance`
    pub status: BookStatus,
}

/// Request to register a student or an attendant
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreatePersonRequest {
    #[schema(example = "Ada")]
    pub first_name: String,
    #[schema(example = "Lovelace")]
    pub last_name: String,
    /// Contact address. Students without one receive no notifications.
    #[serde(default)]
    #[schema(example = "ada@example.com")]
    pub email: Option<String>,
}

// ============================================
// App State and Routes
// ============================================

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<CatalogService>,
}

impl AppState {
    pub fn new(catalog: Arc<CatalogService>) -> Self {
        Self { catalog }
    }
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/v1/books", post(create_book).get(list_books))
        .route("/v1/books/:id", get(get_book))
        .route("/v1/books/:id/status", patch(update_book_status))
        .route("/v1/students", post(create_student))
        .route("/v1/students/:id", get(get_student))
        .route("/v1/attendants", post(create_attendant))
        .with_state(state)
}

// ============================================
// HTTP Handlers
// ============================================

/// POST /v1/books - Add a book
#[utoipa::path(
    post,
    path = "/v1/books",
    request_body = CreateBookRequest,
    responses(
        (status = 201, description = "Book created", body = Book),
        (status = 400, description = "Invalid request", body = ErrorResponse)
    ),
    tag = "library"
)]
pub async fn create_book(
    State(state): State<AppState>,
    Json(req): Json<CreateBookRequest>,
) -> Result<(StatusCode, Json<Book>), ApiError> {
    let book = state.catalog.create_book(req).await.map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(book)))
}

/// GET /v1/books - List books
#[utoipa::path(
    get,
    path = "/v1/books",
    responses(
        (status = 200, description = "List of books", body = ListResponse<Book>)
    ),
    tag = "library"
)]
pub async fn list_books(
    State(state): State<AppState>,
) -> Result<Json<ListResponse<Book>>, ApiError> {
    let books = state.catalog.list_books().await.map_err(api_error)?;
    Ok(Json(ListResponse::new(books)))
}

/// GET /v1/books/{id} - Get a book
#[utoipa::path(
    get,
    path = "/v1/books/{id}",
    params(("id" = Uuid, Path, description = "Book ID")),
    responses(
        (status = 200, description = "Book found", body = Book),
        (status = 404, description = "Book not found", body = ErrorResponse)
    ),
    tag = "library"
)]
pub async fn get_book(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Book>, ApiError> {
    state.catalog.get_book(id).await.map(Json).map_err(api_error)
}

/// PATCH /v1/books/{id}/status - Set a book's shelf status
#[utoipa::path(
    patch,
    path = "/v1/books/{id}/status",
    params(("id" = Uuid, Path, description = "Book ID")),
    request_body = UpdateBookStatusRequest,
    responses(
        (status = 200, description = "Book updated", body = Book),
        (status = 400, description = "Borrowed is set by loans only", body = ErrorResponse),
        (status = 404, description = "Book not found", body = ErrorResponse),
        (status = 409, description = "Book is out on loan", body = ErrorResponse)
    ),
    tag = "library"
)]
pub async fn update_book_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateBookStatusRequest>,
) -> Result<Json<Book>, ApiError> {
    state
        .catalog
        .update_book_status(id, req.status)
        .await
        .map(Json)
        .map_err(api_error)
}

/// POST /v1/students - Register a student
#[utoipa::path(
    post,
    path = "/v1/students",
    request_body = CreatePersonRequest,
    responses(
        (status = 201, description = "Student created", body = Student),
        (status = 400, description = "Invalid request", body = ErrorResponse)
    ),
    tag = "library"
)]
pub async fn create_student(
    State(state): State<AppState>,
    Json(req): Json<CreatePersonRequest>,
) -> Result<(StatusCode, Json<Student>), ApiError> {
    let student = state.catalog.create_student(req).await.map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(student)))
}

/// GET /v1/students/{id} - Get a student
#[utoipa::path(
    get,
    path = "/v1/students/{id}",
    params(("id" = Uuid, Path, description = "Student ID")),
    responses(
        (status = 200, description = "Student found", body = Student),
        (status = 404, description = "Student not found", body = ErrorResponse)
    ),
    tag = "library"
)]
pub async fn get_student(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Student>, ApiError> {
    state.catalog.get_student(id).await.map(Json).map_err(api_error)
}

/// POST /v1/attendants - Register an attendant
#[utoipa::path(
    post,
    path = "/v1/attendants",
    request_body = CreatePersonRequest,
    responses(
        (status = 201, description = "Attendant created", body = Attendant),
        (status = 400, description = "Invalid request", body = ErrorResponse)
    ),
    tag = "library"
)]
pub async fn create_attendant(
    State(state): State<AppState>,
    Json(req): Json<CreatePersonRequest>,
) -> Result<(StatusCode, Json<Attendant>), ApiError> {
    let attendant = state
        .catalog
        .create_attendant(req)
        .await
        .map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(attendant)))
}

// OpenAPI specification generation
//
// This module defines the OpenAPI spec for the Lendwise API.
// It can be used by both the main API server (for Swagger UI)
// and the export-openapi binary (for static spec generation).

use crate::api;
use crate::api::{ErrorResponse, ListResponse};
use crate::services::{DashboardProp, DashboardProps};
use lendwise_core::{
    Attendant, Book, BookStatus, LibraryStats, Loan, LoanStatus, Student, Transaction,
    TransactionStatus, TransactionType,
};
use utoipa::OpenApi;

/// OpenAPI documentation for the Lendwise API
#[derive(OpenApi)]
#[openapi(
    paths(
        api::library::create_book,
        api::library::list_books,
        api::library::get_book,
        api::library::update_book_status,
        api::library::create_student,
        api::library::get_student,
        api::library::create_attendant,
        api::loans::create_loan,
        api::loans::list_loans,
        api::loans::get_loan,
        api::loans::return_loan,
        api::loans::update_loan_status,
        api::transactions::create_transaction,
        api::transactions::list_transactions,
        api::transactions::get_transaction,
        api::transactions::update_transaction_status,
        api::dashboard::get_stats,
        api::dashboard::get_dashboard,
        api::channels::stream_sse,
        api::jobs::list_jobs,
    ),
    components(
        schemas(
            Book, BookStatus, Student, Attendant,
            Loan, LoanStatus, Transaction, TransactionStatus, TransactionType,
            LibraryStats, DashboardProp, DashboardProps,
            ErrorResponse,
            api::library::CreateBookRequest, api::library::UpdateBookStatusRequest,
            api::library::CreatePersonRequest,
            api::loans::CreateLoanRequest, api::loans::ReturnLoanRequest,
            api::loans::UpdateLoanStatusRequest, api::loans::LoanDetails,
            api::transactions::CreateTransactionRequest,
            api::transactions::UpdateTransactionStatusRequest,
            api::jobs::JobSummary,
            ListResponse<Book>,
            ListResponse<Loan>,
            ListResponse<Transaction>,
            ListResponse<api::jobs::JobSummary>,
        )
    ),
    tags(
        (name = "library", description = "Books, students and attendants"),
        (name = "loans", description = "Lending and returns"),
        (name = "transactions", description = "Transaction management endpoints"),
        (name = "dashboard", description = "Dashboard stats and props"),
        (name = "channels", description = "Realtime status updates (SSE)"),
        (name = "jobs", description = "Notification queue inspection")
    ),
    info(
        title = "Lendwise API",
        version = "0.1.0",
        description = "API for library lending with status-change notifications and live dashboard updates",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    )
)]
pub struct ApiDoc;

impl ApiDoc {
    /// Generate the OpenAPI spec as a pretty-printed JSON string
    pub fn to_json() -> Result<String, serde_json::Error> {
        Self::openapi().to_pretty_json()
    }
}

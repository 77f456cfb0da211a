// HTTP API routes
//
// This module contains all HTTP route handlers for the public API.
// Each submodule handles a specific resource type with its own AppState.

pub mod channels;
pub mod common;
pub mod dashboard;
pub mod jobs;
pub mod library;
pub mod loans;
pub mod transactions;

// Re-export common types
pub use common::{api_error, ApiError, ErrorResponse, ListResponse};

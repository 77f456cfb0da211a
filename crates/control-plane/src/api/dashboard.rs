// Dashboard HTTP routes: stats and partial-reload props

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use lendwise_core::LibraryStats;
use serde::Deserialize;
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

use super::common::{api_error, ApiError, ErrorResponse};
use crate::services::{DashboardProp, DashboardProps, DashboardService};

/// Query parameters for the dashboard
#[derive(Debug, Default, Deserialize, ToSchema, IntoParams)]
pub struct DashboardQuery {
    /// Comma-separated props to load (stats, loans, transactions). Omit for all.
    #[param(example = "stats,loans")]
    pub only: Option<String>,
}

// ============================================
// App State and Routes
// ============================================

#[derive(Clone)]
pub struct AppState {
    pub dashboard: Arc<DashboardService>,
}

impl AppState {
    pub fn new(dashboard: Arc<DashboardService>) -> Self {
        Self { dashboard }
    }
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/v1/stats", get(get_stats))
        .route("/v1/dashboard", get(get_dashboard))
        .with_state(state)
}

// ============================================
// HTTP Handlers
// ============================================

/// GET /v1/stats - Aggregate lending counters
#[utoipa::path(
    get,
    path = "/v1/stats",
    responses(
        (status = 200, description = "Current stats", body = LibraryStats)
    ),
    tag = "dashboard"
)]
pub async fn get_stats(State(state): State<AppState>) -> Result<Json<LibraryStats>, ApiError> {
    state.dashboard.stats().await.map(Json).map_err(api_error)
}

/// GET /v1/dashboard - Dashboard props, optionally a subset
#[utoipa::path(
    get,
    path = "/v1/dashboard",
    params(DashboardQuery),
    responses(
        (status = 200, description = "Requested props", body = DashboardProps),
        (status = 400, description = "Unknown prop", body = ErrorResponse)
    ),
    tag = "dashboard"
)]
pub async fn get_dashboard(
    State(state): State<AppState>,
    Query(query): Query<DashboardQuery>,
) -> Result<Json<DashboardProps>, ApiError> {
    let only = match query.only.as_deref() {
        Some(raw) => DashboardProp::parse_list(raw).map_err(api_error)?,
        None => DashboardProp::ALL.to_vec(),
    };
    state.dashboard.props(&only).await.map(Json).map_err(api_error)
}

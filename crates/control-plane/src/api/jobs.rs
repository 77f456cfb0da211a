// Job queue inspection routes (read-only)

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use lendwise_core::EMAILS_QUEUE;
use lendwise_durable::{JobFilter, JobInfo, JobStatus, JobStore, Pagination};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::common::{ErrorResponse, ListResponse};

/// Query parameters for job listing
#[derive(Debug, Default, Deserialize, ToSchema, IntoParams)]
pub struct JobsQuery {
    /// Queue name. Defaults to "emails".
    pub queue: Option<String>,
    /// One of pending, claimed, completed, dead
    pub status: Option<String>,
    /// Maximum jobs returned (default 100)
    pub limit: Option<u32>,
}

/// A queued job as seen by operators
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct JobSummary {
    pub id: Uuid,
    pub queue: String,
    pub job_type: String,
    pub payload: serde_json::Value,
    #[schema(example = "pending")]
    pub status: String,
    pub attempt: u32,
    pub max_attempts: u32,
    pub last_error: Option<String>,
    pub enqueued_at: DateTime<Utc>,
    pub visible_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<JobInfo> for JobSummary {
    fn from(job: JobInfo) -> Self {
        Self {
            id: job.id,
            queue: job.queue,
            job_type: job.job_type,
            payload: job.payload,
            status: job.status.to_string(),
            attempt: job.attempt,
            max_attempts: job.max_attempts,
            last_error: job.last_error,
            enqueued_at: job.enqueued_at,
            visible_at: job.visible_at,
            completed_at: job.completed_at,
        }
    }
}

// ============================================
// App State and Routes
// ============================================

#[derive(Clone)]
pub struct AppState {
    pub jobs: Arc<dyn JobStore>,
}

impl AppState {
    pub fn new(jobs: Arc<dyn JobStore>) -> Self {
        Self { jobs }
    }
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/v1/jobs", get(list_jobs))
        .with_state(state)
}

// ============================================
// HTTP Handlers
// ============================================

/// GET /v1/jobs - List queued jobs, newest first
#[utoipa::path(
    get,
    path = "/v1/jobs",
    params(JobsQuery),
    responses(
        (status = 200, description = "List of jobs", body = ListResponse<JobSummary>),
        (status = 400, description = "Unknown status", body = ErrorResponse),
        (status = 500, description = "Internal server error")
    ),
    tag = "jobs"
)]
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<JobsQuery>,
) -> Result<Json<ListResponse<JobSummary>>, (StatusCode, Json<ErrorResponse>)> {
    let mut filter = JobFilter::queue(query.queue.unwrap_or_else(|| EMAILS_QUEUE.to_string()));
    if let Some(status) = query.status.as_deref() {
        let status: JobStatus = status
            .parse()
            .map_err(|e: String| ErrorResponse::new(e).into_response(StatusCode::BAD_REQUEST))?;
        filter = filter.with_status(status);
    }

    let pagination = Pagination {
        limit: query.limit.unwrap_or(100).min(1000),
        ..Pagination::default()
    };

    let jobs = state
        .jobs
        .list_jobs(filter, pagination)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list jobs: {}", e);
            ErrorResponse::new("Internal server error")
                .into_response(StatusCode::INTERNAL_SERVER_ERROR)
        })?;

    Ok(Json(ListResponse::new(
        jobs.into_iter().map(JobSummary::from).collect(),
    )))
}

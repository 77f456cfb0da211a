// Lendwise API server
// Decision: One process serves the HTTP API and runs the notification worker pool
// Decision: Entity data is in memory; DATABASE_URL moves the job queue to PostgreSQL

use anyhow::{Context, Result};
use axum::http::{header, HeaderValue, Method};
use axum::{routing::get, Json, Router};
use lendwise_control_plane::config::AppConfig;
use lendwise_control_plane::mail::HttpMailer;
use lendwise_control_plane::openapi::ApiDoc;
use lendwise_control_plane::storage::InMemoryLibraryStore;
use lendwise_control_plane::LendwiseApp;
use lendwise_core::telemetry::{init_telemetry, TelemetryConfig};
use lendwise_core::{LogMailer, Mailer};
use lendwise_durable::{InMemoryJobStore, JobStore, PostgresJobStore};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let mut telemetry_config = TelemetryConfig::from_env();
    if telemetry_config.service_name == "lendwise" {
        telemetry_config.service_name = "lendwise-control-plane".to_string();
    }
    if telemetry_config.log_filter.is_none() {
        telemetry_config.log_filter = Some(
            "lendwise_control_plane=info,lendwise_durable=info,lendwise_core=info,tower_http=info"
                .to_string(),
        );
    }
    telemetry_config.service_version = Some(env!("CARGO_PKG_VERSION").to_string());
    init_telemetry(telemetry_config);

    tracing::info!("lendwise-control-plane starting...");

    let config = AppConfig::from_env().context("Invalid configuration")?;

    // Job queue
    let jobs: Arc<dyn JobStore> = match &config.database_url {
        Some(url) => {
            let store = PostgresJobStore::connect(url)
                .await
                .context("Failed to connect to job queue database")?;
            tracing::info!("Using PostgreSQL job queue");
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, notification jobs are kept in memory");
            Arc::new(InMemoryJobStore::new())
        }
    };

    // Mail transport
    let mailer: Arc<dyn Mailer> = match &config.mail_relay_url {
        Some(url) => {
            tracing::info!(relay = %url, "Using HTTP mail relay");
            Arc::new(HttpMailer::new(url.clone(), config.mail_from.clone()))
        }
        None => {
            tracing::info!("MAIL_RELAY_URL not set, emails are logged only");
            Arc::new(LogMailer)
        }
    };

    let app = LendwiseApp::new(
        Arc::new(InMemoryLibraryStore::new()),
        jobs,
        mailer,
        config.notifications.clone(),
    )
    .context("Failed to build application")?;

    app.worker
        .start()
        .await
        .context("Failed to start notification worker")?;
    tracing::info!(
        delay_secs = config.notifications.delay.as_secs(),
        concurrency = config.notifications.worker_concurrency,
        "Notification worker started"
    );

    if !config.api_prefix.is_empty() {
        tracing::info!(prefix = %config.api_prefix, "API prefix configured");
    }

    // Only needed when the dashboard is served from a different origin than the API
    let cors_origins: Vec<HeaderValue> = config
        .cors_allowed_origins
        .iter()
        .filter_map(|s| s.parse().ok())
        .collect();
    if cors_origins.is_empty() {
        tracing::info!("CORS not configured (same-origin requests only)");
    } else {
        tracing::info!(origins = ?cors_origins, "CORS origins configured");
    }

    // Build main router with health (not prefixed) and prefixed API routes
    let router = Router::new()
        .route("/health", get(health))
        .merge(build_router_with_prefix(app.api_routes(), &config.api_prefix))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()));

    // Add CORS layer only if origins are configured
    let router = if !cors_origins.is_empty() {
        router.layer(
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(cors_origins))
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PATCH,
                    Method::OPTIONS,
                ])
                .allow_headers([
                    header::CONTENT_TYPE,
                    header::ACCEPT,
                    header::ORIGIN,
                    header::CACHE_CONTROL,
                ])
                .allow_credentials(true),
        )
    } else {
        router
    };

    let router = router.layer(TraceLayer::new_for_http());

    // Start HTTP server
    let listener = tokio::net::TcpListener::bind(&config.http_addr)
        .await
        .context("Failed to bind to address")?;
    tracing::info!("HTTP server listening on {}", config.http_addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("HTTP server stopped, draining notification worker");
    if let Err(e) = app.worker.shutdown().await {
        tracing::warn!("Notification worker did not drain cleanly: {}", e);
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}

/// Build router with optional API prefix (extracted for testing)
fn build_router_with_prefix<S: Clone + Send + Sync + 'static>(
    api_routes: Router<S>,
    api_prefix: &str,
) -> Router<S> {
    if api_prefix.is_empty() {
        api_routes
    } else {
        Router::new().nest(api_prefix, api_routes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_routes() -> Router {
        Router::new().route("/v1/test", get(|| async { "ok" }))
    }

    #[tokio::test]
    async fn test_api_prefix_empty() {
        let app = build_router_with_prefix(test_routes(), "");

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v1/test")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn test_api_prefix_set() {
        let app = build_router_with_prefix(test_routes(), "/api");

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/test")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), 200);

        // Route should NOT work without prefix
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v1/test")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), 404);
    }

    #[tokio::test]
    async fn test_health() {
        let response = Router::new()
            .route("/health", get(health))
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
    }
}

// Application wiring
//
// Builds the write path (services -> emitter -> event bus -> listeners), the
// broadcast hub, the notification worker pool and the API router from a
// library store, a job store and a mailer. The binary and the integration
// tests share this so both run the same pipeline.

use std::sync::Arc;

use axum::Router;
use lendwise_core::{EventBus, LibraryStore, MailError, MailRenderer, Mailer, EMAILS_QUEUE};
use lendwise_durable::{JobStore, WorkerPool, WorkerPoolConfig};

use crate::api;
use crate::broadcast::BroadcastHub;
use crate::config::NotificationSettings;
use crate::jobs::NotificationHandler;
use crate::listeners::{BroadcastListener, NotificationListener};
use crate::services::{CatalogService, DashboardService, LendingService, StatusEventEmitter};

pub struct LendwiseApp {
    pub store: Arc<dyn LibraryStore>,
    pub jobs: Arc<dyn JobStore>,
    pub bus: Arc<EventBus>,
    pub hub: Arc<BroadcastHub>,
    pub catalog: Arc<CatalogService>,
    pub lending: Arc<LendingService>,
    pub dashboard: Arc<DashboardService>,
    pub worker: Arc<WorkerPool>,
}

impl LendwiseApp {
    /// Wire the application. The worker pool is created but not started.
    pub fn new(
        store: Arc<dyn LibraryStore>,
        jobs: Arc<dyn JobStore>,
        mailer: Arc<dyn Mailer>,
        settings: NotificationSettings,
    ) -> Result<Self, MailError> {
        let hub = Arc::new(BroadcastHub::default());

        // Queue first, then broadcast
        let bus = Arc::new(
            EventBus::new()
                .with_listener(Arc::new(NotificationListener::new(
                    Arc::clone(&jobs),
                    settings.clone(),
                )))
                .with_listener(Arc::new(BroadcastListener::new(Arc::clone(&hub)))),
        );

        let emitter = StatusEventEmitter::new(Arc::clone(&store), bus.clone());
        let lending = Arc::new(LendingService::new(Arc::clone(&store), emitter));
        let catalog = Arc::new(CatalogService::new(Arc::clone(&store)));
        let dashboard = Arc::new(DashboardService::new(Arc::clone(&store)));

        let worker = Arc::new(WorkerPool::new(
            Arc::clone(&jobs),
            WorkerPoolConfig::new(vec![EMAILS_QUEUE.to_string()])
                .with_max_concurrency(settings.worker_concurrency)
                .with_poller(settings.poller.clone()),
        ));
        let renderer = MailRenderer::new(settings.library_name.clone())?;
        Arc::new(NotificationHandler::new(Arc::clone(&store), renderer, mailer)).register(&worker);

        Ok(Self {
            store,
            jobs,
            bus,
            hub,
            catalog,
            lending,
            dashboard,
            worker,
        })
    }

    /// All `/v1` API routes, without health, docs or middleware
    pub fn api_routes(&self) -> Router {
        Router::new()
            .merge(api::library::routes(api::library::AppState::new(
                self.catalog.clone(),
            )))
            .merge(api::loans::routes(api::loans::AppState::new(
                self.lending.clone(),
            )))
            .merge(api::transactions::routes(
                api::transactions::AppState::new(self.lending.clone()),
            ))
            .merge(api::dashboard::routes(api::dashboard::AppState::new(
                self.dashboard.clone(),
            )))
            .merge(api::channels::routes(api::channels::AppState::new(
                self.hub.clone(),
            )))
            .merge(api::jobs::routes(api::jobs::AppState::new(
                self.jobs.clone(),
            )))
    }
}

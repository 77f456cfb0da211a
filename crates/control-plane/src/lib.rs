// Lendwise Control Plane Library
// Decision: Shared library for binaries (API server, OpenAPI export) and integration tests

// Configuration
pub mod config;

// API routes and types (shared for OpenAPI generation)
pub mod api;

// Application wiring
pub mod app;
pub use app::LendwiseApp;

// Services layer
pub mod services;
pub use services::{CatalogService, DashboardService, LendingService};

// Storage layer
pub mod storage;

// Status event subscribers and realtime fan-out
pub mod broadcast;
pub mod listeners;

// Notification delivery
pub mod jobs;
pub mod mail;

// OpenAPI spec generation
pub mod openapi;

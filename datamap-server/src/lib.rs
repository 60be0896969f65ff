//! datamap-server library interface
//!
//! Exposes the application state, router and engine modules for
//! integration testing.

pub mod api;
pub mod db;
pub mod error;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use datamap_common::config::Settings;
use datamap_common::events::EventBus;
use sqlx::PgPool;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Metadata + canonical staging store
    pub db: PgPool,
    /// Runtime settings
    pub settings: Arc<Settings>,
    /// Event bus for SSE progress broadcasting
    pub event_bus: EventBus,
    /// Repositories with a load or send run in flight; one run per
    /// repository at a time
    pub active_runs: Arc<RwLock<HashSet<String>>>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(db: PgPool, settings: Settings, event_bus: EventBus) -> Self {
        Self {
            db,
            settings: Arc::new(settings),
            event_bus,
            active_runs: Arc::new(RwLock::new(HashSet::new())),
            startup_time: Utc::now(),
        }
    }

    /// Claim a repository for a background run; false when already claimed
    pub async fn claim_run(&self, repository: &str) -> bool {
        self.active_runs.write().await.insert(repository.to_string())
    }

    /// Release a repository after its run finished or failed
    pub async fn release_run(&self, repository: &str) {
        self.active_runs.write().await.remove(repository);
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::dictionary_routes())
        .merge(api::mapping_routes())
        .merge(api::extraction_routes())
        .merge(api::transmission_routes())
        .merge(api::dqa_routes())
        .merge(api::connection_routes())
        .merge(api::site_routes())
        .merge(api::sse_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

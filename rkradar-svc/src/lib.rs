//! rkradar-svc - Riigikogu Radar service
//!
//! Ingests Estonian parliamentary voting records, recomputes per-member
//! statistics, trains a vote-prediction model, and serves predictions over
//! a small HTTP API. Long-running jobs (sync, backtest, train, diagnose,
//! plan) run as lease-gated background tasks triggered over HTTP.

pub mod api;
pub mod error;
pub mod prediction;
pub mod stats;
pub mod sync;
pub mod tasks;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::RwLock;

use rkradar_common::config::Settings;

use crate::prediction::model::ModelRegistry;
use crate::tasks::lease::TaskLeases;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Resolved service settings
    pub settings: Arc<Settings>,
    /// The deployed model; replaced only by the trainer
    pub registry: Arc<RwLock<ModelRegistry>>,
    /// Single-slot leases, one per background job type
    pub leases: TaskLeases,
    /// Service startup timestamp for uptime reporting
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(db: SqlitePool, settings: Settings) -> Self {
        Self {
            db,
            settings: Arc::new(settings),
            registry: Arc::new(RwLock::new(ModelRegistry::default())),
            leases: TaskLeases::new(),
            startup_time: Utc::now(),
        }
    }
}

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{get, post};

    Router::new()
        .route("/health", get(api::health::health))
        .route("/predict/:slug", post(api::predict::predict_mp))
        .route("/sync", post(api::jobs::trigger_sync))
        .route("/backtest", post(api::jobs::trigger_backtest))
        .route("/train", post(api::jobs::trigger_train))
        .route("/diagnose", post(api::jobs::trigger_diagnose))
        .route("/plan", post(api::jobs::trigger_plan))
        .route("/sync/status", get(api::status::sync_status))
        .route("/backtest/status", get(api::status::backtest_status))
        .route("/accuracy", get(api::status::accuracy))
        .with_state(state)
}

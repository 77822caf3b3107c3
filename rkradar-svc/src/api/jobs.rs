//! Lease-gated background job triggers. Each handler tries to take the
//! job's single-slot lease; on success the work runs in a detached task
//! and the request returns immediately.

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use tracing::{error, info};

use crate::prediction::{backtest, model};
use crate::tasks::{detect, diagnose, plan, resolve};
use crate::{stats, sync, AppState};

fn started() -> Json<Value> {
    Json(json!({"status": "started"}))
}

fn already_running() -> Json<Value> {
    Json(json!({"status": "already_running"}))
}

pub async fn trigger_sync(State(state): State<AppState>) -> Json<Value> {
    let Some(guard) = state.leases.sync.acquire() else {
        return already_running();
    };
    tokio::spawn(async move {
        let _guard = guard;
        let session = match sync::SyncSession::new(&state.db, &state.settings) {
            Ok(session) => session,
            Err(e) => {
                error!(error = %e, "sync session init failed");
                return;
            }
        };
        let results = session.sync_all().await;
        info!(?results, "sync finished");

        if let Err(e) = stats::recompute_all_stats(&state.db).await {
            error!(error = %e, "stats recompute failed");
        }
        if let Err(e) = sync::embeddings::generate_embeddings(&state.db, &state.settings).await {
            error!(error = %e, "embedding backfill failed");
        }
        if let Err(e) = resolve::resolve_predictions(&state.db).await {
            error!(error = %e, "prediction resolution failed");
        }
    });
    started()
}

pub async fn trigger_backtest(State(state): State<AppState>) -> Json<Value> {
    let Some(guard) = state.leases.backtest.acquire() else {
        return already_running();
    };
    tokio::spawn(async move {
        let _guard = guard;
        let cutoff = state.settings.model_cutoff_date.clone();
        match backtest::run_backtest(&state.db, &state.registry, &cutoff).await {
            Ok(Some(report)) => info!(
                overall = report.overall,
                total = report.total,
                "backtest finished"
            ),
            Ok(None) => info!("backtest skipped, no scorable votings"),
            Err(e) => error!(error = %e, "backtest failed"),
        }
    });
    started()
}

pub async fn trigger_train(State(state): State<AppState>) -> Json<Value> {
    let Some(guard) = state.leases.train.acquire() else {
        return already_running();
    };
    tokio::spawn(async move {
        let _guard = guard;
        let cutoff = state.settings.model_cutoff_date.clone();
        match model::train_model(&state.db, &state.registry, &cutoff).await {
            Ok(model::TrainOutcome::Trained(summary)) => info!(
                version = %summary.version,
                test_accuracy = summary.test_accuracy,
                promoted = summary.promoted,
                "training finished"
            ),
            Ok(model::TrainOutcome::InsufficientData { samples }) => {
                info!(samples, "training skipped, not enough data")
            }
            Err(e) => error!(error = %e, "training failed"),
        }
    });
    started()
}

pub async fn trigger_diagnose(State(state): State<AppState>) -> Json<Value> {
    let Some(guard) = state.leases.diagnose.acquire() else {
        return already_running();
    };
    tokio::spawn(async move {
        let _guard = guard;
        if let Err(e) = diagnose::diagnose_errors(&state.db).await {
            error!(error = %e, "diagnosis failed");
        }
    });
    started()
}

pub async fn trigger_plan(State(state): State<AppState>) -> Json<Value> {
    let Some(guard) = state.leases.plan.acquire() else {
        return already_running();
    };
    tokio::spawn(async move {
        let _guard = guard;
        if let Err(e) = plan::plan_improvements(&state.db).await {
            error!(error = %e, "planning failed");
        }
        if let Err(e) = detect::detect_anomalies(&state.db).await {
            error!(error = %e, "anomaly detection failed");
        }
    });
    started()
}

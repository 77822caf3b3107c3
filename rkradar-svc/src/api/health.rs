use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};

use rkradar_common::db::{model_state, progress};

use crate::AppState;

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let db_ok = sqlx::query("SELECT 1")
        .fetch_one(&state.db)
        .await
        .is_ok();
    let uptime = (Utc::now() - state.startup_time).num_seconds();

    let live_version = state.registry.read().await.version().to_string();

    let mut body = json!({
        "status": if db_ok { "ok" } else { "degraded" },
        "db": if db_ok { "connected" } else { "disconnected" },
        "uptime_seconds": uptime,
        "model_version": live_version,
    });

    // Best-effort extras; a broken table never fails the health check
    if let Ok(stored) = model_state::load_model_state(&state.db).await {
        if let Some(overall) = stored.accuracy.and_then(|a| a.overall) {
            body["accuracy"] = json!(overall);
        }
        // The in-memory registry starts empty after a restart; the stored
        // version is the more informative answer then
        if let Some(version) = stored.version {
            let live = body["model_version"].as_str().unwrap_or("untrained");
            if live == "untrained" || live == crate::prediction::baseline::BASELINE_VERSION {
                body["model_version"] = json!(version);
            }
        }
    }
    if let Ok(votings) = progress::get_sync_progress(&state.db, "votings").await {
        if let Some(last_run) = votings.last_run_at {
            body["last_sync"] = json!(last_run.to_rfc3339());
        }
    }

    Json(body)
}

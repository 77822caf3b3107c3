use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use rkradar_common::db::{model_state, progress};

use crate::{ApiResult, AppState};

pub async fn sync_status(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let rows = progress::list_sync_progress(&state.db).await?;
    Ok(Json(json!({ "sync": rows })))
}

/// The raw model-state document. Readers tolerate absent fields; before
/// any job has run this is mostly nulls.
pub async fn backtest_status(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let stored = model_state::load_model_state(&state.db).await?;
    Ok(Json(serde_json::to_value(&stored).map_err(rkradar_common::Error::from)?))
}

pub async fn accuracy(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let stored = model_state::load_model_state(&state.db).await?;
    let accuracy = stored.accuracy.unwrap_or_default();
    Ok(Json(json!({
        "overall": accuracy.overall,
        "baseline": stored.baseline_accuracy,
        "improvement": stored.improvement_over_baseline,
        "by_party": accuracy.by_party,
        "by_vote_type": accuracy.by_vote_type,
        "trend": stored.trend.unwrap_or_default(),
        "sample_size": stored.training_size.unwrap_or(0),
        "model_version": stored.version,
    })))
}

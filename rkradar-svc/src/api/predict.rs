use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use tracing::warn;
use uuid::Uuid;

use rkradar_common::db::models::{BillInput, PredictionOutput, PredictionRecord};
use rkradar_common::db::{drafts, members, predictions};
use rkradar_common::domain::bill_hash;

use crate::prediction::model::predict_vote;
use crate::sync::EmbeddingClient;
use crate::{ApiError, ApiResult, AppState};

pub async fn predict_mp(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Json(bill): Json<BillInput>,
) -> ApiResult<Json<PredictionOutput>> {
    if bill.title.trim().is_empty() {
        return Err(ApiError::BadRequest("bill title is required".to_string()));
    }
    let mp = members::get_mp_by_slug(&state.db, &slug)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("no MP with slug {slug}")))?;

    let hash = bill_hash(
        &bill.title,
        bill.description.as_deref(),
        bill.full_text.as_deref(),
    );
    let cache_key = format!("{slug}:{hash}");
    if let Some(mut cached) = predictions::cache_get(&state.db, &cache_key).await? {
        cached.cached = true;
        return Ok(Json(cached));
    }

    // A known draft contributes its stored embedding and initiators; an
    // ad-hoc bill gets embedded on the fly, degrading to no embedding
    let mut embedding = None;
    let mut initiators = Vec::new();
    if let Some(draft_uuid) = bill.draft_uuid.as_deref() {
        if let Some(draft) = drafts::get_draft(&state.db, draft_uuid).await? {
            embedding = draft.embedding;
            initiators = draft.initiators;
        }
    }
    if embedding.is_none() {
        embedding = embed_bill(&state, &bill).await;
    }

    let output = predict_vote(
        &state.db,
        &state.registry,
        &mp,
        embedding.as_deref(),
        &initiators,
    )
    .await?;

    predictions::cache_put(
        &state.db,
        &cache_key,
        &slug,
        &hash,
        &output,
        state.settings.prediction_cache_ttl_days,
    )
    .await?;

    let record = PredictionRecord {
        id: Uuid::new_v4().to_string(),
        mp_slug: slug,
        mp_uuid: Some(mp.member_uuid.clone()),
        draft_uuid: bill.draft_uuid.clone(),
        bill_title: bill.title.clone(),
        bill_hash: hash,
        predicted: output.prediction,
        confidence: output.confidence,
        features_used: output.features.clone(),
        model_version: output.model_version.clone(),
        predicted_at: Utc::now(),
        actual: None,
        correct: None,
        resolved_at: None,
    };
    predictions::insert_prediction(&state.db, &record).await?;

    Ok(Json(output))
}

async fn embed_bill(state: &AppState, bill: &BillInput) -> Option<Vec<f32>> {
    if state.settings.embedding_api_key.is_empty() {
        return None;
    }
    let text = match bill.description.as_deref() {
        Some(desc) if !desc.is_empty() && desc != bill.title => {
            format!("{} {desc}", bill.title)
        }
        _ => bill.title.clone(),
    };
    let client = match EmbeddingClient::new(&state.settings) {
        Ok(client) => client,
        Err(e) => {
            warn!(error = %e, "embedding client unavailable");
            return None;
        }
    };
    match client.embed_one(&text).await {
        Ok(embedding) => embedding,
        Err(e) => {
            warn!(error = %e, "bill embedding failed, predicting without it");
            None
        }
    }
}

//! Categorize prediction failures.
//!
//! Each resolved-incorrect prediction gets one of five categories so the
//! planner can react differently to each failure mode:
//! - `free_vote`: the party itself split badly (cohesion < 0.6)
//! - `party_split`: a significant party minority (cohesion < 0.7)
//! - `stale_profile`: the member's party scores under 70% in backtests
//! - `coalition_shift`: reserved for the anomaly detector's findings
//! - `feature_gap`: a high-confidence miss, or not enough context to say

use std::collections::BTreeMap;

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::info;

use rkradar_common::db::models::PredictionRecord;
use rkradar_common::db::{members, model_state, predictions, votings};
use rkradar_common::Result;

use crate::prediction::{majority_decision, party_decisions};

const HIGH_CONFIDENCE: f64 = 0.85;
const FREE_VOTE_COHESION: f64 = 0.6;
const PARTY_SPLIT_COHESION: f64 = 0.7;
const STALE_ACCURACY: f64 = 70.0;

const CATEGORIES: [&str; 5] = [
    "free_vote",
    "party_split",
    "stale_profile",
    "coalition_shift",
    "feature_gap",
];

pub async fn diagnose_errors(pool: &SqlitePool) -> Result<BTreeMap<String, i64>> {
    let errors = predictions::incorrect_resolved_predictions(pool).await?;

    let mut categories: BTreeMap<String, i64> = CATEGORIES
        .iter()
        .map(|c| (c.to_string(), 0))
        .collect();
    if errors.is_empty() {
        info!("no prediction errors to diagnose");
        return Ok(categories);
    }

    let backtest_by_party = model_state::load_model_state(pool)
        .await?
        .accuracy
        .map(|a| a.by_party)
        .unwrap_or_default();

    for error in &errors {
        let category = categorize(pool, error, &backtest_by_party).await?;
        *categories.entry(category.to_string()).or_default() += 1;
    }

    let total = errors.len();
    let snapshot = categories.clone();
    model_state::update_model_state(pool, move |state| {
        state.error_categories = Some(snapshot);
        state.last_diagnosed_at = Some(Utc::now());
    })
    .await?;

    info!(total, ?categories, "error diagnosis complete");
    Ok(categories)
}

async fn categorize(
    pool: &SqlitePool,
    error: &PredictionRecord,
    backtest_by_party: &BTreeMap<String, f64>,
) -> Result<&'static str> {
    if error.confidence > HIGH_CONFIDENCE {
        return Ok("feature_gap");
    }

    let Some(mp_uuid) = error.mp_uuid.as_deref() else {
        return Ok("feature_gap");
    };
    let Some(draft_uuid) = error.draft_uuid.as_deref() else {
        return Ok("feature_gap");
    };
    let Some(voting) = votings::find_voting_by_draft(pool, draft_uuid).await? else {
        return Ok("feature_gap");
    };

    let party_code = match members::get_mp_by_uuid(pool, mp_uuid).await? {
        Some(mp) => mp.party_code,
        None => return Ok("feature_gap"),
    };

    let decisions = party_decisions(&voting, &party_code);
    let Some(majority) = majority_decision(&decisions) else {
        return Ok("feature_gap");
    };
    let agreeing = decisions.iter().filter(|d| **d == majority).count();
    let cohesion = agreeing as f64 / decisions.len() as f64;

    if cohesion < FREE_VOTE_COHESION {
        return Ok("free_vote");
    }
    if cohesion < PARTY_SPLIT_COHESION {
        return Ok("party_split");
    }

    if backtest_by_party
        .get(&party_code)
        .is_some_and(|acc| *acc < STALE_ACCURACY)
    {
        return Ok("stale_profile");
    }

    Ok("feature_gap")
}

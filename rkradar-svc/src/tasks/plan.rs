//! Improvement planning from live model state.
//!
//! The roadmap is data: each run reads the current accuracy, error
//! categories, and feature importances, ranks what would help most, and
//! appends the plan to a bounded history so later backtests can judge
//! whether a plan paid off.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::info;

use rkradar_common::db::model_state;
use rkradar_common::db::models::{ModelState, PlanEntry, PlanPriority};
use rkradar_common::Result;

const ACCURACY_TARGET: f64 = 88.0;
const WEAK_PARTY_MARGIN: f64 = 5.0;
const LOW_IMPORTANCE: f64 = 0.01;
const DEFAULT_BASELINE: f64 = 85.0;
const PLAN_HISTORY_LIMIT: usize = 50;

pub async fn plan_improvements(pool: &SqlitePool) -> Result<Vec<PlanPriority>> {
    let state = model_state::load_model_state(pool).await?;
    let priorities = build_priorities(&state);

    let entry = PlanEntry {
        date: Utc::now().format("%Y-%m-%d").to_string(),
        priorities: priorities.clone(),
        outcome: None,
    };
    let snapshot = priorities.clone();
    model_state::update_model_state(pool, move |state| {
        state.improvement_priorities = Some(snapshot);
        let history = state.plan_history.get_or_insert_with(Vec::new);
        history.push(entry);
        if history.len() > PLAN_HISTORY_LIMIT {
            let excess = history.len() - PLAN_HISTORY_LIMIT;
            history.drain(..excess);
        }
    })
    .await?;

    info!(count = priorities.len(), "improvement plan written");
    Ok(priorities)
}

fn build_priorities(state: &ModelState) -> Vec<PlanPriority> {
    let mut priorities = Vec::new();
    let baseline = state.baseline_accuracy.unwrap_or(DEFAULT_BASELINE);

    if let Some(accuracy) = &state.accuracy {
        let weak: Vec<(&String, f64)> = accuracy
            .by_party
            .iter()
            .filter(|(_, acc)| **acc < baseline - WEAK_PARTY_MARGIN)
            .map(|(party, acc)| (party, *acc))
            .collect();
        if !weak.is_empty() {
            let mut names: Vec<&str> = weak.iter().map(|(p, _)| p.as_str()).collect();
            names.sort_unstable();
            priorities.push(PlanPriority {
                area: "weak_parties".to_string(),
                expected_gain: weak.len() as f64 * 0.1,
                action: format!(
                    "Investigate {} parties scoring below baseline: {}",
                    weak.len(),
                    names.join(", ")
                ),
            });
        }
    }

    if let Some(categories) = &state.error_categories {
        if let Some((top, count)) = categories
            .iter()
            .max_by_key(|(_, count)| **count)
            .filter(|(_, count)| **count > 0)
        {
            let action = match top.as_str() {
                "free_vote" => "Add free-vote detection feature (party cohesion threshold)",
                "party_split" => "Add real-time party cohesion monitoring",
                "stale_profile" => "Recompute stats and retrain for affected parties",
                "coalition_shift" => "Recalculate coalition membership from recent votings",
                "feature_gap" => "Investigate high-confidence failures for missing signal",
                other => other,
            };
            priorities.push(PlanPriority {
                area: format!("error_category:{top}"),
                expected_gain: *count as f64 * 0.05,
                action: action.to_string(),
            });
        }
    }

    if let Some(importances) = &state.feature_importances {
        let low: Vec<&str> = importances
            .iter()
            .filter(|f| f.importance < LOW_IMPORTANCE)
            .map(|f| f.name.as_str())
            .collect();
        if !low.is_empty() {
            priorities.push(PlanPriority {
                area: "low_importance_features".to_string(),
                expected_gain: 0.5,
                action: format!("Consider replacing low-importance features: {}", low.join(", ")),
            });
        }
    }

    if let Some(overall) = state.accuracy.as_ref().and_then(|a| a.overall) {
        if overall < ACCURACY_TARGET {
            let gap = ACCURACY_TARGET - overall;
            priorities.push(PlanPriority {
                area: "overall_accuracy".to_string(),
                expected_gain: gap,
                action: format!(
                    "Overall accuracy {overall:.1}% is {gap:.1}pp below the {ACCURACY_TARGET:.0}% target"
                ),
            });
        }
    }

    priorities.sort_by(|a, b| {
        b.expected_gain
            .partial_cmp(&a.expected_gain)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    priorities
}

//! Model state singleton
//!
//! Exactly one row, keyed by a constant id. Several jobs (train, backtest,
//! diagnose, plan, detect) each own a disjoint group of fields; updates go
//! through a read-merge-write mutator so one job's write never clears
//! another job's fields.

use sqlx::SqlitePool;

use crate::db::models::{ModelState, TrendPoint};
use crate::Result;

const STATE_ID: &str = "current";

/// Trend entries kept after each append
pub const TREND_CAP: usize = 100;

pub async fn load_model_state(pool: &SqlitePool) -> Result<ModelState> {
    let json: Option<String> =
        sqlx::query_scalar("SELECT state FROM model_state WHERE id = ?")
            .bind(STATE_ID)
            .fetch_optional(pool)
            .await?;
    match json {
        Some(json) => Ok(serde_json::from_str(&json)?),
        None => Ok(ModelState::default()),
    }
}

/// Apply a field-level partial update: load (or default), mutate, store.
pub async fn update_model_state<F>(pool: &SqlitePool, mutate: F) -> Result<ModelState>
where
    F: FnOnce(&mut ModelState),
{
    let mut state = load_model_state(pool).await?;
    mutate(&mut state);
    let json = serde_json::to_string(&state)?;
    sqlx::query(
        r#"
        INSERT INTO model_state (id, state) VALUES (?, ?)
        ON CONFLICT(id) DO UPDATE SET state = excluded.state
        "#,
    )
    .bind(STATE_ID)
    .bind(&json)
    .execute(pool)
    .await?;
    Ok(state)
}

/// Append a trend point, keeping only the newest [`TREND_CAP`] entries.
pub fn push_trend(state: &mut ModelState, point: TrendPoint) {
    let trend = state.trend.get_or_insert_with(Vec::new);
    trend.push(point);
    if trend.len() > TREND_CAP {
        let excess = trend.len() - TREND_CAP;
        trend.drain(..excess);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_tables;

    #[tokio::test]
    async fn first_read_is_all_absent() {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        init_tables(&pool).await.unwrap();

        let state = load_model_state(&pool).await.unwrap();
        assert!(state.version.is_none());
        assert!(state.accuracy.is_none());
        assert!(state.trend.is_none());
    }

    #[tokio::test]
    async fn partial_updates_do_not_clobber_other_fields() {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        init_tables(&pool).await.unwrap();

        update_model_state(&pool, |s| {
            s.version = Some("baseline-v1".to_string());
            s.baseline_accuracy = Some(88.5);
        })
        .await
        .unwrap();

        // A different job writes a different field group
        update_model_state(&pool, |s| {
            s.error_categories = Some([("free_vote".to_string(), 3)].into_iter().collect());
        })
        .await
        .unwrap();

        let state = load_model_state(&pool).await.unwrap();
        assert_eq!(state.version.as_deref(), Some("baseline-v1"));
        assert_eq!(state.baseline_accuracy, Some(88.5));
        assert_eq!(
            state.error_categories.unwrap().get("free_vote"),
            Some(&3)
        );
    }

    #[tokio::test]
    async fn trend_is_capped() {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        init_tables(&pool).await.unwrap();

        update_model_state(&pool, |s| {
            for i in 0..(TREND_CAP + 20) {
                push_trend(s, TrendPoint { date: format!("2025-01-{:02}", i % 28 + 1), accuracy: i as f64 });
            }
        })
        .await
        .unwrap();

        let state = load_model_state(&pool).await.unwrap();
        let trend = state.trend.unwrap();
        assert_eq!(trend.len(), TREND_CAP);
        // Oldest entries were dropped
        assert!((trend[0].accuracy - 20.0).abs() < 1e-9);
    }
}

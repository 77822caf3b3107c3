//! Prediction log and content-addressed prediction cache

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::db::models::{FeatureValue, PredictionOutput, PredictionRecord};
use crate::domain::VoteDecision;
use crate::Result;

pub async fn insert_prediction(pool: &SqlitePool, record: &PredictionRecord) -> Result<()> {
    let features = serde_json::to_string(&record.features_used)?;
    sqlx::query(
        r#"
        INSERT INTO prediction_log (
            id, mp_slug, mp_uuid, draft_uuid, bill_title, bill_hash,
            predicted, confidence, features_used, model_version, predicted_at,
            actual, correct, resolved_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL, NULL, NULL)
        "#,
    )
    .bind(&record.id)
    .bind(&record.mp_slug)
    .bind(&record.mp_uuid)
    .bind(&record.draft_uuid)
    .bind(&record.bill_title)
    .bind(&record.bill_hash)
    .bind(record.predicted.as_str())
    .bind(record.confidence)
    .bind(&features)
    .bind(&record.model_version)
    .bind(record.predicted_at.to_rfc3339())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn unresolved_predictions(pool: &SqlitePool) -> Result<Vec<PredictionRecord>> {
    let rows = sqlx::query("SELECT * FROM prediction_log WHERE actual IS NULL")
        .fetch_all(pool)
        .await?;
    rows.into_iter().map(record_from_row).collect()
}

/// Resolved predictions that turned out wrong (diagnosis input).
pub async fn incorrect_resolved_predictions(pool: &SqlitePool) -> Result<Vec<PredictionRecord>> {
    let rows = sqlx::query(
        "SELECT * FROM prediction_log WHERE correct = 0 AND resolved_at IS NOT NULL",
    )
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(record_from_row).collect()
}

pub async fn mark_resolved(
    pool: &SqlitePool,
    id: &str,
    actual: VoteDecision,
    correct: bool,
) -> Result<()> {
    sqlx::query(
        "UPDATE prediction_log SET actual = ?, correct = ?, resolved_at = ? WHERE id = ?",
    )
    .bind(actual.as_str())
    .bind(correct)
    .bind(Utc::now().to_rfc3339())
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

fn record_from_row(row: sqlx::sqlite::SqliteRow) -> Result<PredictionRecord> {
    let features: Vec<FeatureValue> = serde_json::from_str(row.get("features_used"))?;
    let predicted: VoteDecision = parse_decision(row.get("predicted"))?;
    let actual = row
        .get::<Option<String>, _>("actual")
        .as_deref()
        .map(parse_decision)
        .transpose()?;
    Ok(PredictionRecord {
        id: row.get("id"),
        mp_slug: row.get("mp_slug"),
        mp_uuid: row.get("mp_uuid"),
        draft_uuid: row.get("draft_uuid"),
        bill_title: row.get("bill_title"),
        bill_hash: row.get("bill_hash"),
        predicted,
        confidence: row.get("confidence"),
        features_used: features,
        model_version: row.get("model_version"),
        predicted_at: parse_timestamp(row.get("predicted_at")),
        actual,
        correct: row.get::<Option<i64>, _>("correct").map(|c| c != 0),
        resolved_at: row
            .get::<Option<String>, _>("resolved_at")
            .as_deref()
            .map(parse_timestamp),
    })
}

fn parse_decision(s: &str) -> Result<VoteDecision> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .map_err(crate::Error::from)
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    s.parse().unwrap_or_else(|_| Utc::now())
}

// --- Prediction cache ---

pub async fn cache_get(pool: &SqlitePool, cache_key: &str) -> Result<Option<PredictionOutput>> {
    let row = sqlx::query(
        "SELECT prediction FROM prediction_cache WHERE cache_key = ? AND expires_at > ?",
    )
    .bind(cache_key)
    .bind(Utc::now().to_rfc3339())
    .fetch_optional(pool)
    .await?;
    row.map(|row| {
        let json: String = row.get("prediction");
        serde_json::from_str(&json).map_err(crate::Error::from)
    })
    .transpose()
}

pub async fn cache_put(
    pool: &SqlitePool,
    cache_key: &str,
    mp_slug: &str,
    bill_hash: &str,
    prediction: &PredictionOutput,
    ttl_days: i64,
) -> Result<()> {
    // Reads only mask expired rows; writes are the one place the cache
    // grows, so they also shed what has expired
    prune_cache(pool).await?;
    let json = serde_json::to_string(prediction)?;
    let now = Utc::now();
    let expires = now + chrono::Duration::days(ttl_days);
    sqlx::query(
        r#"
        INSERT INTO prediction_cache (cache_key, mp_slug, bill_hash, prediction, created_at, expires_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(cache_key) DO UPDATE SET
            prediction = excluded.prediction,
            created_at = excluded.created_at,
            expires_at = excluded.expires_at
        "#,
    )
    .bind(cache_key)
    .bind(mp_slug)
    .bind(bill_hash)
    .bind(&json)
    .bind(now.to_rfc3339())
    .bind(expires.to_rfc3339())
    .execute(pool)
    .await?;
    Ok(())
}

/// Delete expired cache rows. Returns the number pruned.
pub async fn prune_cache(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query("DELETE FROM prediction_cache WHERE expires_at <= ?")
        .bind(Utc::now().to_rfc3339())
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

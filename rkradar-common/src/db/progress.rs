//! Sync progress and per-year checkpoints

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::db::models::{SyncCheckpoint, SyncProgress};
use crate::Result;

pub async fn get_sync_progress(pool: &SqlitePool, sync_type: &str) -> Result<SyncProgress> {
    let row = sqlx::query(
        "SELECT sync_type, status, total_records, checkpoints, last_run_at, error
         FROM sync_progress WHERE sync_type = ?",
    )
    .bind(sync_type)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => {
            let checkpoints: Vec<SyncCheckpoint> = serde_json::from_str(row.get("checkpoints"))?;
            let last_run_at: Option<DateTime<Utc>> = row
                .get::<Option<String>, _>("last_run_at")
                .as_deref()
                .map(|s| s.parse())
                .transpose()
                .unwrap_or(None);
            Ok(SyncProgress {
                sync_type: row.get("sync_type"),
                status: row.get("status"),
                total_records: row.get("total_records"),
                checkpoints,
                last_run_at,
                error: row.get("error"),
            })
        }
        None => Ok(SyncProgress::idle(sync_type)),
    }
}

pub async fn list_sync_progress(pool: &SqlitePool) -> Result<Vec<SyncProgress>> {
    let types = sqlx::query_scalar::<_, String>(
        "SELECT sync_type FROM sync_progress ORDER BY sync_type",
    )
    .fetch_all(pool)
    .await?;

    let mut all = Vec::with_capacity(types.len());
    for t in types {
        all.push(get_sync_progress(pool, &t).await?);
    }
    Ok(all)
}

pub async fn save_sync_progress(pool: &SqlitePool, progress: &SyncProgress) -> Result<()> {
    let checkpoints = serde_json::to_string(&progress.checkpoints)?;
    sqlx::query(
        r#"
        INSERT INTO sync_progress (sync_type, status, total_records, checkpoints, last_run_at, error)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(sync_type) DO UPDATE SET
            status = excluded.status,
            total_records = excluded.total_records,
            checkpoints = excluded.checkpoints,
            last_run_at = excluded.last_run_at,
            error = excluded.error
        "#,
    )
    .bind(&progress.sync_type)
    .bind(&progress.status)
    .bind(progress.total_records)
    .bind(&checkpoints)
    .bind(progress.last_run_at.map(|t| t.to_rfc3339()))
    .bind(&progress.error)
    .execute(pool)
    .await?;
    Ok(())
}

/// Record a year checkpoint, replacing any existing entry for that year.
pub async fn save_checkpoint(
    pool: &SqlitePool,
    sync_type: &str,
    checkpoint: SyncCheckpoint,
) -> Result<()> {
    let mut progress = get_sync_progress(pool, sync_type).await?;
    match progress
        .checkpoints
        .iter_mut()
        .find(|cp| cp.year == checkpoint.year)
    {
        Some(existing) => *existing = checkpoint,
        None => progress.checkpoints.push(checkpoint),
    }
    save_sync_progress(pool, &progress).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_tables;

    #[tokio::test]
    async fn missing_progress_defaults_to_idle() {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        init_tables(&pool).await.unwrap();

        let progress = get_sync_progress(&pool, "votings").await.unwrap();
        assert_eq!(progress.status, "idle");
        assert!(progress.checkpoints.is_empty());
    }

    #[tokio::test]
    async fn checkpoint_replaces_same_year() {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        init_tables(&pool).await.unwrap();

        save_checkpoint(
            &pool,
            "votings",
            SyncCheckpoint { year: 2023, completed: false, record_count: 10, last_offset: 0 },
        )
        .await
        .unwrap();
        save_checkpoint(
            &pool,
            "votings",
            SyncCheckpoint { year: 2023, completed: true, record_count: 42, last_offset: 0 },
        )
        .await
        .unwrap();
        save_checkpoint(
            &pool,
            "votings",
            SyncCheckpoint { year: 2024, completed: false, record_count: 5, last_offset: 0 },
        )
        .await
        .unwrap();

        let progress = get_sync_progress(&pool, "votings").await.unwrap();
        assert_eq!(progress.checkpoints.len(), 2);
        assert!(progress.is_year_completed(2023));
        assert!(!progress.is_year_completed(2024));
    }
}

//! Database access for Riigikogu Radar
//!
//! One SQLite file, document-style tables keyed by natural ids. Nested
//! structures live in JSON text columns; every write is an upsert so
//! ingestion re-runs are idempotent.

pub mod drafts;
pub mod members;
pub mod model_state;
pub mod models;
pub mod predictions;
pub mod progress;
pub mod votings;

use anyhow::Result;
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize the database connection pool and create tables.
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    init_tables(&pool).await?;
    Ok(pool)
}

/// Create all tables if they don't exist.
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS members (
            uuid TEXT PRIMARY KEY,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            full_name TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            faction_name TEXT,
            party_code TEXT NOT NULL DEFAULT 'FR',
            photo_url TEXT,
            committees TEXT NOT NULL DEFAULT '[]',
            convocations TEXT NOT NULL DEFAULT '[]',
            synced_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS mps (
            slug TEXT PRIMARY KEY,
            member_uuid TEXT NOT NULL,
            name TEXT NOT NULL,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            party TEXT NOT NULL DEFAULT '',
            party_code TEXT NOT NULL DEFAULT 'FR',
            photo_url TEXT,
            status TEXT NOT NULL DEFAULT 'active',
            is_current_member INTEGER NOT NULL DEFAULT 1,
            committees TEXT NOT NULL DEFAULT '[]',
            convocations TEXT NOT NULL DEFAULT '[]',
            stats TEXT NOT NULL DEFAULT '{}'
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS votings (
            uuid TEXT PRIMARY KEY,
            title TEXT NOT NULL DEFAULT '',
            description TEXT,
            voting_time TEXT,
            session_date TEXT,
            result TEXT,
            in_favor INTEGER NOT NULL DEFAULT 0,
            against INTEGER NOT NULL DEFAULT 0,
            abstained INTEGER NOT NULL DEFAULT 0,
            absent INTEGER NOT NULL DEFAULT 0,
            voters TEXT NOT NULL DEFAULT '[]',
            related_draft_uuid TEXT,
            embedding TEXT,
            synced_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_votings_time ON votings(voting_time)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS drafts (
            uuid TEXT PRIMARY KEY,
            number TEXT,
            title TEXT NOT NULL DEFAULT '',
            summary TEXT,
            initiators TEXT NOT NULL DEFAULT '[]',
            submit_date TEXT,
            related_voting_uuids TEXT NOT NULL DEFAULT '[]',
            embedding TEXT,
            synced_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS stenograms (
            uuid TEXT PRIMARY KEY,
            session_date TEXT,
            session_type TEXT,
            speakers TEXT NOT NULL DEFAULT '[]',
            synced_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sync_progress (
            sync_type TEXT PRIMARY KEY,
            status TEXT NOT NULL DEFAULT 'idle',
            total_records INTEGER NOT NULL DEFAULT 0,
            checkpoints TEXT NOT NULL DEFAULT '[]',
            last_run_at TEXT,
            error TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS model_state (
            id TEXT PRIMARY KEY,
            state TEXT NOT NULL DEFAULT '{}'
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS prediction_log (
            id TEXT PRIMARY KEY,
            mp_slug TEXT NOT NULL,
            mp_uuid TEXT,
            draft_uuid TEXT,
            bill_title TEXT NOT NULL,
            bill_hash TEXT NOT NULL,
            predicted TEXT NOT NULL,
            confidence REAL NOT NULL,
            features_used TEXT NOT NULL DEFAULT '[]',
            model_version TEXT NOT NULL,
            predicted_at TEXT NOT NULL,
            actual TEXT,
            correct INTEGER,
            resolved_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS prediction_cache (
            cache_key TEXT PRIMARY KEY,
            mp_slug TEXT NOT NULL,
            bill_hash TEXT NOT NULL,
            prediction TEXT NOT NULL,
            created_at TEXT NOT NULL,
            expires_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Current size of the database file in bytes, from SQLite page accounting.
pub async fn database_size_bytes(pool: &SqlitePool) -> crate::Result<u64> {
    let page_count: i64 = sqlx::query_scalar("PRAGMA page_count")
        .fetch_one(pool)
        .await?;
    let page_size: i64 = sqlx::query_scalar("PRAGMA page_size")
        .fetch_one(pool)
        .await?;
    Ok((page_count as u64) * (page_size as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn init_tables_is_idempotent() {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        init_tables(&pool).await.unwrap();
        init_tables(&pool).await.unwrap();
        let size = database_size_bytes(&pool).await.unwrap();
        assert!(size > 0);
    }
}

//! Draft and stenogram queries

use chrono::Utc;
use sqlx::{Row, SqlitePool};

use crate::db::models::{Draft, Speaker, Stenogram};
use crate::Result;

pub async fn upsert_draft(pool: &SqlitePool, draft: &Draft) -> Result<()> {
    let initiators = serde_json::to_string(&draft.initiators)?;
    let related = serde_json::to_string(&draft.related_voting_uuids)?;

    sqlx::query(
        r#"
        INSERT INTO drafts (
            uuid, number, title, summary, initiators, submit_date,
            related_voting_uuids, embedding, synced_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, NULL, ?)
        ON CONFLICT(uuid) DO UPDATE SET
            number = excluded.number,
            title = excluded.title,
            summary = excluded.summary,
            initiators = excluded.initiators,
            submit_date = excluded.submit_date,
            related_voting_uuids = excluded.related_voting_uuids,
            synced_at = excluded.synced_at
        "#,
    )
    .bind(&draft.uuid)
    .bind(&draft.number)
    .bind(&draft.title)
    .bind(&draft.summary)
    .bind(&initiators)
    .bind(&draft.submit_date)
    .bind(&related)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_draft(pool: &SqlitePool, uuid: &str) -> Result<Option<Draft>> {
    let row = sqlx::query(
        "SELECT uuid, number, title, summary, initiators, submit_date,
                related_voting_uuids, embedding
         FROM drafts WHERE uuid = ?",
    )
    .bind(uuid)
    .fetch_optional(pool)
    .await?;
    row.map(draft_from_row).transpose()
}

pub async fn drafts_missing_embedding(pool: &SqlitePool, limit: i64) -> Result<Vec<Draft>> {
    let rows = sqlx::query(
        "SELECT uuid, number, title, summary, initiators, submit_date,
                related_voting_uuids, embedding
         FROM drafts WHERE embedding IS NULL ORDER BY submit_date DESC LIMIT ?",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(draft_from_row).collect()
}

pub async fn set_draft_embedding(pool: &SqlitePool, uuid: &str, embedding: &[f32]) -> Result<()> {
    let json = serde_json::to_string(embedding)?;
    sqlx::query("UPDATE drafts SET embedding = ? WHERE uuid = ?")
        .bind(&json)
        .bind(uuid)
        .execute(pool)
        .await?;
    Ok(())
}

fn draft_from_row(row: sqlx::sqlite::SqliteRow) -> Result<Draft> {
    let initiators: Vec<String> = serde_json::from_str(row.get("initiators"))?;
    let related: Vec<String> = serde_json::from_str(row.get("related_voting_uuids"))?;
    let embedding: Option<Vec<f32>> = row
        .get::<Option<String>, _>("embedding")
        .as_deref()
        .map(serde_json::from_str)
        .transpose()?;
    Ok(Draft {
        uuid: row.get("uuid"),
        number: row.get("number"),
        title: row.get("title"),
        summary: row.get("summary"),
        initiators,
        submit_date: row.get("submit_date"),
        related_voting_uuids: related,
        embedding,
    })
}

pub async fn upsert_stenogram(pool: &SqlitePool, steno: &Stenogram) -> Result<()> {
    let speakers = serde_json::to_string(&steno.speakers)?;
    sqlx::query(
        r#"
        INSERT INTO stenograms (uuid, session_date, session_type, speakers, synced_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(uuid) DO UPDATE SET
            session_date = excluded.session_date,
            session_type = excluded.session_type,
            speakers = excluded.speakers,
            synced_at = excluded.synced_at
        "#,
    )
    .bind(&steno.uuid)
    .bind(&steno.session_date)
    .bind(&steno.session_type)
    .bind(&speakers)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_stenogram(pool: &SqlitePool, uuid: &str) -> Result<Option<Stenogram>> {
    let row = sqlx::query(
        "SELECT uuid, session_date, session_type, speakers FROM stenograms WHERE uuid = ?",
    )
    .bind(uuid)
    .fetch_optional(pool)
    .await?;
    row.map(|row| -> Result<Stenogram> {
        let speakers: Vec<Speaker> = serde_json::from_str(row.get("speakers"))?;
        Ok(Stenogram {
            uuid: row.get("uuid"),
            session_date: row.get("session_date"),
            session_type: row.get("session_type"),
            speakers,
        })
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_tables;

    #[tokio::test]
    async fn draft_round_trip_with_embedding() {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        init_tables(&pool).await.unwrap();

        let draft = Draft {
            uuid: "d-1".to_string(),
            number: Some("123 SE".to_string()),
            title: "Maksuseaduse muutmise seadus".to_string(),
            summary: Some("Muudetakse maksumäärasid".to_string()),
            initiators: vec!["Vabariigi Valitsus".to_string()],
            submit_date: Some("2024-03-01".to_string()),
            related_voting_uuids: vec!["v-9".to_string()],
            embedding: None,
        };
        upsert_draft(&pool, &draft).await.unwrap();

        assert_eq!(drafts_missing_embedding(&pool, 10).await.unwrap().len(), 1);
        set_draft_embedding(&pool, "d-1", &[0.5; 4]).await.unwrap();
        assert!(drafts_missing_embedding(&pool, 10).await.unwrap().is_empty());

        // Re-sync keeps the embedding
        upsert_draft(&pool, &draft).await.unwrap();
        let loaded = get_draft(&pool, "d-1").await.unwrap().unwrap();
        assert!(loaded.embedding.is_some());
        assert_eq!(loaded.related_voting_uuids, vec!["v-9".to_string()]);
    }
}

//! Voting record queries
//!
//! Voter lists are JSON columns; member-participation filters go through
//! SQLite's `json_each` so the voter list never needs a separate table.

use chrono::Utc;
use sqlx::{Row, SqlitePool};

use crate::db::models::{Voter, Voting};
use crate::Result;

pub async fn upsert_voting(pool: &SqlitePool, voting: &Voting) -> Result<()> {
    let voters = serde_json::to_string(&voting.voters)?;
    let embedding = voting
        .embedding
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    sqlx::query(
        r#"
        INSERT INTO votings (
            uuid, title, description, voting_time, session_date, result,
            in_favor, against, abstained, absent, voters, related_draft_uuid,
            embedding, synced_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(uuid) DO UPDATE SET
            title = excluded.title,
            description = excluded.description,
            voting_time = excluded.voting_time,
            session_date = excluded.session_date,
            result = excluded.result,
            in_favor = excluded.in_favor,
            against = excluded.against,
            abstained = excluded.abstained,
            absent = excluded.absent,
            voters = excluded.voters,
            related_draft_uuid = excluded.related_draft_uuid,
            synced_at = excluded.synced_at
        "#,
    )
    .bind(&voting.uuid)
    .bind(&voting.title)
    .bind(&voting.description)
    .bind(&voting.voting_time)
    .bind(&voting.session_date)
    .bind(&voting.result)
    .bind(voting.in_favor)
    .bind(voting.against)
    .bind(voting.abstained)
    .bind(voting.absent)
    .bind(&voters)
    .bind(&voting.related_draft_uuid)
    .bind(&embedding)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn voting_exists(pool: &SqlitePool, uuid: &str) -> Result<bool> {
    let row = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM votings WHERE uuid = ?")
        .bind(uuid)
        .fetch_one(pool)
        .await?;
    Ok(row > 0)
}

const VOTING_COLUMNS: &str = "uuid, title, description, voting_time, session_date, result, \
     in_favor, against, abstained, absent, voters, related_draft_uuid, embedding";

/// Most recent votings, newest first.
pub async fn recent_votings(pool: &SqlitePool, limit: i64) -> Result<Vec<Voting>> {
    let rows = sqlx::query(&format!(
        "SELECT {VOTING_COLUMNS} FROM votings ORDER BY voting_time DESC LIMIT ?"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(voting_from_row).collect()
}

/// Votings strictly before `date`, newest first.
pub async fn votings_before(pool: &SqlitePool, date: &str, limit: i64) -> Result<Vec<Voting>> {
    let rows = sqlx::query(&format!(
        "SELECT {VOTING_COLUMNS} FROM votings WHERE voting_time < ? ORDER BY voting_time DESC LIMIT ?"
    ))
    .bind(date)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(voting_from_row).collect()
}

/// Votings at or after `date`, newest first.
pub async fn votings_since(pool: &SqlitePool, date: &str) -> Result<Vec<Voting>> {
    let rows = sqlx::query(&format!(
        "SELECT {VOTING_COLUMNS} FROM votings WHERE voting_time >= ? ORDER BY voting_time DESC"
    ))
    .bind(date)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(voting_from_row).collect()
}

/// Recent votings in which the given member appears as a voter.
pub async fn votings_with_member(
    pool: &SqlitePool,
    member_uuid: &str,
    limit: i64,
) -> Result<Vec<Voting>> {
    let rows = sqlx::query(&format!(
        "SELECT {VOTING_COLUMNS} FROM votings v
         WHERE EXISTS (
             SELECT 1 FROM json_each(v.voters) je
             WHERE json_extract(je.value, '$.member_uuid') = ?
         )
         ORDER BY voting_time DESC LIMIT ?"
    ))
    .bind(member_uuid)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(voting_from_row).collect()
}

/// Recent embedded votings a member participated in, optionally bounded by
/// a before-date (used by training-time feature computation to keep the
/// time-separation invariant).
pub async fn embedded_votings_with_member(
    pool: &SqlitePool,
    member_uuid: &str,
    before_date: Option<&str>,
    limit: i64,
) -> Result<Vec<Voting>> {
    let sql = match before_date {
        Some(_) => format!(
            "SELECT {VOTING_COLUMNS} FROM votings v
             WHERE v.embedding IS NOT NULL AND v.voting_time < ?
               AND EXISTS (
                   SELECT 1 FROM json_each(v.voters) je
                   WHERE json_extract(je.value, '$.member_uuid') = ?
               )
             ORDER BY voting_time DESC LIMIT ?"
        ),
        None => format!(
            "SELECT {VOTING_COLUMNS} FROM votings v
             WHERE v.embedding IS NOT NULL
               AND EXISTS (
                   SELECT 1 FROM json_each(v.voters) je
                   WHERE json_extract(je.value, '$.member_uuid') = ?
               )
             ORDER BY voting_time DESC LIMIT ?"
        ),
    };

    let mut query = sqlx::query(&sql);
    if let Some(date) = before_date {
        query = query.bind(date);
    }
    let rows = query.bind(member_uuid).bind(limit).fetch_all(pool).await?;
    rows.into_iter().map(voting_from_row).collect()
}

/// Recent votings that carry an embedding, regardless of participants.
pub async fn recent_embedded_votings(pool: &SqlitePool, limit: i64) -> Result<Vec<Voting>> {
    let rows = sqlx::query(&format!(
        "SELECT {VOTING_COLUMNS} FROM votings WHERE embedding IS NOT NULL
         ORDER BY voting_time DESC LIMIT ?"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(voting_from_row).collect()
}

pub async fn find_voting_by_draft(pool: &SqlitePool, draft_uuid: &str) -> Result<Option<Voting>> {
    let row = sqlx::query(&format!(
        "SELECT {VOTING_COLUMNS} FROM votings WHERE related_draft_uuid = ? LIMIT 1"
    ))
    .bind(draft_uuid)
    .fetch_optional(pool)
    .await?;
    row.map(voting_from_row).transpose()
}

/// Votings for a member synced at or after a timestamp, newest voting first.
/// Used to resolve predictions against votes that arrived later.
pub async fn votings_with_member_synced_after(
    pool: &SqlitePool,
    member_uuid: &str,
    synced_after: &str,
    limit: i64,
) -> Result<Vec<Voting>> {
    let rows = sqlx::query(&format!(
        "SELECT {VOTING_COLUMNS} FROM votings v
         WHERE v.synced_at >= ?
           AND EXISTS (
               SELECT 1 FROM json_each(v.voters) je
               WHERE json_extract(je.value, '$.member_uuid') = ?
           )
         ORDER BY voting_time DESC LIMIT ?"
    ))
    .bind(synced_after)
    .bind(member_uuid)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(voting_from_row).collect()
}

/// Rows without an embedding yet, for the backfill pass.
pub async fn votings_missing_embedding(pool: &SqlitePool, limit: i64) -> Result<Vec<Voting>> {
    let rows = sqlx::query(&format!(
        "SELECT {VOTING_COLUMNS} FROM votings WHERE embedding IS NULL
         ORDER BY voting_time DESC LIMIT ?"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(voting_from_row).collect()
}

/// Point a voting at the draft it decided. Resolution matches predictions
/// by this link before falling back to bill-hash comparison.
pub async fn link_voting_to_draft(
    pool: &SqlitePool,
    voting_uuid: &str,
    draft_uuid: &str,
) -> Result<()> {
    sqlx::query("UPDATE votings SET related_draft_uuid = ? WHERE uuid = ?")
        .bind(draft_uuid)
        .bind(voting_uuid)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_voting_embedding(
    pool: &SqlitePool,
    uuid: &str,
    embedding: &[f32],
) -> Result<()> {
    let json = serde_json::to_string(embedding)?;
    sqlx::query("UPDATE votings SET embedding = ? WHERE uuid = ?")
        .bind(&json)
        .bind(uuid)
        .execute(pool)
        .await?;
    Ok(())
}

fn voting_from_row(row: sqlx::sqlite::SqliteRow) -> Result<Voting> {
    let voters: Vec<Voter> = serde_json::from_str(row.get("voters"))?;
    let embedding: Option<Vec<f32>> = row
        .get::<Option<String>, _>("embedding")
        .as_deref()
        .map(serde_json::from_str)
        .transpose()?;
    Ok(Voting {
        uuid: row.get("uuid"),
        title: row.get("title"),
        description: row.get("description"),
        voting_time: row.get("voting_time"),
        session_date: row.get("session_date"),
        result: row.get("result"),
        in_favor: row.get("in_favor"),
        against: row.get("against"),
        abstained: row.get("abstained"),
        absent: row.get("absent"),
        voters,
        related_draft_uuid: row.get("related_draft_uuid"),
        embedding,
    })
}

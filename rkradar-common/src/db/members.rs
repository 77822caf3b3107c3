//! Member and MP profile queries

use chrono::Utc;
use sqlx::{Row, SqlitePool};

use crate::db::models::{Committee, Member, MpProfile, MpStats};
use crate::Result;

/// Upsert a raw member record keyed by its upstream uuid.
pub async fn upsert_member(pool: &SqlitePool, member: &Member) -> Result<()> {
    let committees = serde_json::to_string(&member.committees)?;
    let convocations = serde_json::to_string(&member.convocations)?;

    sqlx::query(
        r#"
        INSERT INTO members (
            uuid, first_name, last_name, full_name, active, faction_name,
            party_code, photo_url, committees, convocations, synced_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(uuid) DO UPDATE SET
            first_name = excluded.first_name,
            last_name = excluded.last_name,
            full_name = excluded.full_name,
            active = excluded.active,
            faction_name = excluded.faction_name,
            party_code = excluded.party_code,
            photo_url = excluded.photo_url,
            committees = excluded.committees,
            convocations = excluded.convocations,
            synced_at = excluded.synced_at
        "#,
    )
    .bind(&member.uuid)
    .bind(&member.first_name)
    .bind(&member.last_name)
    .bind(&member.full_name)
    .bind(member.active)
    .bind(&member.faction_name)
    .bind(&member.party_code)
    .bind(&member.photo_url)
    .bind(&committees)
    .bind(&convocations)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_member(pool: &SqlitePool, uuid: &str) -> Result<Option<Member>> {
    let row = sqlx::query(
        "SELECT uuid, first_name, last_name, full_name, active, faction_name,
                party_code, photo_url, committees, convocations
         FROM members WHERE uuid = ?",
    )
    .bind(uuid)
    .fetch_optional(pool)
    .await?;

    row.map(member_from_row).transpose()
}

fn member_from_row(row: sqlx::sqlite::SqliteRow) -> Result<Member> {
    let committees: Vec<Committee> = serde_json::from_str(row.get("committees"))?;
    let convocations: Vec<i64> = serde_json::from_str(row.get("convocations"))?;
    Ok(Member {
        uuid: row.get("uuid"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        full_name: row.get("full_name"),
        active: row.get::<i64, _>("active") != 0,
        faction_name: row.get("faction_name"),
        party_code: row.get("party_code"),
        photo_url: row.get("photo_url"),
        committees,
        convocations,
    })
}

/// Upsert the enriched profile fields, leaving `stats` untouched on
/// conflict — stats are owned by the aggregation pass.
pub async fn upsert_mp_profile(pool: &SqlitePool, mp: &MpProfile) -> Result<()> {
    let committees = serde_json::to_string(&mp.committees)?;
    let convocations = serde_json::to_string(&mp.convocations)?;
    let stats = serde_json::to_string(&mp.stats)?;

    sqlx::query(
        r#"
        INSERT INTO mps (
            slug, member_uuid, name, first_name, last_name, party, party_code,
            photo_url, status, is_current_member, committees, convocations, stats
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(slug) DO UPDATE SET
            member_uuid = excluded.member_uuid,
            name = excluded.name,
            first_name = excluded.first_name,
            last_name = excluded.last_name,
            party = excluded.party,
            party_code = excluded.party_code,
            photo_url = excluded.photo_url,
            status = excluded.status,
            is_current_member = excluded.is_current_member,
            committees = excluded.committees,
            convocations = excluded.convocations
        "#,
    )
    .bind(&mp.slug)
    .bind(&mp.member_uuid)
    .bind(&mp.name)
    .bind(&mp.first_name)
    .bind(&mp.last_name)
    .bind(&mp.party)
    .bind(&mp.party_code)
    .bind(&mp.photo_url)
    .bind(&mp.status)
    .bind(mp.is_current_member)
    .bind(&committees)
    .bind(&convocations)
    .bind(&stats)
    .execute(pool)
    .await?;

    Ok(())
}

/// Replace an MP's denormalized stats block wholesale.
pub async fn update_mp_stats(pool: &SqlitePool, slug: &str, stats: &MpStats) -> Result<()> {
    let stats_json = serde_json::to_string(stats)?;
    sqlx::query("UPDATE mps SET stats = ? WHERE slug = ?")
        .bind(&stats_json)
        .bind(slug)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn get_mp_by_slug(pool: &SqlitePool, slug: &str) -> Result<Option<MpProfile>> {
    let row = sqlx::query("SELECT * FROM mps WHERE slug = ?")
        .bind(slug)
        .fetch_optional(pool)
        .await?;
    row.map(mp_from_row).transpose()
}

pub async fn get_mp_by_uuid(pool: &SqlitePool, member_uuid: &str) -> Result<Option<MpProfile>> {
    let row = sqlx::query("SELECT * FROM mps WHERE member_uuid = ?")
        .bind(member_uuid)
        .fetch_optional(pool)
        .await?;
    row.map(mp_from_row).transpose()
}

pub async fn list_mps(pool: &SqlitePool) -> Result<Vec<MpProfile>> {
    let rows = sqlx::query("SELECT * FROM mps ORDER BY slug")
        .fetch_all(pool)
        .await?;
    rows.into_iter().map(mp_from_row).collect()
}

fn mp_from_row(row: sqlx::sqlite::SqliteRow) -> Result<MpProfile> {
    let committees: Vec<Committee> = serde_json::from_str(row.get("committees"))?;
    let convocations: Vec<i64> = serde_json::from_str(row.get("convocations"))?;
    let stats: MpStats = serde_json::from_str(row.get("stats")).unwrap_or_default();
    Ok(MpProfile {
        slug: row.get("slug"),
        member_uuid: row.get("member_uuid"),
        name: row.get("name"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        party: row.get("party"),
        party_code: row.get("party_code"),
        photo_url: row.get("photo_url"),
        status: row.get("status"),
        is_current_member: row.get::<i64, _>("is_current_member") != 0,
        committees,
        convocations,
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_tables;

    fn sample_mp(slug: &str, uuid: &str) -> MpProfile {
        MpProfile {
            slug: slug.to_string(),
            member_uuid: uuid.to_string(),
            name: "Test Saadik".to_string(),
            first_name: "Test".to_string(),
            last_name: "Saadik".to_string(),
            party: "Eesti Reformierakond".to_string(),
            party_code: "RE".to_string(),
            photo_url: None,
            status: "active".to_string(),
            is_current_member: true,
            committees: vec![],
            convocations: vec![15],
            stats: MpStats::default(),
        }
    }

    #[tokio::test]
    async fn mp_upsert_preserves_stats() {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        init_tables(&pool).await.unwrap();

        let mp = sample_mp("test-saadik", "u-1");
        upsert_mp_profile(&pool, &mp).await.unwrap();

        let stats = MpStats {
            total_votes: 100,
            attendance: 92.5,
            votes_for: 60,
            votes_against: 25,
            votes_abstain: 5,
            party_alignment_rate: 91.0,
        };
        update_mp_stats(&pool, "test-saadik", &stats).await.unwrap();

        // Profile re-sync must not clobber the stats block
        upsert_mp_profile(&pool, &mp).await.unwrap();

        let loaded = get_mp_by_slug(&pool, "test-saadik").await.unwrap().unwrap();
        assert_eq!(loaded.stats.total_votes, 100);
        assert!((loaded.stats.party_alignment_rate - 91.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn member_round_trip() {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        init_tables(&pool).await.unwrap();

        let member = Member {
            uuid: "m-1".to_string(),
            first_name: "Jüri".to_string(),
            last_name: "Ratas".to_string(),
            full_name: "Jüri Ratas".to_string(),
            active: true,
            faction_name: Some("Isamaa fraktsioon".to_string()),
            party_code: "I".to_string(),
            photo_url: None,
            committees: vec![Committee {
                name: "Kultuurikomisjon".to_string(),
                role: Some("liige".to_string()),
                active: true,
            }],
            convocations: vec![14, 15],
        };
        upsert_member(&pool, &member).await.unwrap();
        upsert_member(&pool, &member).await.unwrap(); // idempotent

        let loaded = get_member(&pool, "m-1").await.unwrap().unwrap();
        assert_eq!(loaded.committees.len(), 1);
        assert_eq!(loaded.convocations, vec![14, 15]);
    }
}

//! Resolve logged predictions against votes that have since happened.
//!
//! Matching is two-stage: a voting explicitly linked to the predicted
//! draft wins, otherwise the bill hash of each voting synced after the
//! prediction is compared against the logged hash. Unmatched predictions
//! stay open for the next run.

use sqlx::SqlitePool;
use tracing::info;

use rkradar_common::db::models::{PredictionRecord, Voting};
use rkradar_common::db::{predictions, votings};
use rkradar_common::domain::{bill_hash, VoteDecision};
use rkradar_common::Result;

const HASH_MATCH_LIMIT: i64 = 50;

#[derive(Debug, Default)]
pub struct ResolveOutcome {
    pub checked: u64,
    pub resolved: u64,
    pub correct: u64,
}

pub async fn resolve_predictions(pool: &SqlitePool) -> Result<ResolveOutcome> {
    let open = predictions::unresolved_predictions(pool).await?;
    let mut outcome = ResolveOutcome {
        checked: open.len() as u64,
        ..ResolveOutcome::default()
    };

    for record in &open {
        let Some(actual) = find_actual_decision(pool, record).await? else {
            continue;
        };
        let correct = actual == record.predicted;
        predictions::mark_resolved(pool, &record.id, actual, correct).await?;
        outcome.resolved += 1;
        if correct {
            outcome.correct += 1;
        }
    }

    info!(
        checked = outcome.checked,
        resolved = outcome.resolved,
        correct = outcome.correct,
        "prediction resolution complete"
    );
    Ok(outcome)
}

async fn find_actual_decision(
    pool: &SqlitePool,
    record: &PredictionRecord,
) -> Result<Option<VoteDecision>> {
    let Some(member_uuid) = record.mp_uuid.as_deref() else {
        return Ok(None);
    };

    if let Some(draft_uuid) = record.draft_uuid.as_deref() {
        if let Some(voting) = votings::find_voting_by_draft(pool, draft_uuid).await? {
            return Ok(voting.decision_of(member_uuid));
        }
    }

    let predicted_at = record.predicted_at.to_rfc3339();
    let candidates =
        votings::votings_with_member_synced_after(pool, member_uuid, &predicted_at, HASH_MATCH_LIMIT)
            .await?;
    for voting in &candidates {
        if voting_hash(voting) == record.bill_hash {
            return Ok(voting.decision_of(member_uuid));
        }
    }
    Ok(None)
}

fn voting_hash(voting: &Voting) -> String {
    bill_hash(&voting.title, voting.description.as_deref(), None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rkradar_common::db::models::FeatureValue;
    use rkradar_common::db::init_tables;
    use uuid::Uuid;

    use crate::prediction::test_support::{voter, voting};

    fn record(id: &str, mp_uuid: &str, title: &str, draft_uuid: Option<&str>) -> PredictionRecord {
        PredictionRecord {
            id: id.to_string(),
            mp_slug: "test-mp".to_string(),
            mp_uuid: Some(mp_uuid.to_string()),
            draft_uuid: draft_uuid.map(str::to_string),
            bill_title: title.to_string(),
            bill_hash: bill_hash(title, None, None),
            predicted: VoteDecision::For,
            confidence: 0.9,
            features_used: vec![FeatureValue {
                name: "party_loyalty_rate".to_string(),
                value: 0.9,
            }],
            model_version: "logistic-v1".to_string(),
            predicted_at: "2024-01-01T00:00:00Z".parse().unwrap(),
            actual: None,
            correct: None,
            resolved_at: None,
        }
    }

    async fn pool() -> SqlitePool {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        init_tables(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn resolves_by_linked_draft() {
        let pool = pool().await;
        let mut v = voting("v1", "2024-02-01T12:00:00Z", vec![voter(
            "mp-1",
            "Isamaa fraktsioon",
            VoteDecision::For,
        )]);
        v.related_draft_uuid = Some("d1".to_string());
        votings::upsert_voting(&pool, &v).await.unwrap();

        let rec = record(&Uuid::new_v4().to_string(), "mp-1", "Eelnõu", Some("d1"));
        predictions::insert_prediction(&pool, &rec).await.unwrap();

        let outcome = resolve_predictions(&pool).await.unwrap();
        assert_eq!(outcome.resolved, 1);
        assert_eq!(outcome.correct, 1);
        assert!(predictions::unresolved_predictions(&pool)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn resolves_by_bill_hash() {
        let pool = pool().await;
        let title = "Tulumaksuseaduse muutmise seadus";
        let v = voting("v2", "2024-02-01T12:00:00Z", vec![voter(
            "mp-1",
            "Isamaa fraktsioon",
            VoteDecision::Against,
        )]);
        let v = Voting {
            title: title.to_string(),
            ..v
        };
        votings::upsert_voting(&pool, &v).await.unwrap();

        let rec = record(&Uuid::new_v4().to_string(), "mp-1", title, None);
        predictions::insert_prediction(&pool, &rec).await.unwrap();

        let outcome = resolve_predictions(&pool).await.unwrap();
        assert_eq!(outcome.resolved, 1);
        // Predicted FOR, actual AGAINST
        assert_eq!(outcome.correct, 0);
    }

    #[tokio::test]
    async fn unmatched_predictions_stay_open() {
        let pool = pool().await;
        let rec = record(&Uuid::new_v4().to_string(), "mp-1", "Sellist eelnõu pole", None);
        predictions::insert_prediction(&pool, &rec).await.unwrap();

        let outcome = resolve_predictions(&pool).await.unwrap();
        assert_eq!(outcome.resolved, 0);
        assert_eq!(
            predictions::unresolved_predictions(&pool).await.unwrap().len(),
            1
        );
    }
}

//! Feature engineering for (MP, bill) pairs.
//!
//! Two builders share the same feature vocabulary and ordering:
//! [`compute_features`] runs at prediction time against the live database,
//! while [`training_feature_map`] turns values the training-set builder has
//! already precomputed (running loyalty counters, per-voting cohesion) into
//! the same fixed-order map. Features the training builder has no context
//! for take neutral defaults.

use std::collections::BTreeMap;

use sqlx::SqlitePool;

use rkradar_common::db::models::{FeatureValue, MpProfile, Voting};
use rkradar_common::db::votings;
use rkradar_common::domain::party_names;
use rkradar_common::Result;

use super::coalition::{detect_coalition, COALITION_WINDOW};
use super::{cosine_similarity, mean_embedding, member_and_party_decision, party_cohesion};

/// Model input ordering. Every feature vector follows this order exactly.
pub const FEATURE_NAMES: [&str; 9] = [
    "party_loyalty_rate",
    "bill_topic_similarity",
    "committee_relevance",
    "coalition_bill",
    "defection_rate_by_topic",
    "party_cohesion_on_similar",
    "days_since_last_defection",
    "mp_attendance_rate",
    "party_position_strength",
];

/// Cosine threshold above which a past voting counts as "similar".
const SIMILARITY_THRESHOLD: f64 = 0.5;
/// How many recent embedded votings feed the mean-embedding profile.
const EMBEDDING_HISTORY: i64 = 50;
/// How many recent votings similarity-based features scan.
const SIMILAR_WINDOW: i64 = 100;

/// Fallbacks for members with no recorded history.
const DEFAULT_LOYALTY: f64 = 0.85;
const DEFAULT_ATTENDANCE: f64 = 0.8;
/// Neutral midpoint for the defection-recency feature in training rows,
/// where scanning each member's history per row would be prohibitive.
const DEFAULT_DAYS_SINCE_DEFECTION: f64 = 0.5;

pub type FeatureMap = BTreeMap<&'static str, f64>;

/// Flatten a feature map into the fixed [`FEATURE_NAMES`] order.
pub fn feature_vector(features: &FeatureMap) -> Vec<f64> {
    FEATURE_NAMES
        .iter()
        .map(|name| features.get(name).copied().unwrap_or(0.0))
        .collect()
}

/// Named feature values for API responses and the prediction log.
pub fn feature_values(features: &FeatureMap) -> Vec<FeatureValue> {
    FEATURE_NAMES
        .iter()
        .map(|name| FeatureValue {
            name: (*name).to_string(),
            value: features.get(name).copied().unwrap_or(0.0),
        })
        .collect()
}

/// Compute the full feature map for an (MP, bill) prediction.
pub async fn compute_features(
    pool: &SqlitePool,
    mp: &MpProfile,
    bill_embedding: Option<&[f32]>,
    bill_initiators: &[String],
) -> Result<FeatureMap> {
    let mut features = FeatureMap::new();
    let member_uuid = mp.member_uuid.as_str();
    let party_code = mp.party_code.as_str();
    let has_history = mp.stats.total_votes > 0;

    features.insert(
        "party_loyalty_rate",
        if has_history {
            mp.stats.party_alignment_rate / 100.0
        } else {
            DEFAULT_LOYALTY
        },
    );

    features.insert(
        "bill_topic_similarity",
        match bill_embedding {
            Some(embedding) => bill_topic_similarity(pool, member_uuid, embedding, None).await?,
            None => 0.0,
        },
    );

    features.insert("committee_relevance", committee_relevance(mp, bill_initiators));

    let recent = votings::recent_votings(pool, COALITION_WINDOW).await?;
    features.insert(
        "coalition_bill",
        coalition_bill(&recent, party_code, bill_initiators),
    );

    features.insert(
        "defection_rate_by_topic",
        match bill_embedding {
            Some(embedding) => {
                defection_rate_by_topic(pool, member_uuid, party_code, embedding).await?
            }
            None => 0.0,
        },
    );

    features.insert(
        "party_cohesion_on_similar",
        match bill_embedding {
            Some(embedding) => party_cohesion_on_similar(pool, party_code, embedding).await?,
            None => 1.0,
        },
    );

    features.insert(
        "days_since_last_defection",
        days_since_last_defection(pool, member_uuid, party_code).await?,
    );

    features.insert(
        "mp_attendance_rate",
        if has_history {
            mp.stats.attendance / 100.0
        } else {
            DEFAULT_ATTENDANCE
        },
    );

    features.insert(
        "party_position_strength",
        party_position_strength(&recent[..recent.len().min(50)], party_code),
    );

    Ok(features)
}

/// Values the training-set builder precomputes for one (member, voting) row.
#[derive(Debug, Clone, Copy)]
pub struct TrainingRow {
    /// Running alignment rate over the member's votes before this voting, 0..1
    pub loyalty_rate: f64,
    /// Cosine of this voting against the member's earlier embedded votes
    pub topic_similarity: f64,
    /// The member's party cohesion on this voting
    pub party_cohesion: f64,
    /// Attendance rate from the MP's aggregated stats, 0..1
    pub attendance_rate: f64,
    /// Whether the member's party sits in the detected coalition
    pub in_coalition: bool,
}

impl Default for TrainingRow {
    fn default() -> Self {
        Self {
            loyalty_rate: DEFAULT_LOYALTY,
            topic_similarity: 0.0,
            party_cohesion: 1.0,
            attendance_rate: DEFAULT_ATTENDANCE,
            in_coalition: false,
        }
    }
}

/// Feature map for a historical training row. Matches [`compute_features`]
/// on everything both builders can compute; initiator- and clock-dependent
/// features take neutral defaults.
pub fn training_feature_map(row: &TrainingRow) -> FeatureMap {
    let mut features = FeatureMap::new();
    features.insert("party_loyalty_rate", row.loyalty_rate);
    features.insert("bill_topic_similarity", row.topic_similarity);
    features.insert("committee_relevance", 0.0);
    features.insert("coalition_bill", if row.in_coalition { 1.0 } else { 0.0 });
    features.insert("defection_rate_by_topic", 0.0);
    features.insert("party_cohesion_on_similar", row.party_cohesion);
    features.insert("days_since_last_defection", DEFAULT_DAYS_SINCE_DEFECTION);
    features.insert("mp_attendance_rate", row.attendance_rate);
    features.insert("party_position_strength", row.party_cohesion);
    features
}

/// Cosine similarity between the bill and the mean embedding of the
/// member's recent embedded votings. No embedded history yields 0.0.
pub async fn bill_topic_similarity(
    pool: &SqlitePool,
    member_uuid: &str,
    bill_embedding: &[f32],
    before_date: Option<&str>,
) -> Result<f64> {
    let history =
        votings::embedded_votings_with_member(pool, member_uuid, before_date, EMBEDDING_HISTORY)
            .await?;
    let embeddings: Vec<Vec<f32>> = history.into_iter().filter_map(|v| v.embedding).collect();
    if embeddings.is_empty() {
        return Ok(0.0);
    }
    Ok(cosine_similarity(bill_embedding, &mean_embedding(&embeddings)))
}

/// Lexical overlap between the MP's committee names and the initiator
/// text, on words longer than four characters.
fn committee_relevance(mp: &MpProfile, bill_initiators: &[String]) -> f64 {
    if bill_initiators.is_empty() || mp.committees.is_empty() {
        return 0.0;
    }
    let initiator_text = bill_initiators.join(" ").to_lowercase();
    for committee in &mp.committees {
        let name = committee.name.to_lowercase();
        if name
            .split_whitespace()
            .filter(|word| word.chars().count() > 4)
            .any(|word| initiator_text.contains(word))
        {
            return 1.0;
        }
    }
    0.0
}

/// Whether a coalition-aligned party initiated the bill: 1.0 when a
/// coalition party name appears among the initiators and the MP's party is
/// in the coalition, 0.0 when it is not, 0.5 when no coalition party is
/// named at all.
fn coalition_bill(recent_votings: &[Voting], mp_party: &str, bill_initiators: &[String]) -> f64 {
    if bill_initiators.is_empty() {
        return 0.0;
    }
    let coalition = detect_coalition(recent_votings);
    let mp_in_coalition = coalition.contains(mp_party);
    let initiator_text = bill_initiators.join(" ").to_lowercase();

    for code in &coalition {
        if let Some((full, short)) = party_names(code) {
            if initiator_text.contains(&full.to_lowercase())
                || initiator_text.contains(&short.to_lowercase())
            {
                return if mp_in_coalition { 1.0 } else { 0.0 };
            }
        }
    }
    0.5
}

/// The member's defection rate on past votings similar to the bill.
async fn defection_rate_by_topic(
    pool: &SqlitePool,
    member_uuid: &str,
    party_code: &str,
    bill_embedding: &[f32],
) -> Result<f64> {
    let history =
        votings::embedded_votings_with_member(pool, member_uuid, None, SIMILAR_WINDOW).await?;

    let mut defections = 0usize;
    let mut total = 0usize;
    for voting in &history {
        let Some(embedding) = voting.embedding.as_deref() else {
            continue;
        };
        if cosine_similarity(bill_embedding, embedding) <= SIMILARITY_THRESHOLD {
            continue;
        }
        let (member, majority) = member_and_party_decision(voting, member_uuid, party_code);
        if let (Some(member), Some(majority)) = (member, majority) {
            total += 1;
            if member != majority {
                defections += 1;
            }
        }
    }
    Ok(if total > 0 {
        defections as f64 / total as f64
    } else {
        0.0
    })
}

/// Mean cohesion of the party on past votings similar to the bill.
/// No similar votings means no evidence of division, so 1.0.
async fn party_cohesion_on_similar(
    pool: &SqlitePool,
    party_code: &str,
    bill_embedding: &[f32],
) -> Result<f64> {
    let history = votings::recent_embedded_votings(pool, SIMILAR_WINDOW).await?;
    let cohesions: Vec<f64> = history
        .iter()
        .filter(|v| {
            v.embedding
                .as_deref()
                .map(|e| cosine_similarity(bill_embedding, e) > SIMILARITY_THRESHOLD)
                .unwrap_or(false)
        })
        .map(|v| party_cohesion(v, party_code))
        .collect();
    if cohesions.is_empty() {
        return Ok(1.0);
    }
    Ok(cohesions.iter().sum::<f64>() / cohesions.len() as f64)
}

/// Days since the member last voted against their party majority, scanned
/// newest-first over the recent window, normalized to 0..1 (365+ days or
/// no defection at all reads as 1.0).
async fn days_since_last_defection(
    pool: &SqlitePool,
    member_uuid: &str,
    party_code: &str,
) -> Result<f64> {
    let history = votings::votings_with_member(pool, member_uuid, SIMILAR_WINDOW).await?;

    let mut days: f64 = 365.0;
    for voting in &history {
        let (member, majority) = member_and_party_decision(voting, member_uuid, party_code);
        let (Some(member), Some(majority)) = (member, majority) else {
            continue;
        };
        if member == majority {
            continue;
        }
        if let Some(time) = voting.voting_time.as_deref() {
            if let Ok(vote_time) = chrono::DateTime::parse_from_rfc3339(time) {
                let elapsed = chrono::Utc::now().signed_duration_since(vote_time).num_days();
                days = days.min(elapsed.max(0) as f64);
            }
        }
        break;
    }
    Ok((days / 365.0).min(1.0))
}

/// Mean cohesion of the party across the given recent votings.
fn party_position_strength(recent_votings: &[Voting], party_code: &str) -> f64 {
    if recent_votings.is_empty() {
        return DEFAULT_LOYALTY;
    }
    let sum: f64 = recent_votings
        .iter()
        .map(|v| party_cohesion(v, party_code))
        .sum();
    sum / recent_votings.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prediction::test_support::{voter, voting};
    use rkradar_common::db::models::{Committee, MpStats};
    use rkradar_common::domain::VoteDecision::{Against, For};

    fn mp_with_committees(names: &[&str]) -> MpProfile {
        MpProfile {
            slug: "test-mp".into(),
            member_uuid: "u1".into(),
            name: "Test Mp".into(),
            first_name: "Test".into(),
            last_name: "Mp".into(),
            party: "Eesti Reformierakond".into(),
            party_code: "RE".into(),
            photo_url: None,
            status: "active".into(),
            is_current_member: true,
            committees: names
                .iter()
                .map(|n| Committee {
                    name: (*n).to_string(),
                    role: None,
                    active: true,
                })
                .collect(),
            convocations: vec![15],
            stats: MpStats::default(),
        }
    }

    #[test]
    fn feature_vector_follows_fixed_order() {
        let map = training_feature_map(&TrainingRow::default());
        let vec = feature_vector(&map);
        assert_eq!(vec.len(), FEATURE_NAMES.len());
        assert_eq!(vec[0], DEFAULT_LOYALTY);
        assert_eq!(vec[7], DEFAULT_ATTENDANCE);
        // party_position_strength mirrors cohesion
        assert_eq!(vec[8], 1.0);
    }

    #[test]
    fn feature_values_name_every_feature() {
        let map = training_feature_map(&TrainingRow::default());
        let values = feature_values(&map);
        let names: Vec<&str> = values.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, FEATURE_NAMES.to_vec());
    }

    #[test]
    fn committee_relevance_matches_long_words_only() {
        let mp = mp_with_committees(&["Rahanduskomisjon"]);
        // Long word from the committee name appears in the initiator text
        assert_eq!(
            committee_relevance(&mp, &["rahanduskomisjon".to_string()]),
            1.0
        );
        assert_eq!(committee_relevance(&mp, &["muu algataja".to_string()]), 0.0);
        assert_eq!(committee_relevance(&mp, &[]), 0.0);
    }

    #[test]
    fn coalition_bill_unknown_initiator_reads_half() {
        // Two parties agreeing across enough votings form a coalition
        let re = "Eesti Reformierakonna fraktsioon";
        let e200 = "Eesti 200 fraktsioon";
        let votings: Vec<_> = (0..12)
            .map(|i| {
                voting(
                    &format!("v{i}"),
                    "2024-03-01T12:00:00Z",
                    vec![voter("a", re, For), voter("b", e200, For)],
                )
            })
            .collect();

        // No coalition party named among initiators
        assert_eq!(
            coalition_bill(&votings, "RE", &["Keegi Teine".to_string()]),
            0.5
        );
        // Coalition party named, MP inside the coalition
        assert_eq!(
            coalition_bill(&votings, "RE", &["Eesti Reformierakond".to_string()]),
            1.0
        );
        // Coalition party named, MP outside it
        assert_eq!(
            coalition_bill(&votings, "EKRE", &["Eesti Reformierakond".to_string()]),
            0.0
        );
        assert_eq!(coalition_bill(&votings, "RE", &[]), 0.0);
    }

    #[test]
    fn position_strength_averages_cohesion() {
        let re = "Eesti Reformierakonna fraktsioon";
        let unanimous = voting(
            "v1",
            "2024-03-01T12:00:00Z",
            vec![voter("a", re, For), voter("b", re, For)],
        );
        let split = voting(
            "v2",
            "2024-03-02T12:00:00Z",
            vec![voter("a", re, For), voter("b", re, Against)],
        );
        let strength = party_position_strength(&[unanimous, split], "RE");
        assert!((strength - 0.75).abs() < 1e-9);
        assert_eq!(party_position_strength(&[], "RE"), DEFAULT_LOYALTY);
    }
}

//! Party-line baseline predictor.
//!
//! The floor every trained model must beat: predict the party's most
//! common recent decision at a confidence taken from the member's own
//! alignment rate. Non-affiliated members get an alignment-party variant
//! that first finds the party whose majorities best track their record.

use sqlx::SqlitePool;

use rkradar_common::db::models::{FeatureValue, MpProfile, PredictionOutput, Voting};
use rkradar_common::db::votings;
use rkradar_common::domain::{VoteDecision, NON_AFFILIATED, VALID_PARTY_CODES};
use rkradar_common::Result;

use super::{majority_decision, party_decisions, party_majority};

pub const BASELINE_VERSION: &str = "baseline-v1";

/// How many recent votings the party pattern is read from.
const BASELINE_WINDOW: i64 = 200;
/// Minimum overlapping votings before an alignment party is trusted.
const MIN_ALIGNMENT_OVERLAP: usize = 10;
const DEFAULT_ALIGNMENT_RATE: f64 = 85.0;

/// Predict the party majority over recent votings. Members without any
/// party voting data fall back to FOR at 0.5 confidence.
pub async fn predict_party_line(pool: &SqlitePool, mp: &MpProfile) -> Result<PredictionOutput> {
    let recent = votings::recent_votings(pool, BASELINE_WINDOW).await?;

    let party_code = if mp.party_code == NON_AFFILIATED {
        alignment_party(&recent, &mp.member_uuid)
            .unwrap_or_else(|| NON_AFFILIATED.to_string())
    } else {
        mp.party_code.clone()
    };

    let alignment_rate = if mp.stats.total_votes > 0 {
        mp.stats.party_alignment_rate
    } else {
        DEFAULT_ALIGNMENT_RATE
    };

    let mut party_votes: Vec<VoteDecision> = Vec::new();
    for voting in &recent {
        party_votes.extend(party_decisions(voting, &party_code));
    }

    let Some(majority) = majority_decision(&party_votes) else {
        return Ok(PredictionOutput {
            prediction: VoteDecision::For,
            confidence: 0.5,
            model_version: BASELINE_VERSION.to_string(),
            features: vec![
                FeatureValue {
                    name: "party_loyalty_rate".to_string(),
                    value: alignment_rate,
                },
                FeatureValue {
                    name: "data_available".to_string(),
                    value: 0.0,
                },
            ],
            cached: false,
        });
    };

    let confidence = (alignment_rate / 100.0).min(0.99);
    Ok(PredictionOutput {
        prediction: majority,
        confidence,
        model_version: BASELINE_VERSION.to_string(),
        features: vec![
            FeatureValue {
                name: "party_loyalty_rate".to_string(),
                value: alignment_rate,
            },
            FeatureValue {
                name: "sample_size".to_string(),
                value: party_votes.len() as f64,
            },
        ],
        cached: false,
    })
}

/// The party whose majorities best match the member's own recent votes.
/// Requires at least [`MIN_ALIGNMENT_OVERLAP`] votings where both the
/// member and the party took a non-absent position.
pub fn alignment_party(recent: &[Voting], member_uuid: &str) -> Option<String> {
    let mut best: Option<(String, f64)> = None;
    for code in VALID_PARTY_CODES {
        if code == NON_AFFILIATED {
            continue;
        }
        let mut agree = 0usize;
        let mut overlap = 0usize;
        for voting in recent {
            let Some(member) = voting.decision_of(member_uuid) else {
                continue;
            };
            if member == VoteDecision::Absent {
                continue;
            }
            let Some(majority) = party_majority(voting, code) else {
                continue;
            };
            overlap += 1;
            if member == majority {
                agree += 1;
            }
        }
        if overlap < MIN_ALIGNMENT_OVERLAP {
            continue;
        }
        let rate = agree as f64 / overlap as f64;
        if best.as_ref().map(|(_, r)| rate > *r).unwrap_or(true) {
            best = Some((code.to_string(), rate));
        }
    }
    best.map(|(code, _)| code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prediction::test_support::{voter, voting};
    use rkradar_common::domain::VoteDecision::{Against, For};

    const RE: &str = "Eesti Reformierakonna fraktsioon";
    const EKRE: &str = "Eesti Konservatiivse Rahvaerakonna fraktsioon";

    #[test]
    fn alignment_party_tracks_agreement() {
        // Independent "x" votes with EKRE on every voting, against RE
        let votings: Vec<_> = (0..12)
            .map(|i| {
                voting(
                    &format!("v{i}"),
                    "2024-03-01T12:00:00Z",
                    vec![
                        voter("x", "fraktsiooni mittekuuluvad", Against),
                        voter("a", EKRE, Against),
                        voter("b", RE, For),
                    ],
                )
            })
            .collect();
        assert_eq!(alignment_party(&votings, "x"), Some("EKRE".to_string()));
    }

    #[test]
    fn alignment_party_needs_enough_overlap() {
        let votings: Vec<_> = (0..5)
            .map(|i| {
                voting(
                    &format!("v{i}"),
                    "2024-03-01T12:00:00Z",
                    vec![
                        voter("x", "fraktsiooni mittekuuluvad", Against),
                        voter("a", EKRE, Against),
                    ],
                )
            })
            .collect();
        assert_eq!(alignment_party(&votings, "x"), None);
    }

    #[test]
    fn alignment_party_ignores_member_absences() {
        use rkradar_common::domain::VoteDecision::Absent;
        let votings: Vec<_> = (0..20)
            .map(|i| {
                voting(
                    &format!("v{i}"),
                    "2024-03-01T12:00:00Z",
                    vec![
                        voter("x", "fraktsiooni mittekuuluvad", Absent),
                        voter("a", EKRE, Against),
                    ],
                )
            })
            .collect();
        assert_eq!(alignment_party(&votings, "x"), None);
    }
}

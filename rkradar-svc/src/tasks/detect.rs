//! Anomaly detection over stored votings.
//!
//! Two passes: party-pair agreement compared between the last 100 votings
//! and the 100 before them (coalition realignment), and recent votings
//! where a single party showed unusually low cohesion (split events).
//! Findings land in model state for the planner and the status endpoints.

use std::collections::BTreeMap;

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::info;

use rkradar_common::db::models::{Detection, Voting};
use rkradar_common::db::{model_state, votings};
use rkradar_common::domain::VoteDecision;
use rkradar_common::Result;

use crate::prediction::{majority_decision, party_decisions_by_party};

const WINDOW: usize = 100;
const SHIFT_THRESHOLD: f64 = 0.15;
const SHIFT_SEVERE: f64 = 0.25;
const MIN_SHARED_VOTINGS: usize = 10;
const SPLIT_SCAN: usize = 50;
const SPLIT_COHESION: f64 = 0.70;
const SPLIT_SEVERE: f64 = 0.50;
const MIN_SPLIT_VOTERS: usize = 3;
const MAX_SPLIT_FINDINGS: usize = 20;

pub async fn detect_anomalies(pool: &SqlitePool) -> Result<Vec<Detection>> {
    let history = votings::recent_votings(pool, (WINDOW * 2) as i64).await?;

    let mut detections = Vec::new();
    if history.len() >= WINDOW {
        let (recent, older) = history.split_at(WINDOW.min(history.len()));
        detections.extend(coalition_shifts(recent, older));
    }
    detections.extend(party_splits(&history[..history.len().min(SPLIT_SCAN)]));

    let total = detections.len();
    let snapshot = detections.clone();
    model_state::update_model_state(pool, move |state| {
        state.detections = Some(snapshot);
        state.last_detection_at = Some(Utc::now());
    })
    .await?;

    info!(total, "anomaly detection complete");
    Ok(detections)
}

/// Pairwise agreement rate between party majorities, keyed on the voting
/// uuid so both parties are compared on the same votes.
fn party_agreement(votings: &[Voting]) -> BTreeMap<(String, String), (usize, usize)> {
    let mut majorities: BTreeMap<String, BTreeMap<&str, VoteDecision>> = BTreeMap::new();
    for voting in votings {
        for (party, decisions) in party_decisions_by_party(voting) {
            if let Some(majority) = majority_decision(&decisions) {
                majorities
                    .entry(party)
                    .or_default()
                    .insert(voting.uuid.as_str(), majority);
            }
        }
    }

    let parties: Vec<&String> = majorities.keys().collect();
    let mut pairs = BTreeMap::new();
    for (i, a) in parties.iter().enumerate() {
        for b in &parties[i + 1..] {
            let votes_a = &majorities[*a];
            let votes_b = &majorities[*b];
            let mut shared = 0usize;
            let mut agreed = 0usize;
            for (uuid, decision) in votes_a {
                if let Some(other) = votes_b.get(uuid) {
                    shared += 1;
                    if decision == other {
                        agreed += 1;
                    }
                }
            }
            if shared >= MIN_SHARED_VOTINGS {
                pairs.insert(((*a).clone(), (*b).clone()), (agreed, shared));
            }
        }
    }
    pairs
}

fn coalition_shifts(recent: &[Voting], older: &[Voting]) -> Vec<Detection> {
    let recent_pairs = party_agreement(recent);
    let older_pairs = party_agreement(older);

    let mut shifts = Vec::new();
    for (pair, (agreed, shared)) in &recent_pairs {
        let recent_rate = *agreed as f64 / *shared as f64;
        let older_rate = older_pairs
            .get(pair)
            .map(|(a, s)| *a as f64 / *s as f64)
            .unwrap_or(0.5);
        let delta = recent_rate - older_rate;
        if delta.abs() < SHIFT_THRESHOLD {
            continue;
        }
        let direction = if delta > 0.0 { "converging" } else { "diverging" };
        shifts.push(Detection {
            kind: "coalition_shift".to_string(),
            severity: if delta.abs() >= SHIFT_SEVERE { "high" } else { "medium" }.to_string(),
            parties: vec![pair.0.clone(), pair.1.clone()],
            description: format!(
                "{} and {} are {direction}: agreement moved {:.0}% to {:.0}%",
                pair.0,
                pair.1,
                older_rate * 100.0,
                recent_rate * 100.0
            ),
            detected_at: Utc::now(),
            recent_correlation: Some(round3(recent_rate)),
            previous_correlation: Some(round3(older_rate)),
            delta: Some(round3(delta)),
        });
    }
    shifts
}

fn party_splits(recent: &[Voting]) -> Vec<Detection> {
    let mut splits = Vec::new();
    for voting in recent {
        for (party, decisions) in party_decisions_by_party(voting) {
            if decisions.len() < MIN_SPLIT_VOTERS {
                continue;
            }
            let Some(majority) = majority_decision(&decisions) else {
                continue;
            };
            let agreeing = decisions.iter().filter(|d| **d == majority).count();
            let cohesion = agreeing as f64 / decisions.len() as f64;
            if cohesion >= SPLIT_COHESION {
                continue;
            }
            let title: String = voting.title.chars().take(60).collect();
            splits.push(Detection {
                kind: "party_split".to_string(),
                severity: if cohesion < SPLIT_SEVERE { "high" } else { "medium" }.to_string(),
                parties: vec![party],
                description: format!(
                    "split on \"{title}\": only {:.0}% cohesion ({} voters)",
                    cohesion * 100.0,
                    decisions.len()
                ),
                detected_at: Utc::now(),
                recent_correlation: Some(round3(cohesion)),
                previous_correlation: None,
                delta: None,
            });
        }
    }
    // Worst splits first
    splits.sort_by(|a, b| {
        a.recent_correlation
            .partial_cmp(&b.recent_correlation)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    splits.truncate(MAX_SPLIT_FINDINGS);
    splits
}

fn round3(x: f64) -> f64 {
    (x * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prediction::test_support::{voter, voting};

    const RE: &str = "Eesti Reformierakonna fraktsioon";
    const SDE: &str = "Sotsiaaldemokraatide fraktsioon";
    const EKRE: &str = "Eesti Konservatiivse Rahvaerakonna fraktsioon";

    fn agreeing_voting(uuid: &str, a_decision: VoteDecision, b_decision: VoteDecision) -> Voting {
        voting(uuid, "2024-06-01T12:00:00Z", vec![
            voter("a1", RE, a_decision),
            voter("a2", RE, a_decision),
            voter("b1", SDE, b_decision),
            voter("b2", SDE, b_decision),
        ])
    }

    #[test]
    fn agreement_counts_shared_votings_only() {
        let votings: Vec<Voting> = (0..12)
            .map(|i| {
                agreeing_voting(
                    &format!("v{i}"),
                    VoteDecision::For,
                    if i < 9 { VoteDecision::For } else { VoteDecision::Against },
                )
            })
            .collect();
        let pairs = party_agreement(&votings);
        let (agreed, shared) = pairs[&("RE".to_string(), "SDE".to_string())];
        assert_eq!(shared, 12);
        assert_eq!(agreed, 9);
    }

    #[test]
    fn pairs_below_overlap_floor_are_dropped() {
        let votings: Vec<Voting> = (0..5)
            .map(|i| agreeing_voting(&format!("v{i}"), VoteDecision::For, VoteDecision::For))
            .collect();
        assert!(party_agreement(&votings).is_empty());
    }

    #[test]
    fn diverging_pair_is_detected() {
        let recent: Vec<Voting> = (0..20)
            .map(|i| agreeing_voting(&format!("r{i}"), VoteDecision::For, VoteDecision::Against))
            .collect();
        let older: Vec<Voting> = (0..20)
            .map(|i| agreeing_voting(&format!("o{i}"), VoteDecision::For, VoteDecision::For))
            .collect();
        let shifts = coalition_shifts(&recent, &older);
        assert_eq!(shifts.len(), 1);
        assert_eq!(shifts[0].kind, "coalition_shift");
        assert_eq!(shifts[0].severity, "high");
        assert_eq!(shifts[0].delta, Some(-1.0));
        assert!(shifts[0].description.contains("diverging"));
    }

    #[test]
    fn low_cohesion_voting_is_a_split() {
        let v = voting("v1", "2024-06-01T12:00:00Z", vec![
            voter("a", EKRE, VoteDecision::For),
            voter("b", EKRE, VoteDecision::Against),
            voter("c", EKRE, VoteDecision::Against),
            voter("d", EKRE, VoteDecision::For),
            voter("e", EKRE, VoteDecision::Abstain),
        ]);
        let splits = party_splits(&[v]);
        assert_eq!(splits.len(), 1);
        assert_eq!(splits[0].parties, vec!["EKRE"]);
        assert_eq!(splits[0].recent_correlation, Some(0.4));
        assert_eq!(splits[0].severity, "high");
    }

    #[test]
    fn cohesive_votings_produce_no_splits() {
        let v = agreeing_voting("v1", VoteDecision::For, VoteDecision::Against);
        assert!(party_splits(&[v]).is_empty());
    }
}

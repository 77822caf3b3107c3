//! Vote prediction: feature engineering, baselines, model training,
//! calibration, and backtesting.

pub mod backtest;
pub mod baseline;
pub mod boosted;
pub mod calibrate;
pub mod coalition;
pub mod features;
pub mod linear;
pub mod model;

use std::collections::BTreeMap;

use rkradar_common::db::models::Voting;
use rkradar_common::domain::{resolve_party, VoteDecision};

/// Cosine similarity between two vectors. Length mismatch or a zero vector
/// yields 0.0 rather than an error.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| (*x as f64) * (*y as f64)).sum();
    let norm_a: f64 = a.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Element-wise mean of a set of vectors. Empty input yields an empty vector.
pub fn mean_embedding(embeddings: &[Vec<f32>]) -> Vec<f32> {
    let Some(first) = embeddings.first() else {
        return Vec::new();
    };
    let mut mean = vec![0.0f32; first.len()];
    let mut count = 0usize;
    for emb in embeddings {
        if emb.len() != mean.len() {
            continue;
        }
        for (m, v) in mean.iter_mut().zip(emb.iter()) {
            *m += v;
        }
        count += 1;
    }
    if count > 0 {
        for m in &mut mean {
            *m /= count as f32;
        }
    }
    mean
}

/// Non-absent decisions cast by a party's members on a voting, with the
/// party resolved from the faction label captured at vote time.
pub fn party_decisions(voting: &Voting, party_code: &str) -> Vec<VoteDecision> {
    voting
        .voters
        .iter()
        .filter(|v| resolve_party(v.faction.as_deref()) == party_code)
        .map(|v| v.decision)
        .filter(|d| *d != VoteDecision::Absent)
        .collect()
}

/// Non-absent decisions on a voting grouped by resolved party code.
pub fn party_decisions_by_party(voting: &Voting) -> BTreeMap<String, Vec<VoteDecision>> {
    let mut map: BTreeMap<String, Vec<VoteDecision>> = BTreeMap::new();
    for v in &voting.voters {
        if v.decision == VoteDecision::Absent {
            continue;
        }
        map.entry(resolve_party(v.faction.as_deref()).to_string())
            .or_default()
            .push(v.decision);
    }
    map
}

/// Most common decision, deterministic on ties (FOR > AGAINST > ABSTAIN).
pub fn majority_decision(decisions: &[VoteDecision]) -> Option<VoteDecision> {
    if decisions.is_empty() {
        return None;
    }
    let mut counts: BTreeMap<VoteDecision, usize> = BTreeMap::new();
    for d in decisions {
        *counts.entry(*d).or_default() += 1;
    }
    let mut best = None;
    let mut best_count = 0usize;
    for d in [VoteDecision::For, VoteDecision::Against, VoteDecision::Abstain] {
        let count = counts.get(&d).copied().unwrap_or(0);
        if count > best_count {
            best = Some(d);
            best_count = count;
        }
    }
    best
}

/// Party majority decision on a voting, from at-vote-time faction labels.
pub fn party_majority(voting: &Voting, party_code: &str) -> Option<VoteDecision> {
    majority_decision(&party_decisions(voting, party_code))
}

/// Fraction of a party's non-absent voters who matched the party majority.
/// A party with no non-absent voters on the voting defaults to 1.0.
pub fn party_cohesion(voting: &Voting, party_code: &str) -> f64 {
    let decisions = party_decisions(voting, party_code);
    let Some(majority) = majority_decision(&decisions) else {
        return 1.0;
    };
    let aligned = decisions.iter().filter(|d| **d == majority).count();
    aligned as f64 / decisions.len() as f64
}

/// A member's own decision and their party's majority on one voting.
/// Party majority is `None` when the party cast no non-absent votes.
pub fn member_and_party_decision(
    voting: &Voting,
    member_uuid: &str,
    party_code: &str,
) -> (Option<VoteDecision>, Option<VoteDecision>) {
    let member = voting.decision_of(member_uuid);
    let majority = party_majority(voting, party_code);
    (member, majority)
}

#[cfg(test)]
pub(crate) mod test_support {
    use rkradar_common::db::models::{MpProfile, MpStats, Voter, Voting};
    use rkradar_common::domain::{party_names, VoteDecision};

    pub fn voter(uuid: &str, faction: &str, decision: VoteDecision) -> Voter {
        Voter {
            member_uuid: uuid.to_string(),
            full_name: uuid.to_string(),
            faction: Some(faction.to_string()),
            decision,
        }
    }

    pub fn voting(uuid: &str, time: &str, voters: Vec<Voter>) -> Voting {
        Voting {
            uuid: uuid.to_string(),
            title: format!("Hääletus {uuid}"),
            description: None,
            voting_time: Some(time.to_string()),
            session_date: Some(time.get(..10).unwrap_or("2024-01-01").to_string()),
            result: None,
            in_favor: 0,
            against: 0,
            abstained: 0,
            absent: 0,
            voters,
            related_draft_uuid: None,
            embedding: None,
        }
    }

    pub fn profile(member_uuid: &str, party_code: &str) -> MpProfile {
        let party = party_names(party_code)
            .map(|(estonian, _)| estonian.to_string())
            .unwrap_or_else(|| party_code.to_string());
        MpProfile {
            slug: member_uuid.to_string(),
            member_uuid: member_uuid.to_string(),
            name: member_uuid.to_string(),
            first_name: member_uuid.to_string(),
            last_name: String::new(),
            party,
            party_code: party_code.to_string(),
            photo_url: None,
            status: "active".to_string(),
            is_current_member: true,
            committees: Vec::new(),
            convocations: vec![15],
            stats: MpStats::default(),
        }
    }
}

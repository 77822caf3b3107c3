//! Coalition detection from voting correlation
//!
//! Parties whose per-voting majority decisions agree above a threshold over
//! a recent window are treated as coalition partners. Recomputed fresh on
//! every call: coalition membership is a sliding-window signal and must
//! track realignment without persisted state.
//!
//! Pairwise agreement is joined on voting uuid, so a party absent from some
//! votings never shifts the alignment of the remaining comparisons.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use rkradar_common::db::models::Voting;
use rkradar_common::domain::VoteDecision;

use crate::prediction::{majority_decision, party_decisions_by_party};

/// Agreement rate above which two parties count as voting together
pub const AGREEMENT_THRESHOLD: f64 = 0.70;

/// Minimum shared votings required before a pair is comparable
pub const MIN_OVERLAP: usize = 10;

/// Number of recent votings the detector looks at
pub const COALITION_WINDOW: i64 = 100;

/// Detect the current coalition cluster from recent votings.
///
/// For each party, the majority decision per voting (keyed by voting uuid);
/// for each pair, agreement over the votings both participated in; the
/// returned coalition is the largest cluster of parties whose agreement
/// with an anchor party exceeds [`AGREEMENT_THRESHOLD`].
pub fn detect_coalition(votings: &[Voting]) -> BTreeSet<String> {
    // party -> voting uuid -> majority decision
    let mut positions: BTreeMap<String, HashMap<String, VoteDecision>> = BTreeMap::new();

    for voting in votings {
        for (party, decisions) in party_decisions_by_party(voting) {
            if let Some(majority) = majority_decision(&decisions) {
                positions
                    .entry(party)
                    .or_default()
                    .insert(voting.uuid.clone(), majority);
            }
        }
    }

    let parties: Vec<&String> = positions.keys().collect();
    let mut agreement: HashMap<(String, String), f64> = HashMap::new();

    for (i, p1) in parties.iter().enumerate() {
        for p2 in parties.iter().skip(i + 1) {
            let pos1 = &positions[*p1];
            let pos2 = &positions[*p2];
            let mut shared = 0usize;
            let mut agree = 0usize;
            for (voting_uuid, d1) in pos1 {
                if let Some(d2) = pos2.get(voting_uuid) {
                    shared += 1;
                    if d1 == d2 {
                        agree += 1;
                    }
                }
            }
            if shared >= MIN_OVERLAP {
                let rate = agree as f64 / shared as f64;
                agreement.insert(pair_key(p1, p2), rate);
            }
        }
    }

    // Try each party as anchor, keep the largest cluster
    let mut coalition = BTreeSet::new();
    for anchor in &parties {
        let mut cluster: BTreeSet<String> = BTreeSet::new();
        cluster.insert((*anchor).clone());
        for other in &parties {
            if other == anchor {
                continue;
            }
            if agreement
                .get(&pair_key(anchor, other))
                .is_some_and(|rate| *rate > AGREEMENT_THRESHOLD)
            {
                cluster.insert((*other).clone());
            }
        }
        if cluster.len() > coalition.len() {
            coalition = cluster;
        }
    }

    coalition
}

fn pair_key(a: &str, b: &str) -> (String, String) {
    if a < b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prediction::test_support::*;

    const RE: &str = "Eesti Reformierakonna fraktsioon";
    const SDE: &str = "Sotsiaaldemokraatliku Erakonna fraktsioon";
    const EKRE: &str = "Eesti Konservatiivse Rahvaerakonna fraktsioon";

    fn coalition_fixture() -> Vec<Voting> {
        // RE and SDE vote together on every voting; EKRE opposes.
        (0..20)
            .map(|i| {
                let (re, sde, ekre) = if i % 10 == 0 {
                    // occasional disagreement, still above threshold
                    (VoteDecision::For, VoteDecision::Against, VoteDecision::Against)
                } else {
                    (VoteDecision::For, VoteDecision::For, VoteDecision::Against)
                };
                voting(
                    &format!("v-{i}"),
                    &format!("2024-03-{:02}T12:00:00", i % 28 + 1),
                    vec![
                        voter("re-1", RE, re),
                        voter("re-2", RE, re),
                        voter("sde-1", SDE, sde),
                        voter("sde-2", SDE, sde),
                        voter("ekre-1", EKRE, ekre),
                        voter("ekre-2", EKRE, ekre),
                    ],
                )
            })
            .collect()
    }

    #[test]
    fn detects_agreeing_cluster() {
        let coalition = detect_coalition(&coalition_fixture());
        assert!(coalition.contains("RE"));
        assert!(coalition.contains("SDE"));
        assert!(!coalition.contains("EKRE"));
    }

    #[test]
    fn sparse_participation_joins_on_voting_id() {
        // SDE skips every odd voting. On the votings SDE does attend, it
        // always matches RE, so agreement must be 1.0 — a positional join
        // would misalign the sequences and dilute it.
        let mut votings = Vec::new();
        for i in 0..24 {
            let mut voters = vec![
                voter("re-1", RE, if i % 2 == 0 { VoteDecision::For } else { VoteDecision::Against }),
                voter("ekre-1", EKRE, VoteDecision::Abstain),
            ];
            if i % 2 == 0 {
                voters.push(voter("sde-1", SDE, VoteDecision::For));
            }
            votings.push(voting(&format!("v-{i}"), &format!("2024-03-{:02}T12:00:00", i + 1), voters));
        }

        let coalition = detect_coalition(&votings);
        assert!(coalition.contains("RE"));
        assert!(coalition.contains("SDE"));
    }

    #[test]
    fn pairs_below_min_overlap_are_excluded() {
        // Only 5 shared votings: below MIN_OVERLAP, so no cluster forms
        let votings: Vec<Voting> = (0..5)
            .map(|i| {
                voting(
                    &format!("v-{i}"),
                    &format!("2024-03-{:02}T12:00:00", i + 1),
                    vec![
                        voter("re-1", RE, VoteDecision::For),
                        voter("sde-1", SDE, VoteDecision::For),
                    ],
                )
            })
            .collect();

        let coalition = detect_coalition(&votings);
        assert!(coalition.len() <= 1);
    }

    #[test]
    fn empty_window_yields_empty_coalition() {
        assert!(detect_coalition(&[]).is_empty());
    }
}

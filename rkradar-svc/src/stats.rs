//! Per-MP voting statistics, recomputed from stored votings after each
//! sync: decision tallies, attendance, and party alignment rate.

use sqlx::SqlitePool;
use tracing::info;

use rkradar_common::db::models::MpStats;
use rkradar_common::db::{members, votings};
use rkradar_common::domain::VoteDecision;
use rkradar_common::Result;

use crate::prediction::{majority_decision, party_decisions};

const STATS_VOTING_LIMIT: i64 = 100_000;

/// Recompute stats for every MP profile. Attendance counts non-absent
/// decisions; alignment compares the MP's vote against their own party's
/// majority (including their own vote) on each voting where both sides
/// produced a non-absent decision.
pub async fn recompute_all_stats(pool: &SqlitePool) -> Result<u64> {
    let mps = members::list_mps(pool).await?;
    let mut updated = 0u64;
    for mp in &mps {
        let history = votings::votings_with_member(pool, &mp.member_uuid, STATS_VOTING_LIMIT).await?;
        let stats = stats_from_history(&history, &mp.member_uuid, &mp.party_code);
        members::update_mp_stats(pool, &mp.slug, &stats).await?;
        updated += 1;
    }
    info!(updated, "MP stats recomputed");
    Ok(updated)
}

fn stats_from_history(
    history: &[rkradar_common::db::models::Voting],
    member_uuid: &str,
    party_code: &str,
) -> MpStats {
    let mut stats = MpStats::default();
    let mut absent = 0i64;
    let mut aligned = 0i64;
    let mut scorable = 0i64;

    for voting in history {
        let Some(decision) = voting.decision_of(member_uuid) else {
            continue;
        };
        stats.total_votes += 1;
        match decision {
            VoteDecision::For => stats.votes_for += 1,
            VoteDecision::Against => stats.votes_against += 1,
            VoteDecision::Abstain => stats.votes_abstain += 1,
            VoteDecision::Absent => absent += 1,
        }

        if decision == VoteDecision::Absent {
            continue;
        }
        let decisions = party_decisions(voting, party_code);
        let Some(majority) = majority_decision(&decisions) else {
            continue;
        };
        scorable += 1;
        if decision == majority {
            aligned += 1;
        }
    }

    if stats.total_votes > 0 {
        stats.attendance = round1(
            (stats.total_votes - absent) as f64 / stats.total_votes as f64 * 100.0,
        );
    }
    if scorable > 0 {
        stats.party_alignment_rate = round1(aligned as f64 / scorable as f64 * 100.0);
    }
    stats
}

fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prediction::test_support::{voter, voting};

    const RE: &str = "Eesti Reformierakonna fraktsioon";

    #[test]
    fn tallies_and_attendance() {
        let history = vec![
            voting("v1", "2024-01-10T12:00:00Z", vec![
                voter("mp", RE, VoteDecision::For),
                voter("p2", RE, VoteDecision::For),
            ]),
            voting("v2", "2024-01-11T12:00:00Z", vec![
                voter("mp", RE, VoteDecision::Absent),
                voter("p2", RE, VoteDecision::Against),
            ]),
            voting("v3", "2024-01-12T12:00:00Z", vec![
                voter("mp", RE, VoteDecision::Against),
                voter("p2", RE, VoteDecision::For),
                voter("p3", RE, VoteDecision::For),
            ]),
        ];
        let stats = stats_from_history(&history, "mp", "RE");
        assert_eq!(stats.total_votes, 3);
        assert_eq!(stats.votes_for, 1);
        assert_eq!(stats.votes_against, 1);
        assert_eq!(stats.votes_abstain, 0);
        assert!((stats.attendance - 66.7).abs() < 1e-9);
        // v1 aligned, v3 not (party majority FOR, MP AGAINST)
        assert!((stats.party_alignment_rate - 50.0).abs() < 1e-9);
    }

    #[test]
    fn absent_votes_never_score_alignment() {
        let history = vec![voting("v1", "2024-01-10T12:00:00Z", vec![
            voter("mp", RE, VoteDecision::Absent),
            voter("p2", RE, VoteDecision::For),
        ])];
        let stats = stats_from_history(&history, "mp", "RE");
        assert_eq!(stats.total_votes, 1);
        assert_eq!(stats.attendance, 0.0);
        assert_eq!(stats.party_alignment_rate, 0.0);
    }

    #[test]
    fn votings_without_the_member_are_ignored() {
        let history = vec![voting("v1", "2024-01-10T12:00:00Z", vec![
            voter("p2", RE, VoteDecision::For),
        ])];
        let stats = stats_from_history(&history, "mp", "RE");
        assert_eq!(stats.total_votes, 0);
    }
}

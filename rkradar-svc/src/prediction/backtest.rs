//! Backtesting against post-cutoff votings.
//!
//! Scores whatever is deployed (trained model or party-line baseline) on
//! every non-absent vote after the cutoff date, and always computes the
//! party-line floor alongside it so improvement-over-baseline stays
//! honest. Absent votes are never scored.

use std::collections::BTreeMap;

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{info, warn};

use rkradar_common::db::model_state::{self, push_trend};
use rkradar_common::db::models::{BacktestCounts, ModelAccuracy, TrendPoint};
use rkradar_common::db::{members, votings};
use rkradar_common::domain::resolve_party;
use rkradar_common::Result;

use super::baseline::BASELINE_VERSION;
use super::coalition::{detect_coalition, COALITION_WINDOW};
use super::features::{feature_vector, training_feature_map, TrainingRow};
use super::model::{label_decision, label_index, ModelRegistry};
use super::{majority_decision, party_cohesion, party_decisions_by_party};

#[derive(Debug, Clone)]
pub struct BacktestReport {
    pub overall: f64,
    pub correct: usize,
    pub total: usize,
    pub by_party: BTreeMap<String, f64>,
    pub by_vote_type: BTreeMap<String, f64>,
    pub votings_evaluated: usize,
    pub baseline_accuracy: f64,
    pub model_version: String,
}

#[derive(Default)]
struct Tally {
    correct: usize,
    total: usize,
}

impl Tally {
    fn record(&mut self, correct: bool) {
        self.total += 1;
        if correct {
            self.correct += 1;
        }
    }

    fn pct(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f64 / self.total as f64 * 100.0
        }
    }
}

/// Run the backtest and persist the result to model state. Returns `None`
/// when no post-cutoff votings exist yet.
pub async fn run_backtest(
    pool: &SqlitePool,
    registry: &tokio::sync::RwLock<ModelRegistry>,
    cutoff: &str,
) -> Result<Option<BacktestReport>> {
    let voting_rows = votings::votings_since(pool, cutoff).await?;
    if voting_rows.is_empty() {
        warn!(cutoff, "no post-cutoff votings to backtest");
        return Ok(None);
    }
    info!(cutoff, votings = voting_rows.len(), "running backtest");

    let guard = registry.read().await;
    let deployed = guard.deployed().map(|(m, v)| (m.clone(), v.to_string()));
    drop(guard);

    // Context the trained model's feature rows need
    let mut mp_stats = BTreeMap::new();
    if deployed.is_some() {
        for mp in members::list_mps(pool).await? {
            mp_stats.insert(mp.member_uuid.clone(), mp);
        }
    }
    let recent = votings::recent_votings(pool, COALITION_WINDOW).await?;
    let coalition = detect_coalition(&recent);

    let mut overall = Tally::default();
    let mut baseline = Tally::default();
    let mut by_party: BTreeMap<String, Tally> = BTreeMap::new();
    let mut by_vote_type: BTreeMap<String, Tally> = BTreeMap::new();

    for voting in &voting_rows {
        if voting.voters.is_empty() {
            continue;
        }
        let decisions = party_decisions_by_party(voting);
        let majorities: BTreeMap<&String, _> = decisions
            .iter()
            .filter_map(|(party, ds)| majority_decision(ds).map(|m| (party, m)))
            .collect();

        for voter in &voting.voters {
            if label_index(voter.decision).is_none() {
                continue;
            }
            let party = resolve_party(voter.faction.as_deref()).to_string();
            let Some(&party_line) = majorities.get(&party) else {
                continue;
            };
            baseline.record(party_line == voter.decision);

            let predicted = match &deployed {
                Some((model, _)) => {
                    let stats = mp_stats.get(&voter.member_uuid);
                    let row = TrainingRow {
                        loyalty_rate: stats
                            .filter(|mp| mp.stats.total_votes > 0)
                            .map(|mp| mp.stats.party_alignment_rate / 100.0)
                            .unwrap_or(0.85),
                        topic_similarity: 0.0,
                        party_cohesion: party_cohesion(voting, &party),
                        attendance_rate: stats
                            .filter(|mp| mp.stats.total_votes > 0)
                            .map(|mp| mp.stats.attendance / 100.0)
                            .unwrap_or(0.8),
                        in_coalition: coalition.contains(&party),
                    };
                    let features = feature_vector(&training_feature_map(&row));
                    label_decision(model.predict(&features))
                }
                None => party_line,
            };

            let correct = predicted == voter.decision;
            overall.record(correct);
            by_party.entry(party).or_default().record(correct);
            by_vote_type
                .entry(voter.decision.as_str().to_string())
                .or_default()
                .record(correct);
        }
    }

    if overall.total == 0 {
        warn!("no scorable votes in backtest window");
        return Ok(None);
    }

    let model_version = deployed
        .as_ref()
        .map(|(_, v)| v.clone())
        .unwrap_or_else(|| BASELINE_VERSION.to_string());

    let report = BacktestReport {
        overall: round1(overall.pct()),
        correct: overall.correct,
        total: overall.total,
        by_party: by_party.iter().map(|(p, t)| (p.clone(), round1(t.pct()))).collect(),
        by_vote_type: by_vote_type
            .iter()
            .map(|(d, t)| (d.clone(), round1(t.pct())))
            .collect(),
        votings_evaluated: voting_rows.len(),
        baseline_accuracy: round1(baseline.pct()),
        model_version: model_version.clone(),
    };

    let party_counts: BTreeMap<String, i64> = by_party
        .iter()
        .map(|(p, t)| (p.clone(), t.total as i64))
        .collect();
    let vote_type_counts: BTreeMap<String, i64> = by_vote_type
        .iter()
        .map(|(d, t)| (d.clone(), t.total as i64))
        .collect();

    let saved = report.clone();
    model_state::update_model_state(pool, move |s| {
        s.version = Some(saved.model_version.clone());
        s.trained_at = Some(Utc::now());
        s.accuracy = Some(ModelAccuracy {
            overall: Some(saved.overall),
            by_party: saved.by_party.clone(),
            by_vote_type: saved.by_vote_type.clone(),
        });
        s.backtest_counts = Some(BacktestCounts {
            by_party: party_counts,
            by_vote_type: vote_type_counts,
        });
        s.baseline_accuracy = Some(saved.baseline_accuracy);
        s.improvement_over_baseline = Some(round1(saved.overall - saved.baseline_accuracy));
        push_trend(
            s,
            TrendPoint {
                date: Utc::now().format("%Y-%m-%d").to_string(),
                accuracy: saved.overall,
            },
        );
    })
    .await?;

    info!(
        overall = report.overall,
        baseline = report.baseline_accuracy,
        total = report.total,
        "backtest complete"
    );
    Ok(Some(report))
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

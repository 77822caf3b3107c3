//! Model training, selection, and the live predictor.
//!
//! Training is time-separated: rows before the configured cutoff date
//! train, rows at or after it evaluate. A softmax regression is fitted
//! first; when its held-out accuracy falls short of 87% a gradient-boosted
//! model is tried and the better one kept. Probabilities are calibrated on
//! a slice of the evaluation set when that slice covers every training
//! class. The candidate replaces the deployed model only when it beats the
//! stored baseline accuracy.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{info, warn};

use rkradar_common::db::model_state::{self, push_trend};
use rkradar_common::db::models::{
    FeatureImportance, FeatureValue, ModelAccuracy, MpProfile, PredictionOutput, TrendPoint,
};
use rkradar_common::db::{members, votings};
use rkradar_common::domain::VoteDecision;
use rkradar_common::Result;

use super::baseline::predict_party_line;
use super::boosted::GradientBoost;
use super::calibrate::Calibrator;
use super::coalition::{detect_coalition, COALITION_WINDOW};
use super::features::{
    compute_features, feature_values, feature_vector, training_feature_map, TrainingRow,
    FEATURE_NAMES,
};
use super::linear::{balanced_class_weights, SoftmaxRegression};
use super::{party_cohesion, party_decisions_by_party};

pub const N_CLASSES: usize = 3;
/// Held-out accuracy below which the boosted model is attempted, percent.
const ESCALATION_THRESHOLD: f64 = 87.0;
/// Minimum training rows before any model is fitted.
const MIN_TRAINING_ROWS: usize = 100;
/// Votings fetched per training range.
const MAX_TRAINING_VOTINGS: i64 = 500;
/// Calibration slice bounds over the evaluation set.
const MAX_CALIBRATION_ROWS: usize = 500;
const MIN_CALIBRATION_ROWS: usize = 20;

/// FOR is class 0, AGAINST 1, ABSTAIN 2. Absences are never modeled.
pub fn label_index(decision: VoteDecision) -> Option<usize> {
    match decision {
        VoteDecision::For => Some(0),
        VoteDecision::Against => Some(1),
        VoteDecision::Abstain => Some(2),
        VoteDecision::Absent => None,
    }
}

pub fn label_decision(index: usize) -> VoteDecision {
    match index {
        0 => VoteDecision::For,
        1 => VoteDecision::Against,
        _ => VoteDecision::Abstain,
    }
}

/// A deployable model variant behind one inference interface.
#[derive(Debug, Clone)]
pub enum TrainedModel {
    Linear(SoftmaxRegression),
    Boosted(GradientBoost),
    Calibrated {
        base: Box<TrainedModel>,
        calibrator: Calibrator,
    },
}

impl TrainedModel {
    pub fn predict(&self, row: &[f64]) -> usize {
        super::linear::argmax(&self.predict_proba(row))
    }

    pub fn predict_proba(&self, row: &[f64]) -> Vec<f64> {
        match self {
            TrainedModel::Linear(m) => m.predict_proba(row),
            TrainedModel::Boosted(m) => m.predict_proba(row),
            TrainedModel::Calibrated { base, calibrator } => {
                calibrator.apply(&base.predict_proba(row))
            }
        }
    }

    /// Importances come from the underlying model; calibration only
    /// reshapes probabilities.
    pub fn importances(&self) -> Vec<(String, f64)> {
        match self {
            TrainedModel::Linear(m) => m.importances(),
            TrainedModel::Boosted(m) => m.importances(),
            TrainedModel::Calibrated { base, .. } => base.importances(),
        }
    }
}

/// The deployed model. Owned by [`crate::AppState`] behind a lock and
/// replaced only by a successful training run.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    model: Option<TrainedModel>,
    version: Option<String>,
}

impl ModelRegistry {
    pub fn deployed(&self) -> Option<(&TrainedModel, &str)> {
        match (&self.model, &self.version) {
            (Some(model), Some(version)) => Some((model, version)),
            _ => None,
        }
    }

    pub fn version(&self) -> &str {
        self.version.as_deref().unwrap_or("untrained")
    }

    pub fn deploy(&mut self, model: TrainedModel, version: String) {
        self.model = Some(model);
        self.version = Some(version);
    }
}

/// One (member, voting) training row.
pub struct TrainingSample {
    pub features: Vec<f64>,
    pub label: usize,
    pub party: String,
}

pub enum TrainOutcome {
    InsufficientData { samples: usize },
    Trained(TrainSummary),
}

pub struct TrainSummary {
    pub version: String,
    pub train_accuracy: f64,
    pub test_accuracy: f64,
    pub train_size: usize,
    pub test_size: usize,
    pub improvement_over_baseline: f64,
    pub promoted: bool,
}

/// Which side of the cutoff a training range covers.
enum Range<'a> {
    Before(&'a str),
    Since(&'a str),
}

/// Train, select, calibrate, and (when it clears the baseline) deploy.
pub async fn train_model(
    pool: &SqlitePool,
    registry: &tokio::sync::RwLock<ModelRegistry>,
    cutoff: &str,
) -> Result<TrainOutcome> {
    info!(cutoff, "training model");

    let train = build_training_data(pool, Range::Before(cutoff)).await?;
    let test = build_training_data(pool, Range::Since(cutoff)).await?;

    if train.len() < MIN_TRAINING_ROWS {
        warn!(samples = train.len(), "insufficient training data");
        return Ok(TrainOutcome::InsufficientData {
            samples: train.len(),
        });
    }

    let x_train: Vec<Vec<f64>> = train.iter().map(|s| s.features.clone()).collect();
    let y_train: Vec<usize> = train.iter().map(|s| s.label).collect();
    let x_test: Vec<Vec<f64>> = test.iter().map(|s| s.features.clone()).collect();
    let y_test: Vec<usize> = test.iter().map(|s| s.label).collect();

    info!(train = train.len(), test = test.len(), "training data built");

    let linear = SoftmaxRegression::fit(&x_train, &y_train, N_CLASSES);
    let mut model = TrainedModel::Linear(linear);
    let mut version = "logistic-v1".to_string();

    let train_accuracy = accuracy_pct(&model, &x_train, &y_train);
    let mut test_accuracy = accuracy_pct(&model, &x_test, &y_test);
    info!(train_accuracy, test_accuracy, "softmax regression fitted");

    if !x_test.is_empty() && test_accuracy < ESCALATION_THRESHOLD {
        info!(test_accuracy, "below escalation threshold, trying boosted trees");
        let class_weights = balanced_class_weights(&y_train, N_CLASSES);
        let sample_weights: Vec<f64> = y_train.iter().map(|&l| class_weights[l]).collect();
        let boosted = GradientBoost::fit(&x_train, &y_train, N_CLASSES, Some(&sample_weights));
        let candidate = TrainedModel::Boosted(boosted);
        let boosted_accuracy = accuracy_pct(&candidate, &x_test, &y_test);
        info!(boosted_accuracy, "boosted model evaluated");
        if boosted_accuracy > test_accuracy {
            model = candidate;
            test_accuracy = boosted_accuracy;
            version = "boosted-v1".to_string();
        }
    }

    // Calibrate on a slice of the evaluation set, then re-score on the rest
    if !x_test.is_empty() {
        let cal_size = (x_test.len() / 3).min(MAX_CALIBRATION_ROWS);
        if cal_size >= MIN_CALIBRATION_ROWS
            && covers_classes(&y_test[..cal_size], &y_train)
        {
            let probas: Vec<Vec<f64>> = x_test[..cal_size]
                .iter()
                .map(|row| model.predict_proba(row))
                .collect();
            let calibrator = Calibrator::fit(&probas, &y_test[..cal_size], N_CLASSES);
            model = TrainedModel::Calibrated {
                base: Box::new(model),
                calibrator,
            };
            if x_test.len() > cal_size {
                test_accuracy =
                    accuracy_pct(&model, &x_test[cal_size..], &y_test[cal_size..]);
                info!(test_accuracy, "calibrated model re-evaluated");
            }
        }
    }

    let state = model_state::load_model_state(pool).await?;
    let baseline_accuracy = state.baseline_accuracy.unwrap_or(0.0);
    let promoted = test_accuracy > baseline_accuracy;
    let improvement = if test_accuracy > 0.0 {
        round1(test_accuracy - baseline_accuracy)
    } else {
        0.0
    };

    let recorded_version = if promoted {
        version.clone()
    } else {
        format!("{version}-rejected")
    };

    let mut importances: Vec<FeatureImportance> = model
        .importances()
        .into_iter()
        .map(|(name, importance)| FeatureImportance {
            name,
            importance: round4(importance),
        })
        .collect();
    importances.sort_by(|a, b| b.importance.total_cmp(&a.importance));

    let by_party = accuracy_by_party(&model, &test);
    let by_vote_type = accuracy_by_vote_type(&model, &x_test, &y_test);

    let overall = if test_accuracy > 0.0 {
        Some(round1(test_accuracy))
    } else {
        None
    };
    let training_size = train.len() as i64;
    let trend_accuracy = round1(test_accuracy);
    model_state::update_model_state(pool, |s| {
        s.version = Some(recorded_version.clone());
        s.trained_at = Some(Utc::now());
        s.training_size = Some(training_size);
        s.features = Some(FEATURE_NAMES.iter().map(|n| n.to_string()).collect());
        s.feature_importances = Some(importances.clone());
        s.accuracy = Some(ModelAccuracy {
            overall,
            by_party: by_party.clone(),
            by_vote_type: by_vote_type.clone(),
        });
        s.improvement_over_baseline = Some(improvement);
        push_trend(
            s,
            TrendPoint {
                date: Utc::now().format("%Y-%m-%d").to_string(),
                accuracy: trend_accuracy,
            },
        );
    })
    .await?;

    if promoted {
        registry.write().await.deploy(model, version.clone());
        info!(version, test_accuracy, "model promoted");
    } else {
        info!(
            version = recorded_version,
            test_accuracy, baseline_accuracy, "candidate below baseline, not promoted"
        );
    }

    Ok(TrainOutcome::Trained(TrainSummary {
        version: recorded_version,
        train_accuracy: round1(train_accuracy),
        test_accuracy: round1(test_accuracy),
        train_size: train.len(),
        test_size: test.len(),
        improvement_over_baseline: improvement,
        promoted,
    }))
}

/// Predict a member's vote: trained model when one is deployed, party-line
/// baseline otherwise. Confidence is the predicted class probability,
/// capped below certainty.
pub async fn predict_vote(
    pool: &SqlitePool,
    registry: &tokio::sync::RwLock<ModelRegistry>,
    mp: &MpProfile,
    bill_embedding: Option<&[f32]>,
    bill_initiators: &[String],
) -> Result<PredictionOutput> {
    let feature_map = compute_features(pool, mp, bill_embedding, bill_initiators).await?;
    let row = feature_vector(&feature_map);

    let guard = registry.read().await;
    let Some((model, version)) = guard.deployed() else {
        drop(guard);
        let mut output = predict_party_line(pool, mp).await?;
        // The baseline reports its own feature set; keep the computed
        // breakdown available alongside it
        output.features = merge_features(output.features, feature_values(&feature_map));
        return Ok(output);
    };

    let probs = model.predict_proba(&row);
    let predicted = super::linear::argmax(&probs);
    let confidence = probs[predicted].min(0.99);
    let version = version.to_string();
    drop(guard);

    Ok(PredictionOutput {
        prediction: label_decision(predicted),
        confidence: round4(confidence),
        model_version: version,
        features: feature_values(&feature_map),
        cached: false,
    })
}

fn merge_features(
    mut baseline: Vec<FeatureValue>,
    computed: Vec<FeatureValue>,
) -> Vec<FeatureValue> {
    for value in computed {
        if !baseline.iter().any(|f| f.name == value.name) {
            baseline.push(value);
        }
    }
    baseline
}

fn accuracy_pct(model: &TrainedModel, x: &[Vec<f64>], y: &[usize]) -> f64 {
    if x.is_empty() {
        return 0.0;
    }
    let correct = x
        .iter()
        .zip(y)
        .filter(|(row, &label)| model.predict(row) == label)
        .count();
    correct as f64 / x.len() as f64 * 100.0
}

fn accuracy_by_party(
    model: &TrainedModel,
    samples: &[TrainingSample],
) -> std::collections::BTreeMap<String, f64> {
    let mut correct: std::collections::BTreeMap<String, (usize, usize)> = Default::default();
    for sample in samples {
        let entry = correct.entry(sample.party.clone()).or_default();
        entry.1 += 1;
        if model.predict(&sample.features) == sample.label {
            entry.0 += 1;
        }
    }
    correct
        .into_iter()
        .map(|(party, (c, t))| (party, round1(c as f64 / t as f64 * 100.0)))
        .collect()
}

fn accuracy_by_vote_type(
    model: &TrainedModel,
    x: &[Vec<f64>],
    y: &[usize],
) -> std::collections::BTreeMap<String, f64> {
    let mut tallies: std::collections::BTreeMap<usize, (usize, usize)> = Default::default();
    for (row, &label) in x.iter().zip(y) {
        let entry = tallies.entry(label).or_default();
        entry.1 += 1;
        if model.predict(row) == label {
            entry.0 += 1;
        }
    }
    tallies
        .into_iter()
        .map(|(label, (c, t))| {
            (
                label_decision(label).as_str().to_string(),
                round1(c as f64 / t as f64 * 100.0),
            )
        })
        .collect()
}

/// Build feature rows from stored votings. Per-voting party majorities and
/// cohesions are computed once; per-member stats come from the aggregated
/// profiles, so no per-sample queries are issued.
async fn build_training_data(pool: &SqlitePool, range: Range<'_>) -> Result<Vec<TrainingSample>> {
    let voting_rows = match range {
        Range::Before(date) => votings::votings_before(pool, date, MAX_TRAINING_VOTINGS).await?,
        Range::Since(date) => votings::votings_since(pool, date).await?,
    };

    let mut mp_stats = std::collections::BTreeMap::new();
    for mp in members::list_mps(pool).await? {
        mp_stats.insert(mp.member_uuid.clone(), mp);
    }

    let recent = votings::recent_votings(pool, COALITION_WINDOW).await?;
    let coalition = detect_coalition(&recent);

    let mut samples = Vec::new();
    for voting in &voting_rows {
        if voting.voters.is_empty() {
            continue;
        }
        let by_party = party_decisions_by_party(voting);
        let cohesion: std::collections::BTreeMap<String, f64> = by_party
            .keys()
            .map(|party| (party.clone(), party_cohesion(voting, party)))
            .collect();

        for voter in &voting.voters {
            let Some(label) = label_index(voter.decision) else {
                continue;
            };
            let party =
                rkradar_common::domain::resolve_party(voter.faction.as_deref()).to_string();
            let stats = mp_stats.get(&voter.member_uuid);
            let row = TrainingRow {
                loyalty_rate: stats
                    .filter(|mp| mp.stats.total_votes > 0)
                    .map(|mp| mp.stats.party_alignment_rate / 100.0)
                    .unwrap_or(0.85),
                topic_similarity: 0.0,
                party_cohesion: cohesion.get(&party).copied().unwrap_or(1.0),
                attendance_rate: stats
                    .filter(|mp| mp.stats.total_votes > 0)
                    .map(|mp| mp.stats.attendance / 100.0)
                    .unwrap_or(0.8),
                in_coalition: coalition.contains(&party),
            };
            samples.push(TrainingSample {
                features: feature_vector(&training_feature_map(&row)),
                label,
                party,
            });
        }
    }

    Ok(samples)
}

/// True when every class present in the training labels also appears in
/// the calibration slice.
fn covers_classes(cal: &[usize], train: &[usize]) -> bool {
    let cal_set: std::collections::BTreeSet<usize> = cal.iter().copied().collect();
    train.iter().all(|label| cal_set.contains(label))
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    use rkradar_common::db::models::MpStats;
    use rkradar_common::db::{init_tables, members};
    use tokio::sync::RwLock;

    use crate::prediction::test_support::{profile, voter, voting};

    const RE: &str = "Eesti Reformierakonna fraktsioon";
    const EKRE: &str = "Eesti Konservatiivse Rahvaerakonna fraktsioon";
    const CUTOFF: &str = "2025-01-01";

    /// Two parties with distinct profiles and fully party-line voting:
    /// 20 pre-cutoff votings (120 samples) and 5 post-cutoff (30 samples).
    async fn seeded_pool() -> SqlitePool {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        init_tables(&pool).await.unwrap();

        for (uuid, code, alignment, attendance) in [
            ("re-1", "RE", 95.0, 92.0),
            ("re-2", "RE", 95.0, 92.0),
            ("re-3", "RE", 95.0, 92.0),
            ("ek-1", "EKRE", 60.0, 70.0),
            ("ek-2", "EKRE", 60.0, 70.0),
            ("ek-3", "EKRE", 60.0, 70.0),
        ] {
            let mp = profile(uuid, code);
            members::upsert_mp_profile(&pool, &mp).await.unwrap();
            members::update_mp_stats(&pool, &mp.slug, &MpStats {
                total_votes: 50,
                attendance,
                votes_for: 25,
                votes_against: 20,
                votes_abstain: 5,
                party_alignment_rate: alignment,
            })
            .await
            .unwrap();
        }

        let party_line = |uuid: &str, time: &str| {
            voting(uuid, time, vec![
                voter("re-1", RE, VoteDecision::For),
                voter("re-2", RE, VoteDecision::For),
                voter("re-3", RE, VoteDecision::For),
                voter("ek-1", EKRE, VoteDecision::Against),
                voter("ek-2", EKRE, VoteDecision::Against),
                voter("ek-3", EKRE, VoteDecision::Against),
            ])
        };
        for i in 0..20 {
            let time = format!("2024-03-{:02}T12:00:00Z", i + 1);
            let v = party_line(&format!("pre-{i}"), &time);
            votings::upsert_voting(&pool, &v).await.unwrap();
        }
        for i in 0..5 {
            let time = format!("2025-02-{:02}T12:00:00Z", i + 1);
            let v = party_line(&format!("post-{i}"), &time);
            votings::upsert_voting(&pool, &v).await.unwrap();
        }
        pool
    }

    #[tokio::test]
    async fn candidate_below_baseline_is_never_deployed() {
        let pool = seeded_pool().await;
        // Held-out accuracy cannot strictly exceed a perfect baseline
        model_state::update_model_state(&pool, |s| s.baseline_accuracy = Some(100.0))
            .await
            .unwrap();

        let registry = RwLock::new(ModelRegistry::default());
        let outcome = train_model(&pool, &registry, CUTOFF).await.unwrap();
        let TrainOutcome::Trained(summary) = outcome else {
            panic!("expected a training run");
        };

        assert!(!summary.promoted);
        assert!(summary.version.ends_with("-rejected"));
        assert!(registry.read().await.deployed().is_none());

        // The attempt is still recorded for visibility
        let state = model_state::load_model_state(&pool).await.unwrap();
        assert!(state.version.unwrap().ends_with("-rejected"));
        assert!(state.accuracy.unwrap().overall.is_some());
    }

    #[tokio::test]
    async fn candidate_beating_baseline_is_promoted() {
        let pool = seeded_pool().await;
        model_state::update_model_state(&pool, |s| s.baseline_accuracy = Some(50.0))
            .await
            .unwrap();

        let registry = RwLock::new(ModelRegistry::default());
        let outcome = train_model(&pool, &registry, CUTOFF).await.unwrap();
        let TrainOutcome::Trained(summary) = outcome else {
            panic!("expected a training run");
        };

        assert!(summary.promoted);
        assert!(!summary.version.ends_with("-rejected"));
        assert!(summary.test_accuracy > 50.0);
        // Train and eval rows fall strictly on opposite sides of the cutoff
        assert_eq!(summary.train_size, 120);
        assert_eq!(summary.test_size, 30);

        let guard = registry.read().await;
        assert_eq!(guard.version(), summary.version);
        assert!(guard.deployed().is_some());
    }

    #[tokio::test]
    async fn too_little_data_skips_training() {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        init_tables(&pool).await.unwrap();

        let registry = RwLock::new(ModelRegistry::default());
        let outcome = train_model(&pool, &registry, CUTOFF).await.unwrap();
        assert!(matches!(outcome, TrainOutcome::InsufficientData { samples: 0 }));
        assert!(registry.read().await.deployed().is_none());
    }

    #[test]
    fn label_mapping_round_trips() {
        for decision in [
            VoteDecision::For,
            VoteDecision::Against,
            VoteDecision::Abstain,
        ] {
            let idx = label_index(decision).unwrap();
            assert_eq!(label_decision(idx), decision);
        }
        assert_eq!(label_index(VoteDecision::Absent), None);
    }

    #[test]
    fn registry_starts_untrained() {
        let registry = ModelRegistry::default();
        assert!(registry.deployed().is_none());
        assert_eq!(registry.version(), "untrained");
    }

    #[test]
    fn registry_deploy_replaces_model() {
        let mut registry = ModelRegistry::default();
        let model = SoftmaxRegression::fit(&[], &[], N_CLASSES);
        registry.deploy(TrainedModel::Linear(model), "logistic-v1".to_string());
        assert_eq!(registry.version(), "logistic-v1");
        assert!(registry.deployed().is_some());
    }

    #[test]
    fn calibration_slice_must_cover_training_classes() {
        assert!(covers_classes(&[0, 1, 2], &[0, 0, 1, 2]));
        assert!(!covers_classes(&[0, 1], &[0, 1, 2]));
        // No training classes: trivially covered
        assert!(covers_classes(&[], &[]));
    }

    #[test]
    fn rounding_helpers() {
        assert_eq!(round1(87.46), 87.5);
        assert_eq!(round4(0.123456), 0.1235);
    }
}

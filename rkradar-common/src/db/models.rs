//! Document models persisted by the radar service
//!
//! Nested structures (voter lists, committees, checkpoints, the model state
//! block) are stored as JSON text columns and round-tripped with serde,
//! so every struct here derives `Serialize`/`Deserialize`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::VoteDecision;

// --- Members ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Committee {
    pub name: String,
    pub role: Option<String>,
    /// Active while the committee membership has no end date
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub uuid: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub active: bool,
    pub faction_name: Option<String>,
    pub party_code: String,
    pub photo_url: Option<String>,
    #[serde(default)]
    pub committees: Vec<Committee>,
    #[serde(default)]
    pub convocations: Vec<i64>,
}

// --- Votings ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Voter {
    pub member_uuid: String,
    pub full_name: String,
    /// Faction label in force at the time of the vote, captured verbatim
    pub faction: Option<String>,
    pub decision: VoteDecision,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Voting {
    pub uuid: String,
    pub title: String,
    pub description: Option<String>,
    pub voting_time: Option<String>,
    pub session_date: Option<String>,
    pub result: Option<String>,
    pub in_favor: i64,
    pub against: i64,
    pub abstained: i64,
    pub absent: i64,
    pub voters: Vec<Voter>,
    pub related_draft_uuid: Option<String>,
    /// Lazily computed text embedding of title + description
    pub embedding: Option<Vec<f32>>,
}

impl Voting {
    /// The member's own decision on this voting, if they appear in it
    pub fn decision_of(&self, member_uuid: &str) -> Option<VoteDecision> {
        self.voters
            .iter()
            .find(|v| v.member_uuid == member_uuid)
            .map(|v| v.decision)
    }
}

// --- Drafts ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Draft {
    pub uuid: String,
    pub number: Option<String>,
    pub title: String,
    pub summary: Option<String>,
    #[serde(default)]
    pub initiators: Vec<String>,
    pub submit_date: Option<String>,
    #[serde(default)]
    pub related_voting_uuids: Vec<String>,
    pub embedding: Option<Vec<f32>>,
}

// --- Stenograms ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Speaker {
    pub member_uuid: Option<String>,
    pub full_name: String,
    pub text: String,
    pub topic: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stenogram {
    pub uuid: String,
    pub session_date: Option<String>,
    pub session_type: Option<String>,
    pub speakers: Vec<Speaker>,
}

// --- MP profiles ---

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MpStats {
    pub total_votes: i64,
    /// Attendance percentage, 0..100
    pub attendance: f64,
    pub votes_for: i64,
    pub votes_against: i64,
    pub votes_abstain: i64,
    /// Percentage of scorable votes matching the party majority, 0..100
    pub party_alignment_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MpProfile {
    pub slug: String,
    pub member_uuid: String,
    pub name: String,
    pub first_name: String,
    pub last_name: String,
    pub party: String,
    pub party_code: String,
    pub photo_url: Option<String>,
    pub status: String,
    pub is_current_member: bool,
    #[serde(default)]
    pub committees: Vec<Committee>,
    #[serde(default)]
    pub convocations: Vec<i64>,
    #[serde(default)]
    pub stats: MpStats,
}

// --- Sync progress ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncCheckpoint {
    pub year: i32,
    /// Never true for the current calendar year, which is always rescanned
    pub completed: bool,
    pub record_count: i64,
    pub last_offset: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncProgress {
    pub sync_type: String,
    pub status: String,
    pub total_records: i64,
    #[serde(default)]
    pub checkpoints: Vec<SyncCheckpoint>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl SyncProgress {
    pub fn idle(sync_type: &str) -> Self {
        Self {
            sync_type: sync_type.to_string(),
            status: "idle".to_string(),
            total_records: 0,
            checkpoints: Vec::new(),
            last_run_at: None,
            error: None,
        }
    }

    pub fn is_year_completed(&self, year: i32) -> bool {
        self.checkpoints
            .iter()
            .any(|cp| cp.year == year && cp.completed)
    }
}

// --- Model state (singleton) ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub name: String,
    pub importance: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelAccuracy {
    pub overall: Option<f64>,
    #[serde(default)]
    pub by_party: BTreeMap<String, f64>,
    #[serde(default)]
    pub by_vote_type: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BacktestCounts {
    #[serde(default)]
    pub by_party: BTreeMap<String, i64>,
    #[serde(default)]
    pub by_vote_type: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendPoint {
    /// ISO date (YYYY-MM-DD)
    pub date: String,
    pub accuracy: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanPriority {
    pub area: String,
    pub expected_gain: f64,
    pub action: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanEntry {
    pub date: String,
    pub priorities: Vec<PlanPriority>,
    pub outcome: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub kind: String,
    pub severity: String,
    #[serde(default)]
    pub parties: Vec<String>,
    pub description: String,
    pub detected_at: DateTime<Utc>,
    pub recent_correlation: Option<f64>,
    pub previous_correlation: Option<f64>,
    pub delta: Option<f64>,
}

/// The singleton "what model is live" document.
///
/// Fields appear only after the job that produces them has run at least
/// once, so every field is optional and readers must tolerate absence.
/// Writers go through [`crate::db::model_state::update_model_state`], which
/// performs an explicit read-merge-write per field group.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelState {
    pub version: Option<String>,
    pub trained_at: Option<DateTime<Utc>>,
    pub training_size: Option<i64>,
    pub features: Option<Vec<String>>,
    pub feature_importances: Option<Vec<FeatureImportance>>,
    pub accuracy: Option<ModelAccuracy>,
    pub backtest_counts: Option<BacktestCounts>,
    pub baseline_accuracy: Option<f64>,
    pub improvement_over_baseline: Option<f64>,
    /// Rolling accuracy trend across retrains/backtests, newest last
    pub trend: Option<Vec<TrendPoint>>,
    pub error_categories: Option<BTreeMap<String, i64>>,
    pub last_diagnosed_at: Option<DateTime<Utc>>,
    pub improvement_priorities: Option<Vec<PlanPriority>>,
    pub plan_history: Option<Vec<PlanEntry>>,
    pub detections: Option<Vec<Detection>>,
    pub last_detection_at: Option<DateTime<Utc>>,
}

// --- Predictions ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureValue {
    pub name: String,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionOutput {
    pub prediction: VoteDecision,
    pub confidence: f64,
    pub model_version: String,
    pub features: Vec<FeatureValue>,
    #[serde(default)]
    pub cached: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub id: String,
    pub mp_slug: String,
    pub mp_uuid: Option<String>,
    pub draft_uuid: Option<String>,
    pub bill_title: String,
    pub bill_hash: String,
    pub predicted: VoteDecision,
    pub confidence: f64,
    pub features_used: Vec<FeatureValue>,
    pub model_version: String,
    pub predicted_at: DateTime<Utc>,
    pub actual: Option<VoteDecision>,
    pub correct: Option<bool>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Bill payload accepted by the prediction endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillInput {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub full_text: Option<String>,
    #[serde(default)]
    pub draft_uuid: Option<String>,
}

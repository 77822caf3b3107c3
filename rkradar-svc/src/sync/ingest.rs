//! Checkpointed ingestion from the Riigikogu API.
//!
//! Each data type (members, votings, stenograms, drafts) syncs
//! independently and records its own progress row; a failure in one type
//! never blocks the others. The year-partitioned types loop from the epoch
//! year to the present, skipping prior years whose checkpoint is marked
//! completed. The current year is always rescanned since new votes arrive
//! throughout it, so its checkpoint is never marked completed. Database
//! size is checked between years and the run pauses (resumably) when the
//! configured ceiling is hit.

use std::collections::BTreeMap;

use chrono::{Datelike, Utc};
use serde::Deserialize;
use sqlx::SqlitePool;
use tracing::{error, info, warn};

use rkradar_common::config::Settings;
use rkradar_common::db::models::{
    Committee, Draft, Member, MpProfile, MpStats, Speaker, Stenogram, SyncCheckpoint,
    SyncProgress, Voter, Voting,
};
use rkradar_common::db::{self, drafts, members, progress, votings};
use rkradar_common::domain::{
    current_party_from_factions, make_slug, normalize_decision, party_names, resolve_party,
    FactionMembership, RawDecision,
};
use rkradar_common::Result;

use super::client::RiigikoguClient;

const DRAFTS_PAGE_SIZE: i64 = 500;
const STENO_ID_MAX_CHARS: usize = 80;

// --- Upstream payload shapes ---

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Labeled {
    Text(String),
    Coded {
        name: Option<String>,
        code: Option<String>,
        value: Option<String>,
    },
}

impl Labeled {
    pub fn label(&self) -> Option<&str> {
        match self {
            Labeled::Text(s) => Some(s.as_str()),
            Labeled::Coded { name, code, value } => name
                .as_deref()
                .or(value.as_deref())
                .or(code.as_deref()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberListItem {
    pub uuid: Option<String>,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub full_name: Option<String>,
    pub active: Option<bool>,
    /// Newer payloads: faction memberships with start/end windows
    #[serde(default)]
    pub factions: Vec<FactionDto>,
    /// Older payloads: a single faction label
    pub faction: Option<Labeled>,
    pub photo: Option<PhotoDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactionDto {
    pub name: Option<String>,
    pub membership: Option<MembershipWindow>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipWindow {
    pub end_date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PhotoDto {
    #[serde(rename = "_links")]
    pub links: Option<PhotoLinks>,
}

#[derive(Debug, Deserialize)]
pub struct PhotoLinks {
    pub download: Option<Href>,
}

#[derive(Debug, Deserialize)]
pub struct Href {
    pub href: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberDetail {
    #[serde(default)]
    pub memberships: Vec<MembershipDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipDto {
    pub membership_number: Option<i64>,
    #[serde(default)]
    pub committees: Vec<CommitteeDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitteeDto {
    pub name: Option<String>,
    pub membership: Option<CommitteeMembership>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitteeMembership {
    pub end_date: Option<String>,
    pub role: Option<Labeled>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SittingDto {
    pub sitting_date_time: Option<String>,
    #[serde(default)]
    pub votings: Vec<VotingRef>,
}

#[derive(Debug, Deserialize)]
pub struct VotingRef {
    pub uuid: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VotingDetail {
    pub uuid: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub start_date_time: Option<String>,
    pub result: Option<Labeled>,
    #[serde(default)]
    pub in_favor: i64,
    #[serde(default)]
    pub against: i64,
    #[serde(default)]
    pub abstained: i64,
    #[serde(default)]
    pub absent: i64,
    #[serde(default)]
    pub voters: Vec<VoterDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoterDto {
    pub uuid: Option<String>,
    pub full_name: Option<String>,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub faction: Option<Labeled>,
    pub decision: Option<RawDecision>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerbatimDto {
    pub date: Option<String>,
    pub title: Option<String>,
    #[serde(default)]
    pub agenda_items: Vec<AgendaItemDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgendaItemDto {
    pub title: Option<String>,
    #[serde(default)]
    pub events: Vec<EventDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDto {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub uuid: Option<String>,
    pub speaker: Option<String>,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftPage {
    #[serde(rename = "_embedded")]
    pub embedded: Option<DraftPageContent>,
    #[serde(default)]
    pub content: Vec<DraftRef>,
    pub page: Option<PageInfo>,
}

impl DraftPage {
    pub fn entries(&self) -> &[DraftRef] {
        match &self.embedded {
            Some(embedded) if !embedded.content.is_empty() => &embedded.content,
            _ => &self.content,
        }
    }

    pub fn total_pages(&self) -> i64 {
        self.page.as_ref().map(|p| p.total_pages).unwrap_or(1)
    }
}

#[derive(Debug, Deserialize)]
pub struct DraftPageContent {
    #[serde(default)]
    pub content: Vec<DraftRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    #[serde(default = "one")]
    pub total_pages: i64,
}

fn one() -> i64 {
    1
}

#[derive(Debug, Deserialize)]
pub struct DraftRef {
    pub uuid: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftDetail {
    pub uuid: Option<String>,
    pub number: Option<String>,
    pub mark: Option<String>,
    pub title: Option<String>,
    pub summary: Option<String>,
    #[serde(default)]
    pub initiators: Vec<Labeled>,
    pub submit_date: Option<String>,
    #[serde(default)]
    pub related_votings: Vec<RelatedVoting>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RelatedVoting {
    Text(String),
    Ref { uuid: Option<String> },
}

impl RelatedVoting {
    fn uuid(&self) -> Option<&str> {
        match self {
            RelatedVoting::Text(s) => Some(s.as_str()),
            RelatedVoting::Ref { uuid } => uuid.as_deref(),
        }
    }
}

// --- Session ---

/// One sync run against one pool. All four data types share the client's
/// adaptive rate limiter.
pub struct SyncSession<'a> {
    pool: &'a SqlitePool,
    settings: &'a Settings,
    client: RiigikoguClient,
}

/// Years still needing a scan: completed prior years are skipped, the
/// current year is always included.
pub fn years_to_scan(progress: &SyncProgress, epoch_year: i32, current_year: i32) -> Vec<i32> {
    (epoch_year..=current_year)
        .filter(|&year| year == current_year || !progress.is_year_completed(year))
        .collect()
}

/// Truncate to at most `max_bytes` of UTF-8 without splitting a character.
pub fn truncate_utf8(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

impl<'a> SyncSession<'a> {
    pub fn new(pool: &'a SqlitePool, settings: &'a Settings) -> Result<Self> {
        let client = RiigikoguClient::new(&settings.riigikogu_api_base, settings.rate_limit_ms)?;
        Ok(Self {
            pool,
            settings,
            client,
        })
    }

    /// Run every sync type sequentially. A failed type records its error
    /// in its own progress row and the run continues.
    pub async fn sync_all(&self) -> BTreeMap<&'static str, String> {
        let mut results = BTreeMap::new();
        results.insert(
            "members",
            match self.sync_members().await {
                Ok(count) => count.to_string(),
                Err(e) => format!("error: {e}"),
            },
        );
        results.insert(
            "votings",
            match self.sync_votings().await {
                Ok(count) => count.to_string(),
                Err(e) => format!("error: {e}"),
            },
        );
        results.insert(
            "stenograms",
            match self.sync_stenograms().await {
                Ok(count) => count.to_string(),
                Err(e) => format!("error: {e}"),
            },
        );
        results.insert(
            "drafts",
            match self.sync_drafts().await {
                Ok(count) => count.to_string(),
                Err(e) => format!("error: {e}"),
            },
        );
        results
    }

    pub async fn sync_members(&self) -> Result<u64> {
        self.mark_running("members").await?;
        match self.sync_members_inner().await {
            Ok(count) => {
                self.mark_completed("members", count).await?;
                Ok(count)
            }
            Err(e) => {
                self.mark_error("members", &e).await;
                Err(e)
            }
        }
    }

    pub async fn sync_votings(&self) -> Result<u64> {
        self.mark_running("votings").await?;
        match self.sync_yearly("votings").await {
            Ok(count) => {
                self.mark_completed("votings", count).await?;
                Ok(count)
            }
            Err(e) => {
                self.mark_error("votings", &e).await;
                Err(e)
            }
        }
    }

    pub async fn sync_stenograms(&self) -> Result<u64> {
        self.mark_running("stenograms").await?;
        match self.sync_yearly("stenograms").await {
            Ok(count) => {
                self.mark_completed("stenograms", count).await?;
                Ok(count)
            }
            Err(e) => {
                self.mark_error("stenograms", &e).await;
                Err(e)
            }
        }
    }

    pub async fn sync_drafts(&self) -> Result<u64> {
        self.mark_running("drafts").await?;
        match self.sync_yearly("drafts").await {
            Ok(count) => {
                self.mark_completed("drafts", count).await?;
                Ok(count)
            }
            Err(e) => {
                self.mark_error("drafts", &e).await;
                Err(e)
            }
        }
    }

    // --- Members ---

    async fn sync_members_inner(&self) -> Result<u64> {
        info!("syncing members");
        let list: Option<Vec<MemberListItem>> = self
            .client
            .get("/plenary-members", &[("lang", "ET".to_string())])
            .await?;
        let Some(list) = list else {
            warn!("no members returned from upstream");
            return Ok(0);
        };

        let mut count = 0u64;
        let total = list.len();
        for raw in list {
            let Some(uuid) = raw.uuid.clone() else {
                continue;
            };

            let detail: Option<MemberDetail> = self
                .client
                .get(&format!("/plenary-members/{uuid}"), &[("lang", "ET".to_string())])
                .await?;
            let (committees, convocations) = detail
                .map(|d| (parse_committees(&d), parse_convocations(&d)))
                .unwrap_or_default();

            let member = parse_member(&raw, committees, convocations);
            members::upsert_member(self.pool, &member).await?;
            members::upsert_mp_profile(self.pool, &mp_profile_from_member(&member)).await?;

            count += 1;
            if count % 10 == 0 {
                info!(count, total, "members sync progress");
            }
        }

        info!(count, "members sync complete");
        Ok(count)
    }

    // --- Year-partitioned types ---

    async fn sync_yearly(&self, sync_type: &str) -> Result<u64> {
        let current_year = Utc::now().year();
        let state = progress::get_sync_progress(self.pool, sync_type).await?;
        let years = years_to_scan(&state, self.settings.sync_epoch_year, current_year);

        let mut total = 0u64;
        for year in years {
            let count = match sync_type {
                "votings" => self.sync_votings_year(year).await?,
                "stenograms" => self.sync_stenograms_year(year).await?,
                "drafts" => self.sync_drafts_year(year).await?,
                other => {
                    return Err(rkradar_common::Error::InvalidInput(format!(
                        "unknown sync type {other}"
                    )))
                }
            };
            total += count;
            progress::save_checkpoint(
                self.pool,
                sync_type,
                SyncCheckpoint {
                    year,
                    completed: year < current_year,
                    record_count: count as i64,
                    last_offset: 0,
                },
            )
            .await?;

            if !self.db_size_ok().await {
                warn!(sync_type, year, "size ceiling reached, pausing sync");
                break;
            }
        }
        info!(sync_type, total, "yearly sync complete");
        Ok(total)
    }

    async fn sync_votings_year(&self, year: i32) -> Result<u64> {
        info!(year, "syncing votings");
        let sittings: Option<Vec<SittingDto>> = self
            .client
            .get(
                "/votings",
                &[
                    ("startDate", format!("{year}-01-01")),
                    ("endDate", format!("{year}-12-31")),
                ],
            )
            .await?;
        let Some(sittings) = sittings else {
            return Ok(0);
        };

        let mut count = 0u64;
        for sitting in &sittings {
            // Sittings without votings are empty and carry nothing to store
            if sitting.votings.is_empty() {
                continue;
            }
            for voting_ref in &sitting.votings {
                let Some(uuid) = voting_ref.uuid.as_deref() else {
                    continue;
                };
                if votings::voting_exists(self.pool, uuid).await? {
                    count += 1;
                    continue;
                }
                let detail: Option<VotingDetail> =
                    self.client.get(&format!("/votings/{uuid}"), &[]).await?;
                let Some(detail) = detail else {
                    continue;
                };
                if let Some(voting) = parse_voting(&detail, sitting.sitting_date_time.as_deref()) {
                    votings::upsert_voting(self.pool, &voting).await?;
                    count += 1;
                }
                if count % 100 == 0 && !self.db_size_ok().await {
                    return Ok(count);
                }
            }
        }
        Ok(count)
    }

    async fn sync_stenograms_year(&self, year: i32) -> Result<u64> {
        info!(year, "syncing stenograms");
        let sessions: Option<Vec<VerbatimDto>> = self
            .client
            .get(
                "/steno/verbatims",
                &[
                    ("startDate", format!("{year}-01-01")),
                    ("endDate", format!("{year}-12-31")),
                    ("lang", "et".to_string()),
                ],
            )
            .await?;
        let Some(sessions) = sessions else {
            return Ok(0);
        };

        let mut count = 0u64;
        for session in &sessions {
            let Some(steno) = parse_stenogram(session, self.settings.stenogram_max_bytes) else {
                continue;
            };
            drafts::upsert_stenogram(self.pool, &steno).await?;
            count += 1;
        }
        Ok(count)
    }

    async fn sync_drafts_year(&self, year: i32) -> Result<u64> {
        info!(year, "syncing drafts");
        let mut page = 0i64;
        let mut count = 0u64;

        loop {
            let data: Option<DraftPage> = self
                .client
                .get(
                    "/volumes/drafts",
                    &[
                        ("startDate", format!("{year}-01-01")),
                        ("endDate", format!("{year}-12-31")),
                        ("lang", "et".to_string()),
                        ("size", DRAFTS_PAGE_SIZE.to_string()),
                        ("page", page.to_string()),
                    ],
                )
                .await?;
            let Some(data) = data else {
                break;
            };
            if data.entries().is_empty() {
                break;
            }

            for entry in data.entries() {
                let Some(uuid) = entry.uuid.as_deref() else {
                    continue;
                };
                let detail: Option<DraftDetail> = self
                    .client
                    .get(
                        &format!("/volumes/drafts/{uuid}"),
                        &[("lang", "et".to_string())],
                    )
                    .await?;
                let Some(detail) = detail else {
                    continue;
                };
                let Some(draft) = parse_draft(&detail) else {
                    continue;
                };
                drafts::upsert_draft(self.pool, &draft).await?;
                for voting_uuid in &draft.related_voting_uuids {
                    votings::link_voting_to_draft(self.pool, voting_uuid, &draft.uuid).await?;
                }
                count += 1;
            }

            if page + 1 >= data.total_pages() {
                break;
            }
            page += 1;
        }
        Ok(count)
    }

    // --- Progress bookkeeping ---

    async fn db_size_ok(&self) -> bool {
        match db::database_size_bytes(self.pool).await {
            Ok(bytes) => {
                let limit = self.settings.db_size_limit_mb * 1024 * 1024;
                if bytes > limit {
                    warn!(bytes, limit, "database over size ceiling");
                    false
                } else {
                    true
                }
            }
            Err(e) => {
                // Size check failure should not abort a sync
                error!(error = %e, "database size check failed");
                true
            }
        }
    }

    async fn mark_running(&self, sync_type: &str) -> Result<()> {
        let mut state = progress::get_sync_progress(self.pool, sync_type).await?;
        state.status = "running".to_string();
        state.last_run_at = Some(Utc::now());
        state.error = None;
        progress::save_sync_progress(self.pool, &state).await
    }

    async fn mark_completed(&self, sync_type: &str, total: u64) -> Result<()> {
        let mut state = progress::get_sync_progress(self.pool, sync_type).await?;
        state.status = "completed".to_string();
        state.total_records = total as i64;
        progress::save_sync_progress(self.pool, &state).await
    }

    async fn mark_error(&self, sync_type: &str, err: &rkradar_common::Error) {
        error!(sync_type, error = %err, "sync failed");
        let state = progress::get_sync_progress(self.pool, sync_type).await;
        let mut state = match state {
            Ok(state) => state,
            Err(e) => {
                error!(sync_type, error = %e, "could not read progress row");
                return;
            }
        };
        state.status = "error".to_string();
        state.error = Some(err.to_string());
        if let Err(e) = progress::save_sync_progress(self.pool, &state).await {
            error!(sync_type, error = %e, "could not record sync error");
        }
    }
}

// --- Parsers ---

/// Display label matching the party-resolution policy: active party
/// factions first, active non-affiliated membership as fallback.
fn active_faction_name(factions: &[FactionDto]) -> Option<String> {
    let mut fallback = None;
    for faction in factions {
        let ended = faction
            .membership
            .as_ref()
            .map(|m| m.end_date.is_some())
            .unwrap_or(false);
        if ended {
            continue;
        }
        let Some(name) = faction.name.as_deref() else {
            continue;
        };
        if name.to_lowercase().contains("mittekuuluv") {
            fallback = Some(name.to_string());
        } else {
            return Some(name.to_string());
        }
    }
    fallback
}

fn parse_member(
    raw: &MemberListItem,
    committees: Vec<Committee>,
    convocations: Vec<i64>,
) -> Member {
    // Older payloads carry a single faction label, newer ones a list of
    // memberships with end dates.
    let (faction_name, party_code) = if raw.factions.is_empty() {
        let name = raw
            .faction
            .as_ref()
            .and_then(|f| f.label())
            .map(str::to_string);
        let code = resolve_party(name.as_deref()).to_string();
        (name, code)
    } else {
        let memberships: Vec<FactionMembership> = raw
            .factions
            .iter()
            .filter_map(|f| {
                Some(FactionMembership {
                    name: f.name.clone()?,
                    end_date: f.membership.as_ref().and_then(|m| m.end_date.clone()),
                })
            })
            .collect();
        let code = current_party_from_factions(&memberships).to_string();
        (active_faction_name(&raw.factions), code)
    };

    let photo_url = raw
        .photo
        .as_ref()
        .and_then(|p| p.links.as_ref())
        .and_then(|l| l.download.as_ref())
        .and_then(|d| d.href.as_deref())
        .map(|href| {
            if href.starts_with('/') {
                format!("https://api.riigikogu.ee{href}")
            } else {
                href.to_string()
            }
        });

    let full_name = raw
        .full_name
        .clone()
        .unwrap_or_else(|| format!("{} {}", raw.first_name, raw.last_name));

    Member {
        uuid: raw.uuid.clone().unwrap_or_default(),
        first_name: raw.first_name.clone(),
        last_name: raw.last_name.clone(),
        full_name,
        active: raw.active.unwrap_or(true),
        faction_name,
        party_code,
        photo_url,
        committees,
        convocations,
    }
}

fn parse_committees(detail: &MemberDetail) -> Vec<Committee> {
    let mut seen = std::collections::BTreeSet::new();
    let mut committees = Vec::new();
    for membership in &detail.memberships {
        for c in &membership.committees {
            let Some(name) = c.name.as_deref().filter(|n| !n.is_empty()) else {
                continue;
            };
            if !seen.insert(name.to_string()) {
                continue;
            }
            let (active, role) = match &c.membership {
                Some(m) => (
                    m.end_date.is_none(),
                    m.role.as_ref().and_then(|r| r.label()).map(str::to_string),
                ),
                None => (true, None),
            };
            committees.push(Committee {
                name: name.to_string(),
                role,
                active,
            });
        }
    }
    committees
}

fn parse_convocations(detail: &MemberDetail) -> Vec<i64> {
    let mut numbers: Vec<i64> = detail
        .memberships
        .iter()
        .filter_map(|m| m.membership_number)
        .collect();
    numbers.sort_unstable();
    numbers.dedup();
    numbers
}

fn mp_profile_from_member(member: &Member) -> MpProfile {
    let party = party_names(&member.party_code)
        .map(|(estonian, _)| estonian.to_string())
        .unwrap_or_else(|| member.party_code.clone());
    MpProfile {
        slug: make_slug(&member.first_name, &member.last_name),
        member_uuid: member.uuid.clone(),
        name: member.full_name.clone(),
        first_name: member.first_name.clone(),
        last_name: member.last_name.clone(),
        party,
        party_code: member.party_code.clone(),
        photo_url: member.photo_url.clone(),
        status: if member.active { "active" } else { "inactive" }.to_string(),
        is_current_member: member.active,
        committees: member.committees.clone(),
        convocations: member.convocations.clone(),
        stats: MpStats::default(),
    }
}

fn parse_voting(detail: &VotingDetail, sitting_date_time: Option<&str>) -> Option<Voting> {
    let uuid = detail.uuid.clone()?;

    let voters: Vec<Voter> = detail
        .voters
        .iter()
        .filter_map(|v| {
            let member_uuid = v.uuid.clone()?;
            let full_name = v
                .full_name
                .clone()
                .unwrap_or_else(|| format!("{} {}", v.first_name, v.last_name));
            Some(Voter {
                member_uuid,
                full_name,
                faction: v.faction.as_ref().and_then(|f| f.label()).map(str::to_string),
                decision: normalize_decision(v.decision.as_ref()),
            })
        })
        .collect();

    let voting_time = detail.start_date_time.clone();
    let session_date = sitting_date_time
        .or(voting_time.as_deref())
        .map(|t| t.chars().take(10).collect::<String>());

    let title = detail
        .description
        .clone()
        .or_else(|| detail.title.clone())
        .unwrap_or_default();

    Some(Voting {
        uuid,
        title,
        description: detail.description.clone(),
        voting_time,
        session_date,
        result: detail.result.as_ref().and_then(|r| r.label()).map(str::to_string),
        in_favor: detail.in_favor,
        against: detail.against,
        abstained: detail.abstained,
        absent: detail.absent,
        voters,
        related_draft_uuid: None,
        embedding: None,
    })
}

/// Flatten a verbatim record to its speeches. Sessions with no speeches
/// yield nothing.
fn parse_stenogram(session: &VerbatimDto, max_text_bytes: usize) -> Option<Stenogram> {
    let mut speakers = Vec::new();
    for item in &session.agenda_items {
        for event in &item.events {
            if event.kind.as_deref() != Some("SPEECH") {
                continue;
            }
            let Some(text) = event.text.as_deref().filter(|t| !t.is_empty()) else {
                continue;
            };
            speakers.push(Speaker {
                member_uuid: event.uuid.clone(),
                full_name: event.speaker.clone().unwrap_or_default(),
                text: truncate_utf8(text, max_text_bytes).to_string(),
                topic: item.title.clone(),
            });
        }
    }
    if speakers.is_empty() {
        return None;
    }

    let date = session.date.as_deref().unwrap_or("");
    let title = session.title.as_deref().unwrap_or("");
    let uuid: String = format!("{date}_{title}")
        .chars()
        .take(STENO_ID_MAX_CHARS)
        .collect();

    Some(Stenogram {
        uuid,
        session_date: session.date.clone(),
        session_type: session.title.clone(),
        speakers,
    })
}

fn parse_draft(detail: &DraftDetail) -> Option<Draft> {
    let uuid = detail.uuid.clone()?;
    let initiators = detail
        .initiators
        .iter()
        .filter_map(|i| i.label())
        .map(str::to_string)
        .collect();
    let related_voting_uuids = detail
        .related_votings
        .iter()
        .filter_map(|rv| rv.uuid())
        .map(str::to_string)
        .collect();

    Some(Draft {
        uuid,
        number: detail.number.clone().or_else(|| detail.mark.clone()),
        title: detail.title.clone().unwrap_or_default(),
        summary: detail.summary.clone(),
        initiators,
        submit_date: detail.submit_date.clone(),
        related_voting_uuids,
        embedding: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rkradar_common::domain::VoteDecision;
    use serde_json::json;

    fn progress_with(checkpoints: Vec<SyncCheckpoint>) -> SyncProgress {
        SyncProgress {
            checkpoints,
            ..SyncProgress::idle("votings")
        }
    }

    #[test]
    fn completed_prior_years_are_skipped() {
        let progress = progress_with(vec![
            SyncCheckpoint {
                year: 2023,
                completed: true,
                record_count: 400,
                last_offset: 0,
            },
            SyncCheckpoint {
                year: 2024,
                completed: false,
                record_count: 120,
                last_offset: 0,
            },
        ]);
        assert_eq!(years_to_scan(&progress, 2023, 2026), vec![2024, 2025, 2026]);
    }

    #[test]
    fn current_year_always_rescanned() {
        // Even a checkpoint claiming completion never skips the current year
        let progress = progress_with(vec![SyncCheckpoint {
            year: 2026,
            completed: true,
            record_count: 50,
            last_offset: 0,
        }]);
        assert_eq!(years_to_scan(&progress, 2025, 2026), vec![2025, 2026]);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_utf8("hääletus", 3), "hä");
        assert_eq!(truncate_utf8("abc", 10), "abc");
        assert_eq!(truncate_utf8("õõõ", 1), "");
    }

    #[test]
    fn member_faction_prefers_active_party_over_non_affiliated() {
        let raw: MemberListItem = serde_json::from_value(json!({
            "uuid": "m1",
            "firstName": "Jüri",
            "lastName": "Ratas",
            "factions": [
                {"name": "Fraktsiooni mittekuuluvad saadikud", "membership": {}},
                {"name": "Eesti Keskerakonna fraktsioon", "membership": {"endDate": "2023-04-01"}},
                {"name": "Isamaa fraktsioon", "membership": {}}
            ]
        }))
        .unwrap();
        let member = parse_member(&raw, vec![], vec![]);
        assert_eq!(member.faction_name.as_deref(), Some("Isamaa fraktsioon"));
        assert_eq!(member.party_code, "I");
    }

    #[test]
    fn member_faction_falls_back_to_old_format() {
        let raw: MemberListItem = serde_json::from_value(json!({
            "uuid": "m2",
            "firstName": "Mart",
            "lastName": "Helme",
            "faction": {"name": "Eesti Konservatiivse Rahvaerakonna fraktsioon"}
        }))
        .unwrap();
        let member = parse_member(&raw, vec![], vec![]);
        assert_eq!(member.party_code, "EKRE");
    }

    #[test]
    fn voting_parser_normalizes_decisions_and_factions() {
        let detail: VotingDetail = serde_json::from_value(json!({
            "uuid": "v1",
            "description": "Seaduseelnõu lõpphääletus",
            "startDateTime": "2024-05-15T14:03:00Z",
            "inFavor": 2,
            "voters": [
                {"uuid": "a", "fullName": "A A", "faction": {"name": "Eesti Reformierakonna fraktsioon"}, "decision": {"code": "POOLT"}},
                {"uuid": "b", "fullName": "B B", "faction": "Isamaa fraktsioon", "decision": "vastu"},
                {"uuid": "c", "fullName": "C C", "decision": null},
                {"fullName": "no uuid, dropped"}
            ]
        }))
        .unwrap();
        let voting = parse_voting(&detail, Some("2024-05-15T10:00:00Z")).unwrap();
        assert_eq!(voting.session_date.as_deref(), Some("2024-05-15"));
        assert_eq!(voting.title, "Seaduseelnõu lõpphääletus");
        assert_eq!(voting.voters.len(), 3);
        assert_eq!(voting.voters[0].decision, VoteDecision::For);
        assert_eq!(
            voting.voters[1].faction.as_deref(),
            Some("Isamaa fraktsioon")
        );
        assert_eq!(voting.voters[1].decision, VoteDecision::Against);
        assert_eq!(voting.voters[2].decision, VoteDecision::Absent);
    }

    #[test]
    fn stenogram_parser_skips_sessions_without_speeches() {
        let session: VerbatimDto = serde_json::from_value(json!({
            "date": "2024-03-11",
            "title": "Täiskogu istung",
            "agendaItems": [
                {"title": "Infotund", "events": [{"type": "VOTE"}]}
            ]
        }))
        .unwrap();
        assert!(parse_stenogram(&session, 1024).is_none());
    }

    #[test]
    fn stenogram_parser_truncates_long_speeches() {
        let session: VerbatimDto = serde_json::from_value(json!({
            "date": "2024-03-11",
            "title": "Täiskogu istung",
            "agendaItems": [
                {"title": "Arutelu", "events": [
                    {"type": "SPEECH", "speaker": "Kõneleja", "text": "pikk kõne tekst siin"}
                ]}
            ]
        }))
        .unwrap();
        let steno = parse_stenogram(&session, 9).unwrap();
        assert_eq!(steno.uuid, "2024-03-11_Täiskogu istung");
        assert_eq!(steno.speakers[0].text, "pikk kõne");
        assert_eq!(steno.speakers[0].topic.as_deref(), Some("Arutelu"));
    }

    #[test]
    fn draft_page_reads_embedded_or_flat_content() {
        let embedded: DraftPage = serde_json::from_value(json!({
            "_embedded": {"content": [{"uuid": "d1"}]},
            "page": {"totalPages": 3}
        }))
        .unwrap();
        assert_eq!(embedded.entries().len(), 1);
        assert_eq!(embedded.total_pages(), 3);

        let flat: DraftPage = serde_json::from_value(json!({
            "content": [{"uuid": "d2"}, {"uuid": "d3"}]
        }))
        .unwrap();
        assert_eq!(flat.entries().len(), 2);
        assert_eq!(flat.total_pages(), 1);
    }

    #[test]
    fn draft_parser_collects_initiators_and_related_votings() {
        let detail: DraftDetail = serde_json::from_value(json!({
            "uuid": "d1",
            "mark": "345 SE",
            "title": "Tulumaksuseaduse muutmise seadus",
            "initiators": ["Vabariigi Valitsus", {"name": "Rahanduskomisjon"}],
            "relatedVotings": ["v1", {"uuid": "v2"}]
        }))
        .unwrap();
        let draft = parse_draft(&detail).unwrap();
        assert_eq!(draft.number.as_deref(), Some("345 SE"));
        assert_eq!(draft.initiators, vec!["Vabariigi Valitsus", "Rahanduskomisjon"]);
        assert_eq!(draft.related_voting_uuids, vec!["v1", "v2"]);
    }
}

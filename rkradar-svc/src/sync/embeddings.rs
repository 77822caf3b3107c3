//! Text embeddings via a Voyage-style HTTP API.
//!
//! Voting titles/descriptions and draft titles/summaries are embedded in
//! batches after each sync. A failed batch is logged and skipped so one
//! bad payload never stalls the backfill.

use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{error, info};

use rkradar_common::config::Settings;
use rkradar_common::db::{drafts, votings};
use rkradar_common::{Error, Result};

pub const BATCH_SIZE: usize = 128;
const BACKFILL_LIMIT: i64 = 5000;
const REQUEST_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    input: &'a [String],
    model: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedItem>,
}

#[derive(Debug, Deserialize)]
struct EmbedItem {
    embedding: Vec<f32>,
}

pub struct EmbeddingClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl EmbeddingClient {
    pub fn new(settings: &Settings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::Upstream(format!("embedding client init: {e}")))?;
        Ok(Self {
            http,
            base_url: settings.embedding_api_base.trim_end_matches('/').to_string(),
            api_key: settings.embedding_api_key.clone(),
            model: settings.embedding_model.clone(),
        })
    }

    /// Embed up to [`BATCH_SIZE`] texts in one call. Blank inputs must be
    /// filtered out by the caller; the upstream rejects them.
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/embeddings", self.base_url);
        let response = self
            .http
            .post(&url)
            .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(&EmbedRequest {
                input: texts,
                model: &self.model,
            })
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("embedding request: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Upstream(format!("embedding API returned {status}")));
        }
        let body: EmbedResponse = response
            .json()
            .await
            .map_err(|e| Error::Upstream(format!("embedding response: {e}")))?;
        if body.data.len() != texts.len() {
            return Err(Error::Upstream(format!(
                "embedding count mismatch: sent {}, got {}",
                texts.len(),
                body.data.len()
            )));
        }
        Ok(body.data.into_iter().map(|item| item.embedding).collect())
    }

    /// Embed a single text, returning `None` when it is blank.
    pub async fn embed_one(&self, text: &str) -> Result<Option<Vec<f32>>> {
        if text.trim().is_empty() {
            return Ok(None);
        }
        let mut result = self.embed(&[text.to_string()]).await?;
        Ok(result.pop())
    }
}

/// What goes into the vector for each record type. The description is
/// appended only when it differs from the title.
pub fn voting_text(title: &str, description: Option<&str>) -> String {
    let mut parts = Vec::new();
    if !title.is_empty() {
        parts.push(title);
    }
    if let Some(desc) = description.filter(|d| !d.is_empty() && *d != title) {
        parts.push(desc);
    }
    parts.join(" ")
}

pub fn draft_text(title: &str, summary: Option<&str>) -> String {
    let mut parts = Vec::new();
    if !title.is_empty() {
        parts.push(title);
    }
    if let Some(summary) = summary.filter(|s| !s.is_empty()) {
        parts.push(summary);
    }
    parts.join(" ")
}

/// Backfill embeddings for votings and drafts that lack one. Returns the
/// number of records embedded.
pub async fn generate_embeddings(pool: &SqlitePool, settings: &Settings) -> Result<u64> {
    let client = EmbeddingClient::new(settings)?;
    let votings_done = embed_votings(pool, &client).await?;
    let drafts_done = embed_drafts(pool, &client).await?;
    info!(votings = votings_done, drafts = drafts_done, "embedding backfill complete");
    Ok(votings_done + drafts_done)
}

async fn embed_votings(pool: &SqlitePool, client: &EmbeddingClient) -> Result<u64> {
    let pending = votings::votings_missing_embedding(pool, BACKFILL_LIMIT).await?;
    let mut count = 0u64;
    for chunk in pending.chunks(BATCH_SIZE) {
        let batch: Vec<(&str, String)> = chunk
            .iter()
            .map(|v| (v.uuid.as_str(), voting_text(&v.title, v.description.as_deref())))
            .filter(|(_, text)| !text.trim().is_empty())
            .collect();
        if batch.is_empty() {
            continue;
        }
        let texts: Vec<String> = batch.iter().map(|(_, t)| t.clone()).collect();
        let embeddings = match client.embed(&texts).await {
            Ok(embeddings) => embeddings,
            Err(e) => {
                error!(error = %e, "voting embedding batch failed");
                continue;
            }
        };
        for ((uuid, _), embedding) in batch.iter().zip(&embeddings) {
            votings::set_voting_embedding(pool, uuid, embedding).await?;
            count += 1;
        }
        info!(count, total = pending.len(), "voting embeddings progress");
    }
    Ok(count)
}

async fn embed_drafts(pool: &SqlitePool, client: &EmbeddingClient) -> Result<u64> {
    let pending = drafts::drafts_missing_embedding(pool, BACKFILL_LIMIT).await?;
    let mut count = 0u64;
    for chunk in pending.chunks(BATCH_SIZE) {
        let batch: Vec<(&str, String)> = chunk
            .iter()
            .map(|d| (d.uuid.as_str(), draft_text(&d.title, d.summary.as_deref())))
            .filter(|(_, text)| !text.trim().is_empty())
            .collect();
        if batch.is_empty() {
            continue;
        }
        let texts: Vec<String> = batch.iter().map(|(_, t)| t.clone()).collect();
        let embeddings = match client.embed(&texts).await {
            Ok(embeddings) => embeddings,
            Err(e) => {
                error!(error = %e, "draft embedding batch failed");
                continue;
            }
        };
        for ((uuid, _), embedding) in batch.iter().zip(&embeddings) {
            drafts::set_draft_embedding(pool, uuid, embedding).await?;
            count += 1;
        }
        info!(count, total = pending.len(), "draft embeddings progress");
    }
    Ok(count)
}

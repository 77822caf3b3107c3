//! Configuration loading
//!
//! Settings resolve in priority order: environment variable, TOML config
//! file, compiled default. The TOML file lives at
//! `~/.config/rkradar/config.toml` (or `/etc/rkradar/config.toml`).

use serde::Deserialize;
use std::path::PathBuf;

use crate::Result;

/// Service settings, one instance shared through `AppState`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// SQLite database file path
    pub database_path: String,
    /// HTTP listen port
    pub port: u16,

    /// Base URL of the Riigikogu open data API
    pub riigikogu_api_base: String,
    /// Starting delay between upstream requests, in milliseconds
    pub rate_limit_ms: u64,
    /// First calendar year scanned by the year-partitioned syncs
    pub sync_epoch_year: i32,
    /// Pause ingestion once the database grows past this many megabytes
    pub db_size_limit_mb: u64,
    /// Per-speaker stenogram text cap in bytes
    pub stenogram_max_bytes: usize,

    /// Embedding provider endpoint (Voyage-style `/v1/embeddings`)
    pub embedding_api_base: String,
    /// Embedding provider API key; embeddings are skipped when empty
    pub embedding_api_key: String,
    /// Embedding model identifier
    pub embedding_model: String,

    /// Boundary date separating training data from held-out evaluation data
    pub model_cutoff_date: String,
    /// Prediction cache TTL in days
    pub prediction_cache_ttl_days: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_path: "rkradar.db".to_string(),
            port: 5780,
            riigikogu_api_base: "https://api.riigikogu.ee/api".to_string(),
            rate_limit_ms: 500,
            sync_epoch_year: 2023,
            db_size_limit_mb: 480,
            stenogram_max_bytes: 10_240,
            embedding_api_base: "https://api.voyageai.com/v1/embeddings".to_string(),
            embedding_api_key: String::new(),
            embedding_model: "voyage-multilingual-2".to_string(),
            model_cutoff_date: "2025-05-01".to_string(),
            prediction_cache_ttl_days: 7,
        }
    }
}

impl Settings {
    /// Load settings: TOML file first (if present), then environment
    /// variable overrides on top.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut settings = match config_path
            .map(PathBuf::from)
            .or_else(default_config_path)
        {
            Some(path) if path.exists() => {
                let text = std::fs::read_to_string(&path)?;
                toml::from_str(&text).map_err(|e| {
                    crate::Error::Config(format!("Failed to parse {}: {}", path.display(), e))
                })?
            }
            _ => Settings::default(),
        };
        settings.apply_env_overrides();
        Ok(settings)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("RKRADAR_DATABASE_PATH") {
            self.database_path = v;
        }
        if let Ok(v) = std::env::var("RKRADAR_PORT") {
            if let Ok(port) = v.parse() {
                self.port = port;
            }
        }
        if let Ok(v) = std::env::var("RKRADAR_API_BASE") {
            self.riigikogu_api_base = v;
        }
        if let Ok(v) = std::env::var("RKRADAR_EMBEDDING_API_KEY") {
            self.embedding_api_key = v;
        }
        if let Ok(v) = std::env::var("RKRADAR_MODEL_CUTOFF_DATE") {
            self.model_cutoff_date = v;
        }
        if let Ok(v) = std::env::var("RKRADAR_DB_SIZE_LIMIT_MB") {
            if let Ok(mb) = v.parse() {
                self.db_size_limit_mb = mb;
            }
        }
    }
}

/// Default config file location for the platform
fn default_config_path() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("rkradar").join("config.toml"));
    if let Some(path) = &user_config {
        if path.exists() {
            return user_config;
        }
    }
    let system_config = PathBuf::from("/etc/rkradar/config.toml");
    if system_config.exists() {
        return Some(system_config);
    }
    user_config
}

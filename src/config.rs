// src/config.rs
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::IngestError;

pub const ENV_CONFIG_PATH: &str = "INGEST_CONFIG_PATH";
pub const ENV_DATABASE_PATH: &str = "INGEST_DATABASE_PATH";
pub const ENV_RAW_DIR: &str = "INGEST_RAW_DIR";
pub const ENV_BATCH_ROWS: &str = "INGEST_BATCH_ROWS";
pub const ENV_LISTEN_ADDR: &str = "INGEST_LISTEN_ADDR";

const DEFAULT_TOML_PATH: &str = "config/ingest.toml";
const DEFAULT_JSON_PATH: &str = "config/ingest.json";

// Keeps one multi-row statement under SQLite's bound-parameter ceiling.
const MAX_BATCH_ROWS: usize = 3000;
const MAX_HISTORY_CAP: usize = 10_000;

fn default_database_path() -> PathBuf {
    PathBuf::from("data/youtube.db")
}
fn default_raw_dir() -> PathBuf {
    PathBuf::from("data/raw")
}
fn default_categories_file() -> String {
    "GB_category_id.json".to_string()
}
fn default_videos_file() -> String {
    "GBvideos.csv".to_string()
}
fn default_processed_path() -> PathBuf {
    PathBuf::from("data/processed/GB_videos_cleaned.csv")
}
fn default_batch_rows() -> usize {
    500
}
fn default_busy_timeout_ms() -> u64 {
    5_000
}
fn default_schedule_interval_secs() -> u64 {
    24 * 3600
}
fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}
fn default_history_cap() -> usize {
    100
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    #[serde(default = "default_raw_dir")]
    pub raw_dir: PathBuf,
    #[serde(default = "default_categories_file")]
    pub categories_file: String,
    #[serde(default = "default_videos_file")]
    pub videos_file: String,
    #[serde(default = "default_processed_path")]
    pub processed_path: PathBuf,
    /// Rows per multi-row upsert statement.
    #[serde(default = "default_batch_rows")]
    pub batch_rows: usize,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    #[serde(default = "default_schedule_interval_secs")]
    pub schedule_interval_secs: u64,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_history_cap")]
    pub history_cap: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            raw_dir: default_raw_dir(),
            categories_file: default_categories_file(),
            videos_file: default_videos_file(),
            processed_path: default_processed_path(),
            batch_rows: default_batch_rows(),
            busy_timeout_ms: default_busy_timeout_ms(),
            schedule_interval_secs: default_schedule_interval_secs(),
            listen_addr: default_listen_addr(),
            history_cap: default_history_cap(),
        }
    }
}

impl IngestConfig {
    /// Load from an explicit path. Supports TOML or JSON formats.
    pub fn load_from(path: &Path) -> Result<Self, IngestError> {
        let content = fs::read_to_string(path)
            .map_err(|e| IngestError::Config(format!("reading {}: {e}", path.display())))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let cfg = parse_config(&content, ext.as_str())
            .map_err(|e| IngestError::Config(format!("{}: {e}", path.display())))?;
        Ok(cfg.sanitized())
    }

    /// Load using env var + fallbacks, then apply env overrides:
    /// 1) $INGEST_CONFIG_PATH
    /// 2) config/ingest.toml
    /// 3) config/ingest.json
    /// 4) built-in defaults
    pub fn load_default() -> Result<Self, IngestError> {
        let base = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(IngestError::Config(format!(
                    "{ENV_CONFIG_PATH} points to non-existent path {}",
                    pb.display()
                )));
            }
            Self::load_from(&pb)?
        } else if Path::new(DEFAULT_TOML_PATH).exists() {
            Self::load_from(Path::new(DEFAULT_TOML_PATH))?
        } else if Path::new(DEFAULT_JSON_PATH).exists() {
            Self::load_from(Path::new(DEFAULT_JSON_PATH))?
        } else {
            Self::default()
        };
        base.with_env_overrides()
    }

    pub fn with_env_overrides(mut self) -> Result<Self, IngestError> {
        if let Ok(v) = std::env::var(ENV_DATABASE_PATH) {
            self.database_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var(ENV_RAW_DIR) {
            self.raw_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var(ENV_BATCH_ROWS) {
            self.batch_rows = v
                .trim()
                .parse()
                .map_err(|_| IngestError::Config(format!("{ENV_BATCH_ROWS}={v:?} is not a number")))?;
        }
        if let Ok(v) = std::env::var(ENV_LISTEN_ADDR) {
            self.listen_addr = v;
        }
        Ok(self.sanitized())
    }

    pub fn categories_path(&self) -> PathBuf {
        self.raw_dir.join(&self.categories_file)
    }

    pub fn videos_path(&self) -> PathBuf {
        self.raw_dir.join(&self.videos_file)
    }

    fn sanitized(mut self) -> Self {
        self.batch_rows = self.batch_rows.clamp(1, MAX_BATCH_ROWS);
        self.schedule_interval_secs = self.schedule_interval_secs.max(1);
        self.history_cap = self.history_cap.clamp(1, MAX_HISTORY_CAP);
        self
    }
}

fn parse_config(s: &str, hint_ext: &str) -> anyhow::Result<IngestConfig> {
    if hint_ext == "json" {
        return Ok(serde_json::from_str(s)?);
    }
    match toml::from_str::<IngestConfig>(s) {
        Ok(cfg) => Ok(cfg),
        Err(toml_err) => {
            // Extension-less files may still be JSON.
            if hint_ext != "toml" {
                if let Ok(cfg) = serde_json::from_str(s) {
                    return Ok(cfg);
                }
            }
            Err(toml_err.into())
        }
    }
}

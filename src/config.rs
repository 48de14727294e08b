//! Configuration for the ingestion pipeline
//!
//! This module provides an explicit configuration struct passed into the
//! orchestrator at construction: subject range, batch size, worker-pool
//! size, backend selection, and retry policy. Values come from defaults,
//! an optional JSON file, and an environment overlay, in that order.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::validate::ValidationProfile;

/// Which warehouse backend the factory should construct
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarehouseKind {
    /// Embedded file-backed analytical store (single writer)
    Embedded,
    /// Remote cloud warehouse over HTTP bulk upload
    Remote,
}

impl Default for WarehouseKind {
    fn default() -> Self {
        WarehouseKind::Embedded
    }
}

impl fmt::Display for WarehouseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WarehouseKind::Embedded => write!(f, "embedded"),
            WarehouseKind::Remote => write!(f, "remote"),
        }
    }
}

impl FromStr for WarehouseKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "embedded" => Ok(WarehouseKind::Embedded),
            "remote" => Ok(WarehouseKind::Remote),
            other => Err(format!("unsupported warehouse kind: {}", other)),
        }
    }
}

/// Complete pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// First subject id to process (inclusive)
    pub starting_subject: u32,
    /// Last subject id to process (inclusive)
    pub ending_subject: u32,
    /// Epoch records per streamed batch
    pub batch_size: usize,
    /// Parallel extraction workers
    pub worker_count: usize,
    /// Epoch duration in seconds
    pub epoch_length_secs: f64,
    /// Extraction retry attempts after the first failure
    pub extract_retries: u32,
    /// Fixed backoff between extraction retries, seconds
    pub retry_backoff_secs: u64,
    /// Data contract revision to enforce
    pub validation_profile: ValidationProfile,
    /// Backend selection
    pub warehouse: WarehouseKind,
    /// Embedded store database file
    pub db_path: PathBuf,
    /// Directory for per-subject staging part files
    pub staging_dir: PathBuf,
    /// Directory holding raw PSG/hypnogram pairs
    pub data_dir: PathBuf,
    /// Remote warehouse gateway base URL
    pub remote_url: Option<String>,
    /// Remote warehouse bearer token
    pub remote_token: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            starting_subject: 0,
            ending_subject: 10,
            batch_size: 100,
            worker_count: 4,
            epoch_length_secs: 30.0,
            extract_retries: 2,
            retry_backoff_secs: 10,
            validation_profile: ValidationProfile::default(),
            warehouse: WarehouseKind::default(),
            db_path: PathBuf::from("data/sleep_data.db"),
            staging_dir: PathBuf::from("data/staging"),
            data_dir: PathBuf::from("data/raw"),
            remote_url: None,
            remote_token: None,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a JSON file, falling back to defaults
    /// if the file is missing or malformed.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Overlay recognized `SLEEP_ETL_*` environment variables onto `self`.
    ///
    /// Unparseable values are logged and ignored rather than failing the
    /// run.
    pub fn overlay_env(mut self) -> Self {
        overlay(&mut self.starting_subject, "SLEEP_ETL_STARTING_SUBJECT");
        overlay(&mut self.ending_subject, "SLEEP_ETL_ENDING_SUBJECT");
        overlay(&mut self.batch_size, "SLEEP_ETL_BATCH_SIZE");
        overlay(&mut self.worker_count, "SLEEP_ETL_WORKERS");
        overlay(&mut self.epoch_length_secs, "SLEEP_ETL_EPOCH_LENGTH");
        overlay(&mut self.extract_retries, "SLEEP_ETL_EXTRACT_RETRIES");
        overlay(&mut self.retry_backoff_secs, "SLEEP_ETL_RETRY_BACKOFF");
        overlay(&mut self.validation_profile, "SLEEP_ETL_VALIDATION_PROFILE");
        overlay(&mut self.warehouse, "SLEEP_ETL_WAREHOUSE");

        if let Ok(value) = std::env::var("SLEEP_ETL_DB_PATH") {
            self.db_path = PathBuf::from(value);
        }
        if let Ok(value) = std::env::var("SLEEP_ETL_STAGING_DIR") {
            self.staging_dir = PathBuf::from(value);
        }
        if let Ok(value) = std::env::var("SLEEP_ETL_DATA_DIR") {
            self.data_dir = PathBuf::from(value);
        }
        if let Ok(value) = std::env::var("SLEEP_ETL_REMOTE_URL") {
            self.remote_url = Some(value);
        }
        if let Ok(value) = std::env::var("SLEEP_ETL_REMOTE_TOKEN") {
            self.remote_token = Some(value);
        }
        self
    }

    /// The inclusive subject id range as a deterministic iteration order
    pub fn subjects(&self) -> Vec<u32> {
        if self.ending_subject < self.starting_subject {
            return Vec::new();
        }
        (self.starting_subject..=self.ending_subject).collect()
    }
}

fn overlay<T>(slot: &mut T, key: &str)
where
    T: FromStr,
    T::Err: fmt::Display,
{
    if let Ok(raw) = std::env::var(key) {
        match raw.parse::<T>() {
            Ok(value) => *slot = value,
            Err(err) => {
                log::warn!("[Config] Ignoring {}={:?}: {}", key, raw, err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_documented_values() {
        let config = PipelineConfig::default();
        assert_eq!(config.starting_subject, 0);
        assert_eq!(config.ending_subject, 10);
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.worker_count, 4);
        assert_eq!(config.extract_retries, 2);
        assert_eq!(config.retry_backoff_secs, 10);
        assert_eq!(config.warehouse, WarehouseKind::Embedded);
        assert_eq!(config.validation_profile, ValidationProfile::Permissive);
    }

    #[test]
    fn subjects_range_is_inclusive_and_ordered() {
        let mut config = PipelineConfig::default();
        config.starting_subject = 3;
        config.ending_subject = 6;
        assert_eq!(config.subjects(), vec![3, 4, 5, 6]);

        config.ending_subject = 2;
        assert!(config.subjects().is_empty());
    }

    #[test]
    fn json_roundtrip() {
        let config = PipelineConfig::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.batch_size, config.batch_size);
        assert_eq!(parsed.warehouse, config.warehouse);
        assert_eq!(parsed.db_path, config.db_path);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let parsed: PipelineConfig =
            serde_json::from_str(r#"{"batch_size": 25, "warehouse": "remote"}"#).unwrap();
        assert_eq!(parsed.batch_size, 25);
        assert_eq!(parsed.warehouse, WarehouseKind::Remote);
        assert_eq!(parsed.worker_count, 4);
    }

    #[test]
    fn warehouse_kind_parses_from_str() {
        assert_eq!("embedded".parse::<WarehouseKind>().unwrap(), WarehouseKind::Embedded);
        assert_eq!("Remote".parse::<WarehouseKind>().unwrap(), WarehouseKind::Remote);
        assert!("duckdb".parse::<WarehouseKind>().is_err());
    }
}

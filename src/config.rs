//! Service configuration read from `INSPECT_*` environment variables.

use std::env;
use std::fs;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::ingest::{IngestConfig, DEFAULT_CHUNK_SIZE};
use crate::training::TrainingParams;

pub const DATASET_FILE: &str = "dataset.parquet";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 1024 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub addr: SocketAddr,
    pub data_dir: PathBuf,
    pub model_dir: PathBuf,
    pub chunk_size: usize,
    pub max_upload_bytes: usize,
    pub training: TrainingParams,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8000)),
            data_dir: PathBuf::from("data"),
            model_dir: PathBuf::from("model"),
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            training: TrainingParams::default(),
        }
    }
}

impl ServiceConfig {
    /// Config rooted at `dir`, with data and model subdirectories.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            data_dir: dir.join("data"),
            model_dir: dir.join("model"),
            ..Self::default()
        }
    }

    pub fn dataset_path(&self) -> PathBuf {
        self.data_dir.join(DATASET_FILE)
    }

    pub fn ingest_config(&self) -> IngestConfig {
        IngestConfig {
            chunk_size: self.chunk_size,
        }
    }

    pub fn ensure_dirs(&self) -> io::Result<()> {
        fs::create_dir_all(&self.data_dir)?;
        fs::create_dir_all(&self.model_dir)
    }
}

/// Unset, empty or unparsable variables keep their defaults.
pub fn service_config_from_env() -> ServiceConfig {
    let mut config = ServiceConfig::default();

    if let Some(addr) = env_value("INSPECT_ADDR").and_then(|raw| raw.parse().ok()) {
        config.addr = addr;
    }
    if let Some(dir) = env_value("INSPECT_DATA_DIR") {
        config.data_dir = PathBuf::from(dir);
    }
    if let Some(dir) = env_value("INSPECT_MODEL_DIR") {
        config.model_dir = PathBuf::from(dir);
    }
    if let Some(chunk_size) = env_value("INSPECT_CHUNK_SIZE").and_then(|raw| parse_positive(&raw)) {
        config.chunk_size = chunk_size;
    }
    if let Some(limit) = env_value("INSPECT_MAX_UPLOAD_BYTES").and_then(|raw| parse_positive(&raw)) {
        config.max_upload_bytes = limit;
    }
    if let Some(rounds) = env_value("INSPECT_TRAIN_ROUNDS").and_then(|raw| parse_positive(&raw)) {
        config.training.rounds = rounds;
    }
    if let Some(rate) = env_value("INSPECT_TRAIN_LEARNING_RATE")
        .and_then(|raw| raw.parse::<f32>().ok())
        .filter(|rate| *rate > 0.0 && *rate <= 1.0)
    {
        config.training.learning_rate = rate;
    }

    config
}

fn env_value(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
}

fn parse_positive(raw: &str) -> Option<usize> {
    raw.replace('_', "").parse::<usize>().ok().filter(|v| *v > 0)
}

//! Serving state: the latest trained model and its on-disk artifacts.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use chrono::SecondsFormat;
use gbdt::gradient_boost::GBDT;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{error, info};

use crate::metrics::{round_to, DEFAULT_THRESHOLD};
use crate::training::{
    predict_proba, sort_importance, FeatureImportance, TrainingMetrics, TrainingOutcome,
};

pub const MODEL_FILE: &str = "model.json";
pub const METADATA_FILE: &str = "model_meta.json";

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Model not trained or loaded. Please train a model first.")]
    ModelUnavailable,
    #[error("invalid value for feature '{feature}': {value}")]
    InvalidFeatureValue { feature: String, value: String },
    #[error("model artifact error: {0}")]
    Model(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("metadata error: {0}")]
    Json(#[from] serde_json::Error),
}

fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelMetadata {
    pub model_id: String,
    pub feature_columns: Vec<String>,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default)]
    pub feature_importance: Vec<FeatureImportance>,
    #[serde(default)]
    pub trained_at: Option<String>,
    #[serde(default)]
    pub metrics: Option<TrainingMetrics>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Pass,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub prediction: Verdict,
    pub confidence: f64,
}

impl Prediction {
    pub fn from_probability(probability: f64, threshold: f64) -> Self {
        let prediction = if probability >= threshold {
            Verdict::Pass
        } else {
            Verdict::Fail
        };
        Self {
            prediction,
            confidence: round_to(probability.max(1.0 - probability) * 100.0, 2),
        }
    }
}

pub struct LoadedModel {
    pub model: GBDT,
    pub meta: ModelMetadata,
}

impl LoadedModel {
    /// Reindexes each object onto the model's feature columns and scores them
    /// in one pass.
    pub fn predict_rows(&self, rows: &[&Map<String, Value>]) -> Result<Vec<Prediction>, RegistryError> {
        let matrix = rows
            .iter()
            .map(|row| feature_vector(&self.meta.feature_columns, row))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(predict_proba(&self.model, &matrix)
            .into_iter()
            .map(|p| Prediction::from_probability(p, self.meta.threshold))
            .collect())
    }
}

/// Missing keys and nulls become 0, booleans 1/0, numeric strings are parsed.
pub fn feature_vector(features: &[String], row: &Map<String, Value>) -> Result<Vec<f64>, RegistryError> {
    features
        .iter()
        .map(|name| match row.get(name) {
            None | Some(Value::Null) => Ok(0.0),
            Some(Value::Bool(flag)) => Ok(if *flag { 1.0 } else { 0.0 }),
            Some(Value::Number(n)) => Ok(n.as_f64().unwrap_or(0.0)),
            Some(Value::String(raw)) => {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    return Ok(0.0);
                }
                trimmed
                    .parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| RegistryError::InvalidFeatureValue {
                        feature: name.clone(),
                        value: raw.clone(),
                    })
            }
            Some(other) => Err(RegistryError::InvalidFeatureValue {
                feature: name.clone(),
                value: other.to_string(),
            }),
        })
        .collect()
}

#[derive(Clone)]
pub struct ModelRegistry {
    model_dir: PathBuf,
    current: Arc<RwLock<Option<Arc<LoadedModel>>>>,
}

impl ModelRegistry {
    pub fn empty(model_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_dir: model_dir.into(),
            current: Arc::new(RwLock::new(None)),
        }
    }

    /// Startup load. Missing artifacts leave the registry empty; corrupt ones
    /// are logged and also leave it empty.
    pub fn load_from_dir(model_dir: impl Into<PathBuf>) -> Self {
        let registry = Self::empty(model_dir);
        match read_artifacts(&registry.model_dir) {
            Ok(Some(loaded)) => {
                info!(
                    component = "registry",
                    event = "model.loaded",
                    model_id = %loaded.meta.model_id,
                    feature_count = loaded.meta.feature_columns.len(),
                    threshold = loaded.meta.threshold
                );
                registry.swap(Arc::new(loaded));
            }
            Ok(None) => {
                info!(
                    component = "registry",
                    event = "model.absent",
                    model_dir = %registry.model_dir.display()
                );
            }
            Err(err) => {
                error!(
                    component = "registry",
                    event = "model.load_failed",
                    model_dir = %registry.model_dir.display(),
                    error = %err
                );
            }
        }
        registry
    }

    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    pub fn current(&self) -> Option<Arc<LoadedModel>> {
        self.current
            .read()
            .expect("model registry lock should not be poisoned")
            .clone()
    }

    pub fn require(&self) -> Result<Arc<LoadedModel>, RegistryError> {
        self.current().ok_or(RegistryError::ModelUnavailable)
    }

    /// Persists the trained model and makes it the serving model.
    pub fn install(&self, outcome: TrainingOutcome) -> Result<Arc<LoadedModel>, RegistryError> {
        let meta = ModelMetadata {
            model_id: outcome.model_id,
            feature_columns: outcome.feature_columns,
            threshold: outcome.threshold,
            feature_importance: outcome.feature_importance,
            trained_at: Some(
                outcome
                    .trained_at
                    .to_rfc3339_opts(SecondsFormat::Secs, true),
            ),
            metrics: Some(outcome.metrics),
        };
        write_artifacts(&self.model_dir, &outcome.model, &meta)?;

        let loaded = Arc::new(LoadedModel {
            model: outcome.model,
            meta,
        });
        self.swap(loaded.clone());
        info!(
            component = "registry",
            event = "model.installed",
            model_id = %loaded.meta.model_id,
            threshold = loaded.meta.threshold
        );
        Ok(loaded)
    }

    pub fn predict(&self, row: &Map<String, Value>) -> Result<Prediction, RegistryError> {
        let model = self.require()?;
        model
            .predict_rows(&[row])?
            .into_iter()
            .next()
            .ok_or_else(|| RegistryError::Model("model returned no prediction".to_string()))
    }

    pub fn feature_importance(&self, top: usize) -> Result<Vec<FeatureImportance>, RegistryError> {
        let model = self.require()?;
        let mut ranked = model.meta.feature_importance.clone();
        sort_importance(&mut ranked);
        ranked.truncate(top);
        Ok(ranked)
    }

    fn swap(&self, loaded: Arc<LoadedModel>) {
        let mut guard = self
            .current
            .write()
            .expect("model registry lock should not be poisoned");
        *guard = Some(loaded);
    }
}

fn read_artifacts(model_dir: &Path) -> Result<Option<LoadedModel>, RegistryError> {
    let model_path = model_dir.join(MODEL_FILE);
    let meta_path = model_dir.join(METADATA_FILE);
    if !model_path.is_file() || !meta_path.is_file() {
        return Ok(None);
    }

    let meta: ModelMetadata = serde_json::from_slice(&fs::read(&meta_path)?)?;
    let model = GBDT::load_model(&path_str(&model_path)?)
        .map_err(|err| RegistryError::Model(err.to_string()))?;
    Ok(Some(LoadedModel { model, meta }))
}

fn write_artifacts(model_dir: &Path, model: &GBDT, meta: &ModelMetadata) -> Result<(), RegistryError> {
    fs::create_dir_all(model_dir)?;

    let model_path = model_dir.join(MODEL_FILE);
    let model_tmp = model_dir.join(format!("{MODEL_FILE}.tmp"));
    model
        .save_model(&path_str(&model_tmp)?)
        .map_err(|err| RegistryError::Model(err.to_string()))?;
    fs::rename(&model_tmp, &model_path)?;

    let bytes = serde_json::to_vec_pretty(meta)?;
    write_atomic(&model_dir.join(METADATA_FILE), &bytes)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), RegistryError> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .ok_or_else(|| RegistryError::Model(format!("invalid artifact path: {}", path.display())))?;
    let tmp_path = path.with_file_name(format!("{file_name}.tmp"));

    {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }

    fs::rename(tmp_path, path)?;
    Ok(())
}

fn path_str(path: &Path) -> Result<String, RegistryError> {
    path.to_str()
        .map(str::to_string)
        .ok_or_else(|| RegistryError::Model(format!("non UTF-8 artifact path: {}", path.display())))
}

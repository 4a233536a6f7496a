//! Training window extraction, gradient boosting fit, threshold calibration
//! and evaluation.

use std::fmt;

use arrow::array::{Array, AsArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Float64Type, Schema};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, SecondsFormat, Utc};
use gbdt::config::Config;
use gbdt::decision_tree::{Data, DataVec, ValueType};
use gbdt::gradient_boost::GBDT;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::ingest::{Outcome, LABEL_COLUMN};
use crate::metrics::{
    best_f1_threshold, log_loss, roc_auc, round_to, ConfusionCounts, DEFAULT_THRESHOLD,
};
use crate::store::{DatasetStore, StoreError};
use crate::timeline::{TimeRange, TIMESTAMP_COLUMN};

pub const IMPORTANCE_SAMPLE_ROWS: usize = 5_000;
const LOSS_NAME: &str = "LogLikelyhood";

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("invalid training params: {0}")]
    InvalidParams(String),
    #[error("No numeric feature columns found in the dataset.")]
    NoFeatureColumns,
    #[error("No data in the {0} window.")]
    EmptyWindow(&'static str),
    #[error("column '{0}' is missing from the scanned batch")]
    MissingColumn(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("arrow error: {0}")]
    Arrow(#[from] ArrowError),
    #[error("fitted model is missing '{0}' in its serialized form")]
    ModelLayout(&'static str),
    #[error("model serialization error: {0}")]
    ModelJson(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingParams {
    pub rounds: usize,
    pub learning_rate: f32,
    pub max_depth: u32,
    pub data_sample_ratio: f64,
    pub feature_sample_ratio: f64,
    pub min_leaf_size: usize,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            rounds: 150,
            learning_rate: 0.05,
            max_depth: 5,
            data_sample_ratio: 0.8,
            feature_sample_ratio: 0.8,
            min_leaf_size: 1,
        }
    }
}

impl TrainingParams {
    pub fn validate(&self) -> Result<(), TrainingError> {
        if self.rounds == 0 {
            return Err(TrainingError::InvalidParams(
                "rounds must be > 0".to_string(),
            ));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return Err(TrainingError::InvalidParams(
                "learning_rate must be in (0, 1]".to_string(),
            ));
        }
        if self.max_depth == 0 {
            return Err(TrainingError::InvalidParams(
                "max_depth must be > 0".to_string(),
            ));
        }
        for (name, ratio) in [
            ("data_sample_ratio", self.data_sample_ratio),
            ("feature_sample_ratio", self.feature_sample_ratio),
        ] {
            if !(ratio > 0.0 && ratio <= 1.0) {
                return Err(TrainingError::InvalidParams(format!(
                    "{name} must be in (0, 1]"
                )));
            }
        }
        Ok(())
    }

    fn gbdt_config(&self, feature_count: usize) -> Config {
        let mut cfg = Config::new();
        cfg.set_feature_size(feature_count);
        cfg.set_max_depth(self.max_depth);
        cfg.set_iterations(self.rounds);
        cfg.set_shrinkage(self.learning_rate);
        cfg.set_loss(LOSS_NAME);
        cfg.set_data_sample_ratio(self.data_sample_ratio);
        cfg.set_feature_sample_ratio(self.feature_sample_ratio);
        cfg.set_min_leaf_size(self.min_leaf_size);
        cfg
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingHistoryEntry {
    pub epoch: usize,
    pub train_loss: f64,
    pub train_accuracy: f64,
}

/// Test-window evaluation at the calibrated threshold. Scores are percentages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingMetrics {
    pub accuracy: f64,
    pub balanced_accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub roc_auc: f64,
    pub confusion_matrix: [[u64; 2]; 2],
    pub threshold: f64,
    pub training_history: Vec<TrainingHistoryEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureImportance {
    pub feature_name: String,
    pub importance_score: f64,
}

pub struct TrainingOutcome {
    pub model: GBDT,
    pub model_id: String,
    pub feature_columns: Vec<String>,
    pub threshold: f64,
    pub metrics: TrainingMetrics,
    pub feature_importance: Vec<FeatureImportance>,
    pub trained_at: DateTime<Utc>,
    pub train_rows: usize,
    pub test_rows: usize,
}

impl fmt::Debug for TrainingOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrainingOutcome")
            .field("model_id", &self.model_id)
            .field("feature_columns", &self.feature_columns)
            .field("threshold", &self.threshold)
            .field("metrics", &self.metrics)
            .field("train_rows", &self.train_rows)
            .field("test_rows", &self.test_rows)
            .finish_non_exhaustive()
    }
}

/// Numeric columns other than the label, the synthetic timestamp and the
/// leading identifier column, in file order.
pub fn feature_columns(schema: &Schema) -> Vec<String> {
    schema
        .fields()
        .iter()
        .skip(1)
        .filter(|field| field.name() != LABEL_COLUMN && field.name() != TIMESTAMP_COLUMN)
        .filter(|field| is_numeric(field.data_type()))
        .map(|field| field.name().clone())
        .collect()
}

fn is_numeric(dt: &DataType) -> bool {
    matches!(
        dt,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float16
            | DataType::Float32
            | DataType::Float64
    )
}

/// Dense feature matrix plus labels (`true` = pass) for one window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabeledWindow {
    pub features: Vec<Vec<f64>>,
    pub labels: Vec<bool>,
}

impl LabeledWindow {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn positives(&self) -> usize {
        self.labels.iter().filter(|l| **l).count()
    }
}

pub fn load_window(
    store: &DatasetStore,
    range: &TimeRange,
    features: &[String],
) -> Result<LabeledWindow, TrainingError> {
    let mut columns = features.to_vec();
    columns.push(LABEL_COLUMN.to_string());
    let batches = store.read_range(range, Some(&columns))?;

    let mut window = LabeledWindow::default();
    for batch in &batches {
        append_batch(&mut window, batch, features)?;
    }
    Ok(window)
}

fn append_batch(
    window: &mut LabeledWindow,
    batch: &RecordBatch,
    features: &[String],
) -> Result<(), TrainingError> {
    let label_col = batch
        .column_by_name(LABEL_COLUMN)
        .ok_or_else(|| TrainingError::MissingColumn(LABEL_COLUMN.to_string()))?;
    let labels = cast(label_col, &DataType::Utf8)?;
    let labels = labels.as_string::<i32>();

    let mut values = Vec::with_capacity(features.len());
    for name in features {
        let col = batch
            .column_by_name(name)
            .ok_or_else(|| TrainingError::MissingColumn(name.clone()))?;
        values.push(cast(col, &DataType::Float64)?);
    }
    let values: Vec<_> = values
        .iter()
        .map(|col| col.as_primitive::<Float64Type>())
        .collect();

    for row in 0..batch.num_rows() {
        if labels.is_null(row) {
            continue;
        }
        let Some(outcome) = Outcome::parse(labels.value(row)) else {
            continue;
        };
        let features = values
            .iter()
            .map(|col| {
                if col.is_null(row) {
                    0.0
                } else {
                    let v = col.value(row);
                    if v.is_finite() {
                        v
                    } else {
                        0.0
                    }
                }
            })
            .collect();
        window.features.push(features);
        window.labels.push(outcome.is_pass());
    }
    Ok(())
}

/// Positive rows get `neg / pos` so both classes carry equal total weight.
pub fn class_weights(labels: &[bool]) -> Vec<f64> {
    let positives = labels.iter().filter(|l| **l).count();
    let negatives = labels.len() - positives;
    let scale_pos_weight = if positives == 0 {
        1.0
    } else {
        negatives as f64 / positives as f64
    };
    labels
        .iter()
        .map(|label| if *label { scale_pos_weight } else { 1.0 })
        .collect()
}

fn training_data(window: &LabeledWindow, weights: &[f64]) -> DataVec {
    window
        .features
        .iter()
        .zip(&window.labels)
        .zip(weights)
        .map(|((row, label), weight)| {
            let target: ValueType = if *label { 1.0 } else { -1.0 };
            Data::new_training_data(to_values(row), *weight as ValueType, target, None)
        })
        .collect()
}

pub(crate) fn test_data(rows: &[Vec<f64>]) -> DataVec {
    rows.iter()
        .map(|row| Data::new_test_data(to_values(row), None))
        .collect()
}

fn to_values(row: &[f64]) -> Vec<ValueType> {
    row.iter().map(|v| *v as ValueType).collect()
}

/// Pass probabilities for `rows`.
pub fn predict_proba(model: &GBDT, rows: &[Vec<f64>]) -> Vec<f64> {
    if rows.is_empty() {
        return Vec::new();
    }
    model
        .predict(&test_data(rows))
        .into_iter()
        .map(f64::from)
        .collect()
}

fn margin_to_probability(margin: f64) -> f64 {
    1.0 / (1.0 + (-2.0 * margin).exp())
}

pub fn train_on_ranges(
    store: &DatasetStore,
    train_range: &TimeRange,
    test_range: &TimeRange,
    params: &TrainingParams,
) -> Result<TrainingOutcome, TrainingError> {
    params.validate()?;

    let features = feature_columns(&store.schema());
    if features.is_empty() {
        return Err(TrainingError::NoFeatureColumns);
    }

    let train = load_window(store, train_range, &features)?;
    if train.is_empty() {
        return Err(TrainingError::EmptyWindow("training"));
    }
    let test = load_window(store, test_range, &features)?;
    if test.is_empty() {
        return Err(TrainingError::EmptyWindow("testing"));
    }

    info!(
        component = "training",
        event = "train.start",
        train_rows = train.len(),
        train_positives = train.positives(),
        test_rows = test.len(),
        test_positives = test.positives(),
        feature_count = features.len(),
        rounds = params.rounds
    );

    train_on_windows(&train, &test, features, params)
}

/// Fits on `train`, calibrates and evaluates on `test`.
pub fn train_on_windows(
    train: &LabeledWindow,
    test: &LabeledWindow,
    features: Vec<String>,
    params: &TrainingParams,
) -> Result<TrainingOutcome, TrainingError> {
    params.validate()?;
    if train.is_empty() {
        return Err(TrainingError::EmptyWindow("training"));
    }
    if test.is_empty() {
        return Err(TrainingError::EmptyWindow("testing"));
    }

    let weights = class_weights(&train.labels);
    let mut train_data = training_data(train, &weights);
    let mut model = GBDT::new(&params.gbdt_config(features.len()));
    model.fit(&mut train_data);

    let history = training_history(&model, train, &weights)?;

    let probabilities = predict_proba(&model, &test.features);
    let choice = best_f1_threshold(&test.labels, &probabilities);
    info!(
        component = "training",
        event = "train.threshold",
        threshold = choice.threshold,
        f1 = choice.f1
    );

    let counts = ConfusionCounts::at_threshold(&test.labels, &probabilities, choice.threshold);
    let auc = match roc_auc(&test.labels, &probabilities) {
        Some(auc) => auc,
        None => {
            warn!(
                component = "training",
                event = "train.roc_auc.single_class",
                test_rows = test.len(),
                "test window holds a single class; reporting ROC-AUC as 50"
            );
            0.5
        }
    };

    let metrics = TrainingMetrics {
        accuracy: pct(counts.accuracy()),
        balanced_accuracy: pct(counts.balanced_accuracy()),
        precision: pct(counts.precision()),
        recall: pct(counts.recall()),
        f1_score: pct(counts.f1()),
        roc_auc: pct(auc),
        confusion_matrix: counts.as_matrix(),
        threshold: round_to(choice.threshold, 4),
        training_history: history,
    };

    let feature_importance = permutation_importance(&model, test, &features);
    let trained_at = Utc::now();
    let model_id = model_id(&trained_at, choice.threshold, &features);

    info!(
        component = "training",
        event = "train.finish",
        model_id = %model_id,
        accuracy = metrics.accuracy,
        f1_score = metrics.f1_score,
        roc_auc = metrics.roc_auc,
        threshold = metrics.threshold
    );

    Ok(TrainingOutcome {
        model,
        model_id,
        feature_columns: features,
        threshold: choice.threshold,
        metrics,
        feature_importance,
        trained_at,
        train_rows: train.len(),
        test_rows: test.len(),
    })
}

/// Per-round loss and accuracy of the partial ensemble on the training rows.
fn training_history(
    model: &GBDT,
    window: &LabeledWindow,
    weights: &[f64],
) -> Result<Vec<TrainingHistoryEntry>, TrainingError> {
    let (bias, trees) = single_tree_models(model)?;
    let data = test_data(&window.features);

    // Same f32 accumulation order as `GBDT::predict`, so the last round
    // reproduces the full ensemble exactly.
    let mut margins: Vec<ValueType> = vec![bias; data.len()];
    let mut history = Vec::with_capacity(trees.len());
    for (round, tree) in trees.iter().enumerate() {
        for (margin, delta) in margins.iter_mut().zip(tree.predict(&data)) {
            *margin += delta;
        }
        let probabilities: Vec<f64> = margins
            .iter()
            .map(|m| margin_to_probability(f64::from(*m)))
            .collect();
        let counts =
            ConfusionCounts::at_threshold(&window.labels, &probabilities, DEFAULT_THRESHOLD);
        history.push(TrainingHistoryEntry {
            epoch: round + 1,
            train_loss: round_to(log_loss(&window.labels, &probabilities, weights), 6),
            train_accuracy: pct(counts.accuracy()),
        });
    }
    debug!(
        component = "training",
        event = "train.history",
        rounds = history.len()
    );
    Ok(history)
}

/// Splits a fitted ensemble into its bias and one model per tree. Each
/// single-tree model scores with squared-error loss and zero bias, so its
/// `predict` yields the tree's shrunken raw contribution.
fn single_tree_models(model: &GBDT) -> Result<(ValueType, Vec<GBDT>), TrainingError> {
    let mut encoded = serde_json::to_value(model)?;
    let bias = encoded
        .get("bias")
        .and_then(Value::as_f64)
        .ok_or(TrainingError::ModelLayout("bias"))? as ValueType;
    let trees = match encoded.get_mut("trees").map(Value::take) {
        Some(Value::Array(trees)) => trees,
        _ => return Err(TrainingError::ModelLayout("trees")),
    };
    let mut conf = encoded
        .get_mut("conf")
        .map(Value::take)
        .ok_or(TrainingError::ModelLayout("conf"))?;
    let fields = conf
        .as_object_mut()
        .ok_or(TrainingError::ModelLayout("conf"))?;
    fields.insert("iterations".to_string(), json!(1));
    fields.insert("loss".to_string(), json!("SquaredError"));
    fields.insert("initial_guess_enabled".to_string(), json!(false));

    trees
        .into_iter()
        .map(|tree| {
            let single = json!({ "conf": conf, "trees": [tree], "bias": 0.0 });
            serde_json::from_value(single).map_err(TrainingError::from)
        })
        .collect::<Result<Vec<GBDT>, _>>()
        .map(|trees| (bias, trees))
}

/// Log-loss increase on the test rows when a feature column is rotated by half
/// its length, normalised to percentages.
pub fn permutation_importance(
    model: &GBDT,
    test: &LabeledWindow,
    features: &[String],
) -> Vec<FeatureImportance> {
    let (rows, labels) = importance_sample(test);
    let unit = vec![1.0; labels.len()];
    let baseline = log_loss(&labels, &predict_proba(model, &rows), &unit);

    let shift = rows.len() / 2;
    let mut raw = Vec::with_capacity(features.len());
    for col in 0..features.len() {
        let increase = if shift == 0 {
            0.0
        } else {
            let mut permuted = rows.clone();
            for (idx, row) in permuted.iter_mut().enumerate() {
                row[col] = rows[(idx + shift) % rows.len()][col];
            }
            let loss = log_loss(&labels, &predict_proba(model, &permuted), &unit);
            (loss - baseline).max(0.0)
        };
        raw.push(increase);
    }

    let total: f64 = raw.iter().sum();
    let mut importance: Vec<FeatureImportance> = features
        .iter()
        .zip(raw)
        .map(|(name, score)| FeatureImportance {
            feature_name: name.clone(),
            importance_score: if total > 0.0 {
                round_to(score / total * 100.0, 4)
            } else {
                0.0
            },
        })
        .collect();
    sort_importance(&mut importance);
    importance
}

pub fn sort_importance(importance: &mut [FeatureImportance]) {
    importance.sort_by(|a, b| {
        b.importance_score
            .total_cmp(&a.importance_score)
            .then_with(|| a.feature_name.cmp(&b.feature_name))
    });
}

/// Evenly strided subset of at most `IMPORTANCE_SAMPLE_ROWS` rows.
fn importance_sample(window: &LabeledWindow) -> (Vec<Vec<f64>>, Vec<bool>) {
    let stride = window.len().div_ceil(IMPORTANCE_SAMPLE_ROWS).max(1);
    let mut rows = Vec::new();
    let mut labels = Vec::new();
    for idx in (0..window.len()).step_by(stride) {
        rows.push(window.features[idx].clone());
        labels.push(window.labels[idx]);
    }
    (rows, labels)
}

pub fn model_id(trained_at: &DateTime<Utc>, threshold: f64, features: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(trained_at.to_rfc3339_opts(SecondsFormat::Micros, true));
    hasher.update(format!("|{threshold:.6}|"));
    hasher.update(features.join(","));
    let digest = hex::encode(hasher.finalize());
    format!("model_{}", &digest[..8])
}

fn pct(ratio: f64) -> f64 {
    round_to(ratio * 100.0, 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::{Field, TimeUnit};

    fn separable_window(rows: usize, offset: usize) -> LabeledWindow {
        let mut window = LabeledWindow::default();
        for i in 0..rows {
            let idx = i + offset;
            let pass = idx % 4 != 0;
            let signal = if pass { 10.0 } else { -10.0 };
            window
                .features
                .push(vec![signal + (idx % 5) as f64 * 0.1, (idx % 7) as f64]);
            window.labels.push(pass);
        }
        window
    }

    fn small_params() -> TrainingParams {
        TrainingParams {
            rounds: 20,
            learning_rate: 0.3,
            max_depth: 3,
            data_sample_ratio: 1.0,
            feature_sample_ratio: 1.0,
            min_leaf_size: 1,
        }
    }

    #[test]
    fn feature_columns_skip_identifier_label_timestamp_and_text() {
        let schema = Schema::new(vec![
            Field::new("Sample_ID", DataType::Int64, true),
            Field::new("temp", DataType::Float64, true),
            Field::new("operator", DataType::Utf8, true),
            Field::new("pressure", DataType::Int64, true),
            Field::new(LABEL_COLUMN, DataType::Utf8, false),
            Field::new(
                TIMESTAMP_COLUMN,
                DataType::Timestamp(TimeUnit::Second, None),
                false,
            ),
        ]);
        assert_eq!(feature_columns(&schema), vec!["temp", "pressure"]);
    }

    #[test]
    fn class_weights_balance_the_positive_class() {
        let weights = class_weights(&[true, false, false, false]);
        assert_eq!(weights, vec![3.0, 1.0, 1.0, 1.0]);
        assert_eq!(class_weights(&[false, false]), vec![1.0, 1.0]);
    }

    #[test]
    fn params_validation_rejects_degenerate_values() {
        assert!(TrainingParams::default().validate().is_ok());
        let zero_rounds = TrainingParams {
            rounds: 0,
            ..TrainingParams::default()
        };
        assert!(matches!(
            zero_rounds.validate(),
            Err(TrainingError::InvalidParams(_))
        ));
        let bad_ratio = TrainingParams {
            feature_sample_ratio: 0.0,
            ..TrainingParams::default()
        };
        assert!(bad_ratio.validate().is_err());
    }

    #[test]
    fn model_id_is_prefixed_short_hex() {
        let id = model_id(&Utc::now(), 0.42, &["a".to_string(), "b".to_string()]);
        assert!(id.starts_with("model_"));
        assert_eq!(id.len(), "model_".len() + 8);
        assert!(id["model_".len()..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn fits_a_separable_window_and_reports_percent_metrics() {
        let train = separable_window(120, 0);
        let test = separable_window(60, 120);
        let features = vec!["signal".to_string(), "noise".to_string()];

        let outcome = train_on_windows(&train, &test, features, &small_params()).unwrap();

        assert_eq!(outcome.metrics.training_history.len(), 20);
        assert_eq!(outcome.metrics.training_history[0].epoch, 1);
        let first = &outcome.metrics.training_history[0];
        let last = outcome.metrics.training_history.last().unwrap();
        assert!(last.train_loss < first.train_loss);
        let full = ConfusionCounts::at_threshold(
            &train.labels,
            &predict_proba(&outcome.model, &train.features),
            DEFAULT_THRESHOLD,
        );
        assert_eq!(last.train_accuracy, pct(full.accuracy()));

        assert!(outcome.metrics.accuracy > 90.0, "{:?}", outcome.metrics);
        assert!(outcome.metrics.roc_auc > 90.0);
        assert!((0.05..=0.95).contains(&outcome.threshold));
        let total: u64 = outcome.metrics.confusion_matrix.iter().flatten().sum();
        assert_eq!(total, 60);

        assert_eq!(outcome.feature_importance.len(), 2);
        assert_eq!(outcome.feature_importance[0].feature_name, "signal");
        let sum: f64 = outcome
            .feature_importance
            .iter()
            .map(|f| f.importance_score)
            .sum();
        assert!((sum - 100.0).abs() < 0.01 || sum == 0.0);
    }

    #[test]
    fn single_tree_models_add_up_to_the_full_ensemble() {
        let train = separable_window(80, 0);
        let weights = class_weights(&train.labels);
        let mut data = training_data(&train, &weights);
        let mut model = GBDT::new(&small_params().gbdt_config(2));
        model.fit(&mut data);

        let (bias, trees) = single_tree_models(&model).unwrap();
        assert_eq!(trees.len(), 20);

        let rows = test_data(&train.features);
        let mut margins: Vec<ValueType> = vec![bias; rows.len()];
        for tree in &trees {
            for (margin, delta) in margins.iter_mut().zip(tree.predict(&rows)) {
                *margin += delta;
            }
        }
        for (margin, full) in margins.iter().zip(model.predict(&rows)) {
            let partial = margin_to_probability(f64::from(*margin));
            assert!((partial - f64::from(full)).abs() < 1e-5, "{partial} vs {full}");
        }
    }

    #[test]
    fn single_class_test_window_reports_auc_fifty() {
        let train = separable_window(60, 0);
        let mut test = LabeledWindow::default();
        for i in 0..10 {
            test.features.push(vec![10.0, i as f64]);
            test.labels.push(true);
        }
        let features = vec!["signal".to_string(), "noise".to_string()];

        let outcome = train_on_windows(&train, &test, features, &small_params()).unwrap();
        assert_eq!(outcome.metrics.roc_auc, 50.0);
    }

    #[test]
    fn empty_windows_are_rejected() {
        let train = separable_window(30, 0);
        let err = train_on_windows(
            &train,
            &LabeledWindow::default(),
            vec!["a".to_string(), "b".to_string()],
            &small_params(),
        )
        .unwrap_err();
        assert!(matches!(err, TrainingError::EmptyWindow("testing")));
    }
}

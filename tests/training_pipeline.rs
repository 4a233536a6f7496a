use std::io::Cursor;
use std::path::Path;

use intelli_inspect::{
    feature_columns, ingest_csv, load_window, train_on_ranges, DatasetStore, IngestConfig,
    ModelRegistry, TimeRange, TrainingError, TrainingParams, Verdict, METADATA_FILE, MODEL_FILE,
    SYNTHETIC_EPOCH_SECS,
};
use serde_json::json;

fn quick_params() -> TrainingParams {
    TrainingParams {
        rounds: 25,
        learning_rate: 0.3,
        max_depth: 3,
        data_sample_ratio: 1.0,
        feature_sample_ratio: 1.0,
        min_leaf_size: 1,
    }
}

/// Temperature separates the classes; vibration is noise and operator is text.
fn line_csv(rows: usize) -> String {
    let mut csv = String::from("Sample_ID,temperature,vibration,operator,Response\n");
    for i in 0..rows {
        let pass = i % 4 != 0;
        let temperature = if pass { 60 + i % 5 } else { 95 + i % 3 };
        let label = if pass { "pass" } else { "fail" };
        let operator = if i % 2 == 0 { "ana" } else { "ben" };
        csv.push_str(&format!(
            "S{i:04},{temperature},{}.0,{operator},{label}\n",
            i % 7
        ));
    }
    csv
}

fn ingest_lines(output: &Path, rows: usize) {
    ingest_csv(
        Cursor::new(line_csv(rows).into_bytes()),
        output,
        &IngestConfig { chunk_size: 64 },
    )
    .unwrap();
}

fn window(first: i64, last: i64) -> TimeRange {
    TimeRange::new(SYNTHETIC_EPOCH_SECS + first, SYNTHETIC_EPOCH_SECS + last).unwrap()
}

#[test]
fn feature_selection_skips_identifier_and_text_columns() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("dataset.parquet");
    ingest_lines(&output, 20);
    let store = DatasetStore::open(&output).unwrap();

    let features = feature_columns(&store.schema());
    assert_eq!(features, vec!["temperature", "vibration"]);

    let loaded = load_window(&store, &window(0, 9), &features).unwrap();
    assert_eq!(loaded.len(), 10);
    assert_eq!(loaded.positives(), 7);
    assert_eq!(loaded.features[0], vec![95.0, 0.0]);
    assert!(!loaded.labels[0]);
}

#[test]
fn trains_installs_and_reloads_a_model() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("dataset.parquet");
    let model_dir = dir.path().join("model");
    ingest_lines(&output, 300);
    let store = DatasetStore::open(&output).unwrap();

    let outcome =
        train_on_ranges(&store, &window(0, 199), &window(200, 259), &quick_params()).unwrap();
    assert_eq!(outcome.train_rows, 200);
    assert_eq!(outcome.test_rows, 60);
    assert!(outcome.model_id.starts_with("model_"));
    assert!(outcome.metrics.accuracy >= 95.0, "{:?}", outcome.metrics);
    assert!(outcome.metrics.f1_score >= 95.0);
    assert_eq!(outcome.metrics.training_history.len(), 25);
    assert_eq!(outcome.feature_importance[0].feature_name, "temperature");

    let model_id = outcome.model_id.clone();
    let registry = ModelRegistry::empty(&model_dir);
    registry.install(outcome).unwrap();
    assert!(model_dir.join(MODEL_FILE).is_file());
    assert!(model_dir.join(METADATA_FILE).is_file());

    let hot = json!({"temperature": 97, "vibration": 2.0});
    let cool = json!({"temperature": "61", "vibration": null});
    let live_hot = registry.predict(hot.as_object().unwrap()).unwrap();
    let live_cool = registry.predict(cool.as_object().unwrap()).unwrap();
    assert_eq!(live_hot.prediction, Verdict::Fail);
    assert_eq!(live_cool.prediction, Verdict::Pass);
    assert!(live_cool.confidence >= 50.0 && live_cool.confidence <= 100.0);

    let reloaded = ModelRegistry::load_from_dir(&model_dir);
    let current = reloaded.current().unwrap();
    assert_eq!(current.meta.model_id, model_id);
    assert_eq!(current.meta.feature_columns, vec!["temperature", "vibration"]);
    assert_eq!(
        reloaded.predict(hot.as_object().unwrap()).unwrap(),
        live_hot
    );

    let top = reloaded.feature_importance(10).unwrap();
    assert_eq!(top.len(), 2);
    assert!(top[0].importance_score >= top[1].importance_score);
}

#[test]
fn empty_windows_and_featureless_datasets_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("dataset.parquet");
    ingest_lines(&output, 40);
    let store = DatasetStore::open(&output).unwrap();

    let past = TimeRange::parse("2025-07-01", "2025-07-02").unwrap();
    let err = train_on_ranges(&store, &past, &window(0, 9), &quick_params()).unwrap_err();
    assert!(matches!(err, TrainingError::EmptyWindow("training")));

    let err = train_on_ranges(&store, &window(0, 29), &past, &quick_params()).unwrap_err();
    assert!(matches!(err, TrainingError::EmptyWindow("testing")));

    let text_only = dir.path().join("text.parquet");
    ingest_csv(
        Cursor::new(b"id,operator,Response\n1,ana,pass\n2,ben,fail\n".to_vec()),
        &text_only,
        &IngestConfig::default(),
    )
    .unwrap();
    let store = DatasetStore::open(&text_only).unwrap();
    let err = train_on_ranges(&store, &window(0, 0), &window(1, 1), &quick_params()).unwrap_err();
    assert!(matches!(err, TrainingError::NoFeatureColumns));
}

//! Inspection outcome service core crate.
//!
//! Modules:
//! - `ingest` and `timeline`: chunked CSV load onto the synthetic time axis
//! - `store`: inclusive range reads over the Parquet dataset
//! - `metrics` and `training`: boosted pass/fail model with F1 calibration
//! - `registry`: the current model and its artifacts on disk
//! - `api`, `config` and `observability`: the HTTP service around them

mod api;
mod config;
mod ingest;
mod metrics;
mod observability;
mod registry;
mod store;
mod timeline;
mod training;

pub use api::{
    inspect_router, ApiError, AppState, DateRange, RecordCounts, RecordCountsRequest,
    SimulationEvent, TrainRequest, TrainResponse, UploadResponse, FEATURE_IMPORTANCE_TOP, ROUTES,
};
pub use config::{service_config_from_env, ServiceConfig, DATASET_FILE, DEFAULT_MAX_UPLOAD_BYTES};
pub use ingest::{
    ingest_csv, ingest_csv_file, normalize_label, ColumnKind, IngestConfig, IngestError,
    IngestReport, Outcome, DEFAULT_CHUNK_SIZE, LABEL_COLUMN,
};
pub use metrics::{
    best_f1_threshold, log_loss, roc_auc, round_to, threshold_candidates, ConfusionCounts,
    ThresholdChoice, DEFAULT_THRESHOLD, THRESHOLD_CANDIDATES, THRESHOLD_MAX, THRESHOLD_MIN,
};
pub use observability::{
    init_logging, log_app_bind, log_app_start, log_service_config, logging_config_from_env,
    shutdown_signal, LogFormat, LoggingConfig, LoggingInitError,
};
pub use registry::{
    feature_vector, LoadedModel, ModelMetadata, ModelRegistry, Prediction, RegistryError,
    Verdict, METADATA_FILE, MODEL_FILE,
};
pub use store::{rows_as_json, DatasetStore, JsonRow, StoreError};
pub use timeline::{
    format_timestamp, parse_time_bound, synthetic_timestamp, TimeRange, TimelineError,
    SYNTHETIC_EPOCH_SECS, TIMESTAMP_COLUMN,
};
pub use training::{
    class_weights, feature_columns, load_window, model_id, permutation_importance, predict_proba,
    train_on_ranges, train_on_windows, FeatureImportance, LabeledWindow, TrainingError,
    TrainingHistoryEntry, TrainingMetrics, TrainingOutcome, TrainingParams,
    IMPORTANCE_SAMPLE_ROWS,
};

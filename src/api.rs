//! HTTP routes for dataset upload, window counts, training and serving.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::ServiceConfig;
use crate::ingest::{ingest_csv_file, IngestError, LABEL_COLUMN};
use crate::registry::{ModelRegistry, Prediction, RegistryError, Verdict};
use crate::store::{rows_as_json, DatasetStore, JsonRow, StoreError};
use crate::timeline::{format_timestamp, parse_time_bound, TimeRange, TimelineError, TIMESTAMP_COLUMN};
use crate::training::{train_on_ranges, FeatureImportance, TrainingError, TrainingMetrics};

pub const ROUTES: [&str; 8] = [
    "/health",
    "/upload-dataset",
    "/get-record-counts-for-ranges",
    "/train-model",
    "/get-data-for-range",
    "/predict",
    "/simulate",
    "/feature-importance",
];

pub const FEATURE_IMPORTANCE_TOP: usize = 10;
const PERIOD_NAMES: [&str; 3] = ["training", "testing", "simulation"];
const SAMPLE_ID_COLUMNS: [&str; 3] = ["Sample_ID", "sample_ID", "id"];

static SPOOL_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Internal(String),
    #[error(transparent)]
    Multipart(#[from] MultipartError),
    #[error(transparent)]
    Timeline(#[from] TimelineError),
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Training(#[from] TrainingError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::Timeline(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Multipart(err) => err.status(),
            Self::Ingest(err) => match err {
                IngestError::EmptyInput
                | IngestError::MissingLabelColumn
                | IngestError::NoValidRows
                | IngestError::Csv(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Store(err) => store_status(err),
            Self::Training(err) => match err {
                TrainingError::NoFeatureColumns | TrainingError::EmptyWindow(_) => {
                    StatusCode::BAD_REQUEST
                }
                TrainingError::Store(StoreError::DatasetNotFound) => StatusCode::BAD_REQUEST,
                TrainingError::Store(err) => store_status(err),
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Registry(err) => match err {
                RegistryError::ModelUnavailable => StatusCode::SERVICE_UNAVAILABLE,
                RegistryError::InvalidFeatureValue { .. } => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

fn store_status(err: &StoreError) -> StatusCode {
    match err {
        StoreError::DatasetNotFound => StatusCode::NOT_FOUND,
        StoreError::UnknownColumn(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(
                component = "api",
                event = "http.error",
                status = status.as_u16(),
                error = %self
            );
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

#[derive(Clone)]
pub struct AppState {
    config: Arc<ServiceConfig>,
    registry: ModelRegistry,
    ingest_lock: Arc<Mutex<()>>,
    training_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(config: ServiceConfig, registry: ModelRegistry) -> Self {
        Self {
            config: Arc::new(config),
            registry,
            ingest_lock: Arc::new(Mutex::new(())),
            training_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    fn open_store(&self) -> Result<DatasetStore, StoreError> {
        DatasetStore::open(self.config.dataset_path())
    }
}

pub fn inspect_router(state: AppState) -> Router {
    let upload_limit = state.config.max_upload_bytes;
    Router::new()
        .route("/health", get(health))
        .route("/upload-dataset", post(upload_dataset))
        .route("/upload-dataset/", post(upload_dataset))
        .route("/get-record-counts-for-ranges", post(record_counts))
        .route("/train-model", post(train_model))
        .route("/get-data-for-range", post(data_for_range))
        .route("/predict", post(predict))
        .route("/simulate", post(simulate))
        .route("/feature-importance", get(feature_importance))
        .layer(DefaultBodyLimit::max(upload_limit))
        .with_state(state)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    pub start_date: String,
    pub end_date: String,
}

impl DateRange {
    fn parse(&self) -> Result<TimeRange, TimelineError> {
        TimeRange::parse(&self.start_date, &self.end_date)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub message: String,
    pub total_records: u64,
    pub column_count: usize,
    pub date_range_start: String,
    pub date_range_end: String,
    pub pass_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordCountsRequest {
    pub training_period: DateRange,
    pub testing_period: DateRange,
    pub simulation_period: DateRange,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordCounts {
    pub training: u64,
    pub testing: u64,
    pub simulation: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainRequest {
    pub train_start: String,
    pub train_end: String,
    pub test_start: String,
    pub test_end: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainResponse {
    pub status: String,
    pub model_id: String,
    pub metrics: TrainingMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationEvent {
    pub timestamp: String,
    pub sample_id: String,
    pub prediction: Verdict,
    pub confidence: f64,
    pub sensor_data: JsonRow,
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn upload_dataset(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    while let Some(mut field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        if !file_name.to_ascii_lowercase().ends_with(".csv") {
            return Err(ApiError::BadRequest(
                "Invalid file type. Please upload a CSV file.".to_string(),
            ));
        }

        let _writer = state.ingest_lock.lock().await;
        info!(
            component = "api",
            event = "http.upload.request",
            file_name = %file_name
        );

        tokio::fs::create_dir_all(&state.config.data_dir).await?;
        let spool = spool_path(&state.config.data_dir);
        let spooled = async {
            let mut file = tokio::fs::File::create(&spool).await?;
            let mut bytes = 0u64;
            while let Some(chunk) = field.chunk().await? {
                bytes += chunk.len() as u64;
                file.write_all(&chunk).await?;
            }
            file.flush().await?;
            Ok::<u64, ApiError>(bytes)
        }
        .await;

        let result = match spooled {
            Ok(bytes) => {
                info!(
                    component = "api",
                    event = "http.upload.spooled",
                    file_name = %file_name,
                    bytes
                );
                let source = spool.clone();
                let output = state.config.dataset_path();
                let cfg = state.config.ingest_config();
                run_blocking(move || Ok(ingest_csv_file(&source, &output, &cfg)?)).await
            }
            Err(err) => Err(err),
        };
        if let Err(err) = tokio::fs::remove_file(&spool).await {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(
                    component = "api",
                    event = "http.upload.cleanup_failed",
                    path = %spool.display(),
                    error = %err
                );
            }
        }

        let report = result?;
        return Ok(Json(UploadResponse {
            message: "Dataset uploaded and processed successfully.".to_string(),
            total_records: report.total_records,
            column_count: report.column_count,
            date_range_start: format_timestamp(report.first_timestamp),
            date_range_end: format_timestamp(report.last_timestamp),
            pass_rate: report.pass_rate_pct(),
        }));
    }

    Err(ApiError::BadRequest(
        "No file uploaded. Expected multipart field 'file'.".to_string(),
    ))
}

fn spool_path(data_dir: &Path) -> PathBuf {
    let seq = SPOOL_COUNTER.fetch_add(1, Ordering::Relaxed);
    data_dir.join(format!("upload-{}-{seq}.csv.part", std::process::id()))
}

async fn record_counts(
    State(state): State<AppState>,
    Json(req): Json<RecordCountsRequest>,
) -> Result<Json<RecordCounts>, ApiError> {
    let store = state.open_store()?;
    let ranges = [
        req.training_period.parse()?,
        req.testing_period.parse()?,
        req.simulation_period.parse()?,
    ];
    check_sequential(&req)?;

    let counts = run_blocking(move || {
        let (min_ts, max_ts) = store
            .time_bounds()?
            .ok_or_else(|| ApiError::NotFound("Dataset is empty.".to_string()))?;
        let mut counts = Vec::with_capacity(ranges.len());
        for (name, range) in PERIOD_NAMES.iter().zip(&ranges) {
            if range.start < min_ts || range.end > max_ts {
                return Err(ApiError::BadRequest(format!(
                    "The {name} period is outside the dataset range ({} to {}).",
                    format_timestamp(min_ts),
                    format_timestamp(max_ts)
                )));
            }
            counts.push(store.count_in_range(range)?);
        }
        Ok(RecordCounts {
            training: counts[0],
            testing: counts[1],
            simulation: counts[2],
        })
    })
    .await?;

    info!(
        component = "api",
        event = "http.record_counts",
        training = counts.training,
        testing = counts.testing,
        simulation = counts.simulation
    );
    Ok(Json(counts))
}

/// Each period must start strictly after the previous one ends.
fn check_sequential(req: &RecordCountsRequest) -> Result<(), ApiError> {
    let training_end = parse_time_bound(&req.training_period.end_date)?;
    let testing_start = parse_time_bound(&req.testing_period.start_date)?;
    let testing_end = parse_time_bound(&req.testing_period.end_date)?;
    let simulation_start = parse_time_bound(&req.simulation_period.start_date)?;
    if testing_start <= training_end || simulation_start <= testing_end {
        return Err(ApiError::BadRequest(
            "Date ranges must be sequential and non-overlapping.".to_string(),
        ));
    }
    Ok(())
}

async fn train_model(
    State(state): State<AppState>,
    Json(req): Json<TrainRequest>,
) -> Result<Json<TrainResponse>, ApiError> {
    let train_range = TimeRange::parse(&req.train_start, &req.train_end)?;
    let test_range = TimeRange::parse(&req.test_start, &req.test_end)?;
    let store = state.open_store().map_err(|err| match err {
        StoreError::DatasetNotFound => ApiError::BadRequest(err.to_string()),
        other => other.into(),
    })?;

    let _trainer = state.training_lock.lock().await;
    info!(
        component = "api",
        event = "http.train.request",
        train_start = train_range.start,
        train_end = train_range.end,
        test_start = test_range.start,
        test_end = test_range.end
    );

    let registry = state.registry.clone();
    let params = state.config.training.clone();
    let (model_id, metrics) = run_blocking(move || {
        let outcome = train_on_ranges(&store, &train_range, &test_range, &params)?;
        let metrics = outcome.metrics.clone();
        let loaded = registry.install(outcome)?;
        Ok((loaded.meta.model_id.clone(), metrics))
    })
    .await?;

    Ok(Json(TrainResponse {
        status: "Model Trained Successfully".to_string(),
        model_id,
        metrics,
    }))
}

async fn data_for_range(
    State(state): State<AppState>,
    Json(req): Json<DateRange>,
) -> Result<Json<Vec<JsonRow>>, ApiError> {
    let range = req.parse()?;
    let store = state.open_store()?;
    let rows = run_blocking(move || Ok(rows_as_json(&store.read_range(&range, None)?))).await?;
    info!(
        component = "api",
        event = "http.data_for_range",
        start = range.start,
        end = range.end,
        rows = rows.len()
    );
    Ok(Json(rows))
}

async fn predict(
    State(state): State<AppState>,
    Json(row): Json<Map<String, Value>>,
) -> Result<Json<Prediction>, ApiError> {
    let prediction = state.registry.predict(&row)?;
    info!(
        component = "api",
        event = "http.predict.request",
        field_count = row.len(),
        prediction = ?prediction.prediction,
        confidence = prediction.confidence
    );
    Ok(Json(prediction))
}

async fn simulate(
    State(state): State<AppState>,
    Json(req): Json<DateRange>,
) -> Result<Json<Vec<SimulationEvent>>, ApiError> {
    let model = state.registry.require()?;
    let range = req.parse()?;
    let store = state.open_store()?;

    let events = run_blocking(move || {
        let id_column = sample_id_column(&store);
        let rows = rows_as_json(&store.read_range(&range, None)?);
        let refs: Vec<&JsonRow> = rows.iter().collect();
        let predictions = model.predict_rows(&refs)?;

        Ok(rows
            .into_iter()
            .zip(predictions)
            .map(|(row, prediction)| {
                let timestamp = match row.get(TIMESTAMP_COLUMN) {
                    Some(Value::String(ts)) => ts.clone(),
                    Some(other) => other.to_string(),
                    None => String::new(),
                };
                let sample_id = id_column
                    .as_deref()
                    .and_then(|col| row.get(col))
                    .and_then(sample_id_text)
                    .unwrap_or_else(|| "N/A".to_string());
                SimulationEvent {
                    timestamp,
                    sample_id,
                    prediction: prediction.prediction,
                    confidence: prediction.confidence,
                    sensor_data: row,
                }
            })
            .collect::<Vec<_>>())
    })
    .await?;

    info!(
        component = "api",
        event = "http.simulate",
        start = range.start,
        end = range.end,
        events = events.len()
    );
    Ok(Json(events))
}

/// First of the known id columns present, else the leading data column.
fn sample_id_column(store: &DatasetStore) -> Option<String> {
    let schema = store.schema();
    SAMPLE_ID_COLUMNS
        .iter()
        .find(|name| schema.index_of(name).is_ok())
        .map(|name| name.to_string())
        .or_else(|| {
            schema
                .fields()
                .first()
                .map(|field| field.name().clone())
                .filter(|name| name != LABEL_COLUMN && name != TIMESTAMP_COLUMN)
        })
}

fn sample_id_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

async fn feature_importance(
    State(state): State<AppState>,
) -> Result<Json<Vec<FeatureImportance>>, ApiError> {
    match state.registry.feature_importance(FEATURE_IMPORTANCE_TOP) {
        Ok(ranked) => Ok(Json(ranked)),
        Err(RegistryError::ModelUnavailable) => Err(ApiError::NotFound(
            "Feature importance not available. Train a model first.".to_string(),
        )),
        Err(err) => Err(err.into()),
    }
}

async fn run_blocking<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| ApiError::Internal(format!("worker task failed: {err}")))?
}

//! Chunked CSV ingestion into the Parquet dataset.
//!
//! The CSV is read `chunk_size` records at a time. Each chunk has its label
//! column normalised to `pass`/`fail`, loses the rows that carry anything else,
//! gets synthetic timestamps from a counter that runs across chunks, and is
//! appended to the output file as one row group. The first chunk with retained
//! rows fixes the schema for the whole file.

use std::collections::HashSet;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{
    ArrayRef, Float64Builder, Int64Builder, StringArray, StringBuilder, TimestampSecondArray,
};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use csv::StringRecord;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::errors::ParquetError;
use parquet::file::properties::WriterProperties;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::metrics::round_to;
use crate::timeline::{synthetic_timestamp, TIMESTAMP_COLUMN};

pub const LABEL_COLUMN: &str = "Response";
pub const DEFAULT_CHUNK_SIZE: usize = 100_000;

/// Cell values read as missing, mirroring the usual CSV NA spellings.
const NULL_TOKENS: [&str; 12] = [
    "", "NA", "N/A", "n/a", "NaN", "nan", "-NaN", "null", "NULL", "None", "#N/A", "<NA>",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Pass,
    Fail,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pass" => Some(Self::Pass),
            "fail" => Some(Self::Fail),
            _ => None,
        }
    }

    pub fn is_pass(self) -> bool {
        matches!(self, Self::Pass)
    }
}

/// Maps a raw label cell onto the canonical two-valued encoding.
pub fn normalize_label(raw: &str) -> Option<Outcome> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "pass" | "p" | "1" | "1.0" => Some(Outcome::Pass),
        "fail" | "f" | "0" | "0.0" => Some(Outcome::Fail),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnKind {
    Int64,
    Float64,
    Utf8,
}

impl ColumnKind {
    fn data_type(self) -> DataType {
        match self {
            Self::Int64 => DataType::Int64,
            Self::Float64 => DataType::Float64,
            Self::Utf8 => DataType::Utf8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestConfig {
    pub chunk_size: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub total_records: u64,
    pub pass_count: u64,
    pub column_count: usize,
    pub chunks_read: u64,
    pub dropped_rows: u64,
    pub coerced_values: u64,
    pub first_timestamp: i64,
    pub last_timestamp: i64,
}

impl IngestReport {
    /// Share of `pass` rows as a percentage rounded to two decimals.
    pub fn pass_rate_pct(&self) -> f64 {
        if self.total_records == 0 {
            return 0.0;
        }
        round_to(
            self.pass_count as f64 / self.total_records as f64 * 100.0,
            2,
        )
    }
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("invalid ingest config: {0}")]
    InvalidConfig(String),
    #[error("CSV input has no header row")]
    EmptyInput,
    #[error("Dataset must have a 'Response' column.")]
    MissingLabelColumn,
    #[error("No valid rows with 'pass' or 'fail' found.")]
    NoValidRows,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("arrow error: {0}")]
    Arrow(#[from] ArrowError),
    #[error("parquet error: {0}")]
    Parquet(#[from] ParquetError),
}

pub fn ingest_csv_file(
    csv_path: &Path,
    output_path: &Path,
    cfg: &IngestConfig,
) -> Result<IngestReport, IngestError> {
    let file = fs::File::open(csv_path)?;
    info!(
        component = "ingest",
        event = "ingest.start",
        source = %csv_path.display(),
        output = %output_path.display(),
        chunk_size = cfg.chunk_size
    );
    ingest_csv(file, output_path, cfg)
}

/// Ingests CSV from `input` and publishes the Parquet file at `output_path`.
///
/// The file is built next to its final location and renamed into place only
/// once the writer has closed, so a failed ingest never replaces the previous
/// dataset.
pub fn ingest_csv<R: Read>(
    input: R,
    output_path: &Path,
    cfg: &IngestConfig,
) -> Result<IngestReport, IngestError> {
    if cfg.chunk_size == 0 {
        return Err(IngestError::InvalidConfig(
            "chunk_size must be greater than zero".to_string(),
        ));
    }

    let tmp_path = staging_path(output_path)?;
    match write_dataset(input, &tmp_path, cfg) {
        Ok(report) => {
            fs::rename(&tmp_path, output_path)?;
            info!(
                component = "ingest",
                event = "ingest.finish",
                output = %output_path.display(),
                total_records = report.total_records,
                pass_count = report.pass_count,
                dropped_rows = report.dropped_rows,
                coerced_values = report.coerced_values,
                chunks_read = report.chunks_read
            );
            Ok(report)
        }
        Err(err) => {
            if tmp_path.exists() {
                let _ = fs::remove_file(&tmp_path);
            }
            warn!(
                component = "ingest",
                event = "ingest.error",
                output = %output_path.display(),
                error = %err
            );
            Err(err)
        }
    }
}

struct Sink {
    writer: ArrowWriter<fs::File>,
    schema: SchemaRef,
    kinds: Vec<ColumnKind>,
}

fn write_dataset<R: Read>(
    input: R,
    tmp_path: &Path,
    cfg: &IngestConfig,
) -> Result<IngestReport, IngestError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(input);

    let headers = reader.headers()?.clone();
    if headers.is_empty() || (headers.len() == 1 && headers.get(0) == Some("")) {
        return Err(IngestError::EmptyInput);
    }
    let column_names = dedupe_headers(&headers);
    let label_idx = column_names
        .iter()
        .position(|name| name == LABEL_COLUMN)
        .ok_or(IngestError::MissingLabelColumn)?;

    let mut sink: Option<Sink> = None;
    let mut total_records = 0u64;
    let mut pass_count = 0u64;
    let mut chunks_read = 0u64;
    let mut dropped_rows = 0u64;
    let mut coerced_values = 0u64;

    loop {
        let chunk = read_chunk(&mut reader, cfg.chunk_size)?;
        if chunk.is_empty() {
            break;
        }
        chunks_read += 1;

        let chunk_len = chunk.len();
        let retained: Vec<(StringRecord, Outcome)> = chunk
            .into_iter()
            .filter_map(|record| {
                let outcome = normalize_label(record.get(label_idx).unwrap_or_default())?;
                Some((record, outcome))
            })
            .collect();
        dropped_rows += (chunk_len - retained.len()) as u64;

        if retained.is_empty() {
            debug!(
                component = "ingest",
                event = "ingest.chunk.empty",
                chunk = chunks_read,
                rows = chunk_len
            );
            continue;
        }

        if sink.is_none() {
            let kinds = infer_column_kinds(column_names.len(), label_idx, &retained);
            let schema = dataset_schema(&column_names, &kinds, label_idx);
            // one flushed row group per chunk, never split by the writer
            let props = WriterProperties::builder()
                .set_compression(Compression::SNAPPY)
                .set_max_row_group_size(cfg.chunk_size)
                .build();
            let file = fs::File::create(tmp_path)?;
            let writer = ArrowWriter::try_new(file, schema.clone(), Some(props))?;
            sink = Some(Sink {
                writer,
                schema,
                kinds,
            });
        }

        let Some(active) = sink.as_mut() else {
            continue;
        };

        let mut chunk_coerced = 0u64;
        let batch = build_batch(
            &active.schema,
            &active.kinds,
            label_idx,
            &retained,
            total_records,
            &mut chunk_coerced,
        )?;
        active.writer.write(&batch)?;
        active.writer.flush()?;

        let chunk_pass = retained.iter().filter(|(_, o)| o.is_pass()).count() as u64;
        total_records += retained.len() as u64;
        pass_count += chunk_pass;
        coerced_values += chunk_coerced;

        if chunk_coerced > 0 {
            warn!(
                component = "ingest",
                event = "ingest.chunk.coerced",
                chunk = chunks_read,
                coerced_values = chunk_coerced
            );
        }
        debug!(
            component = "ingest",
            event = "ingest.chunk",
            chunk = chunks_read,
            rows = chunk_len,
            retained = retained.len(),
            total_records
        );
    }

    let Some(sink) = sink else {
        return Err(IngestError::NoValidRows);
    };
    sink.writer.close()?;

    Ok(IngestReport {
        total_records,
        pass_count,
        column_count: column_names.len() + 1,
        chunks_read,
        dropped_rows,
        coerced_values,
        first_timestamp: synthetic_timestamp(0),
        last_timestamp: synthetic_timestamp(total_records - 1),
    })
}

fn read_chunk<R: Read>(
    reader: &mut csv::Reader<R>,
    chunk_size: usize,
) -> Result<Vec<StringRecord>, csv::Error> {
    let mut chunk = Vec::with_capacity(chunk_size.min(8_192));
    let mut record = StringRecord::new();
    while chunk.len() < chunk_size {
        if !reader.read_record(&mut record)? {
            break;
        }
        chunk.push(record.clone());
    }
    Ok(chunk)
}

/// Repeated header names get a `.N` suffix so every column stays addressable.
fn dedupe_headers(headers: &StringRecord) -> Vec<String> {
    let mut seen = HashSet::new();
    headers
        .iter()
        .map(|name| {
            let mut candidate = name.to_string();
            let mut suffix = 1;
            while !seen.insert(candidate.clone()) {
                candidate = format!("{name}.{suffix}");
                suffix += 1;
            }
            candidate
        })
        .collect()
}

pub(crate) fn infer_column_kinds(
    column_count: usize,
    label_idx: usize,
    rows: &[(StringRecord, Outcome)],
) -> Vec<ColumnKind> {
    (0..column_count)
        .map(|col_idx| {
            if col_idx == label_idx {
                return ColumnKind::Utf8;
            }

            let mut all_int = true;
            let mut all_float = true;
            for (record, _) in rows {
                let Some(raw) = cell(record, col_idx) else {
                    continue;
                };
                if all_int && raw.parse::<i64>().is_err() {
                    all_int = false;
                }
                if raw.parse::<f64>().is_err() {
                    all_float = false;
                    break;
                }
            }

            if all_float && all_int && has_any_value(rows, col_idx) {
                ColumnKind::Int64
            } else if all_float {
                ColumnKind::Float64
            } else {
                ColumnKind::Utf8
            }
        })
        .collect()
}

fn has_any_value(rows: &[(StringRecord, Outcome)], col_idx: usize) -> bool {
    rows.iter().any(|(record, _)| cell(record, col_idx).is_some())
}

fn dataset_schema(column_names: &[String], kinds: &[ColumnKind], label_idx: usize) -> SchemaRef {
    let mut fields: Vec<Field> = column_names
        .iter()
        .zip(kinds)
        .enumerate()
        .map(|(idx, (name, kind))| Field::new(name, kind.data_type(), idx != label_idx))
        .collect();
    fields.push(Field::new(
        TIMESTAMP_COLUMN,
        DataType::Timestamp(TimeUnit::Second, None),
        false,
    ));
    Arc::new(Schema::new(fields))
}

fn build_batch(
    schema: &SchemaRef,
    kinds: &[ColumnKind],
    label_idx: usize,
    rows: &[(StringRecord, Outcome)],
    first_index: u64,
    coerced: &mut u64,
) -> Result<RecordBatch, ArrowError> {
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(kinds.len() + 1);

    for (col_idx, kind) in kinds.iter().enumerate() {
        if col_idx == label_idx {
            let labels: StringArray = rows.iter().map(|(_, o)| Some(o.as_str())).collect();
            columns.push(Arc::new(labels));
            continue;
        }
        columns.push(build_column(*kind, col_idx, rows, coerced));
    }

    let timestamps: Vec<i64> = (0..rows.len() as u64)
        .map(|offset| synthetic_timestamp(first_index + offset))
        .collect();
    columns.push(Arc::new(TimestampSecondArray::from(timestamps)));

    RecordBatch::try_new(schema.clone(), columns)
}

fn build_column(
    kind: ColumnKind,
    col_idx: usize,
    rows: &[(StringRecord, Outcome)],
    coerced: &mut u64,
) -> ArrayRef {
    match kind {
        ColumnKind::Int64 => {
            let mut builder = Int64Builder::with_capacity(rows.len());
            for (record, _) in rows {
                match cell(record, col_idx).map(str::parse::<i64>) {
                    Some(Ok(value)) => builder.append_value(value),
                    Some(Err(_)) => {
                        *coerced += 1;
                        builder.append_null();
                    }
                    None => builder.append_null(),
                }
            }
            Arc::new(builder.finish())
        }
        ColumnKind::Float64 => {
            let mut builder = Float64Builder::with_capacity(rows.len());
            for (record, _) in rows {
                match cell(record, col_idx).map(str::parse::<f64>) {
                    Some(Ok(value)) => builder.append_value(value),
                    Some(Err(_)) => {
                        *coerced += 1;
                        builder.append_null();
                    }
                    None => builder.append_null(),
                }
            }
            Arc::new(builder.finish())
        }
        ColumnKind::Utf8 => {
            let mut builder = StringBuilder::new();
            for (record, _) in rows {
                match cell(record, col_idx) {
                    Some(value) => builder.append_value(value),
                    None => builder.append_null(),
                }
            }
            Arc::new(builder.finish())
        }
    }
}

/// Trimmed cell value, or `None` for absent and NA-like cells.
fn cell(record: &StringRecord, idx: usize) -> Option<&str> {
    let raw = record.get(idx)?.trim();
    if NULL_TOKENS.contains(&raw) {
        None
    } else {
        Some(raw)
    }
}

fn staging_path(output_path: &Path) -> Result<PathBuf, IngestError> {
    let file_name = output_path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .ok_or_else(|| {
            IngestError::InvalidConfig(format!("invalid output path: {}", output_path.display()))
        })?;
    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(output_path.with_file_name(format!("{file_name}.tmp")))
}

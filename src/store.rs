//! Inclusive time-range reads over the ingested Parquet dataset.

use std::fs::File;
use std::path::{Path, PathBuf};

use arrow::array::{Array, ArrayRef, AsArray, BooleanArray, Scalar, TimestampSecondArray};
use arrow::compute::kernels::{boolean as boolean_kernels, cmp as cmp_kernels};
use arrow::compute::{cast, filter_record_batch, max, min};
use arrow::datatypes::{
    DataType, Float32Type, Float64Type, Int16Type, Int32Type, Int64Type, Int8Type, SchemaRef,
    TimeUnit, TimestampSecondType, UInt16Type, UInt32Type, UInt64Type, UInt8Type,
};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use arrow::util::display::{ArrayFormatter, FormatOptions};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ProjectionMask;
use parquet::errors::ParquetError;
use serde_json::{Map, Number, Value};
use thiserror::Error;
use tracing::debug;

use crate::timeline::{format_timestamp, TimeRange, TIMESTAMP_COLUMN};

const SCAN_BATCH_SIZE: usize = 8_192;

pub type JsonRow = Map<String, Value>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Parquet dataset not found. Please upload a dataset first.")]
    DatasetNotFound,
    #[error("column '{0}' is not present in the dataset")]
    UnknownColumn(String),
    #[error("timestamp column '{column}' has unsupported type {datatype}")]
    UnsupportedTimeType { column: String, datatype: DataType },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("arrow error: {0}")]
    Arrow(#[from] ArrowError),
    #[error("parquet error: {0}")]
    Parquet(#[from] ParquetError),
}

/// Read handle on the dataset file. Every scan reopens the file, so a dataset
/// replaced by a new upload is picked up by the next `open`.
#[derive(Debug, Clone)]
pub struct DatasetStore {
    path: PathBuf,
    schema: SchemaRef,
    ts_idx: usize,
}

impl DatasetStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if !path.is_file() {
            return Err(StoreError::DatasetNotFound);
        }

        let builder = ParquetRecordBatchReaderBuilder::try_new(File::open(&path)?)?;
        let schema = builder.schema().clone();
        let ts_idx = schema
            .index_of(TIMESTAMP_COLUMN)
            .map_err(|_| StoreError::UnknownColumn(TIMESTAMP_COLUMN.to_string()))?;

        Ok(Self {
            path,
            schema,
            ts_idx,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    pub fn total_rows(&self) -> Result<u64, StoreError> {
        let builder = ParquetRecordBatchReaderBuilder::try_new(File::open(&self.path)?)?;
        Ok(builder.metadata().file_metadata().num_rows().max(0) as u64)
    }

    /// Earliest and latest synthetic timestamps, or `None` for an empty file.
    pub fn time_bounds(&self) -> Result<Option<(i64, i64)>, StoreError> {
        let mut bounds: Option<(i64, i64)> = None;
        for batch in self.scan_columns(&[self.ts_idx])? {
            let ts = seconds_column(batch?.column(0))?;
            let (Some(lo), Some(hi)) = (min(&ts), max(&ts)) else {
                continue;
            };
            bounds = Some(match bounds {
                Some((cur_lo, cur_hi)) => (cur_lo.min(lo), cur_hi.max(hi)),
                None => (lo, hi),
            });
        }
        Ok(bounds)
    }

    /// Number of rows with `range.start <= ts <= range.end`. Only the timestamp
    /// column is decoded.
    pub fn count_in_range(&self, range: &TimeRange) -> Result<u64, StoreError> {
        if range.is_empty() {
            return Ok(0);
        }
        let mut count = 0u64;
        for batch in self.scan_columns(&[self.ts_idx])? {
            let ts = seconds_column(batch?.column(0))?;
            count += range_mask(&ts, range)?.true_count() as u64;
        }
        debug!(
            component = "store",
            event = "store.count",
            start = range.start,
            end = range.end,
            count
        );
        Ok(count)
    }

    /// Rows inside the inclusive range, projected to `columns` (all columns
    /// when `None`) in file order.
    pub fn read_range(
        &self,
        range: &TimeRange,
        columns: Option<&[String]>,
    ) -> Result<Vec<RecordBatch>, StoreError> {
        let wanted = match columns {
            Some(names) => {
                let mut indices = names
                    .iter()
                    .map(|name| {
                        self.schema
                            .index_of(name)
                            .map_err(|_| StoreError::UnknownColumn(name.clone()))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                indices.sort_unstable();
                indices.dedup();
                indices
            }
            None => (0..self.schema.fields().len()).collect(),
        };

        let mut scanned = wanted.clone();
        if !scanned.contains(&self.ts_idx) {
            scanned.push(self.ts_idx);
            scanned.sort_unstable();
        }
        let ts_pos = scanned
            .iter()
            .position(|idx| *idx == self.ts_idx)
            .unwrap_or_default();
        let keep: Vec<usize> = scanned
            .iter()
            .enumerate()
            .filter(|(_, idx)| wanted.contains(idx))
            .map(|(pos, _)| pos)
            .collect();

        let mut out = Vec::new();
        if range.is_empty() {
            return Ok(out);
        }

        for batch in self.scan_columns(&scanned)? {
            let batch = batch?;
            let ts = seconds_column(batch.column(ts_pos))?;
            let mask = range_mask(&ts, range)?;
            if mask.true_count() == 0 {
                continue;
            }
            let filtered = filter_record_batch(&batch, &mask)?;
            out.push(filtered.project(&keep)?);
        }

        debug!(
            component = "store",
            event = "store.read_range",
            start = range.start,
            end = range.end,
            batches = out.len(),
            rows = out.iter().map(RecordBatch::num_rows).sum::<usize>()
        );
        Ok(out)
    }

    fn scan_columns(
        &self,
        indices: &[usize],
    ) -> Result<impl Iterator<Item = Result<RecordBatch, ArrowError>>, StoreError> {
        let builder = ParquetRecordBatchReaderBuilder::try_new(File::open(&self.path)?)?;
        let mask = ProjectionMask::roots(builder.parquet_schema(), indices.iter().copied());
        let reader = builder
            .with_projection(mask)
            .with_batch_size(SCAN_BATCH_SIZE)
            .build()?;
        Ok(reader)
    }
}

/// The timestamp column as whole seconds, casting from other units if the file
/// was not written by this crate.
fn seconds_column(column: &ArrayRef) -> Result<TimestampSecondArray, StoreError> {
    match column.data_type() {
        DataType::Timestamp(TimeUnit::Second, None) => {
            Ok(column.as_primitive::<TimestampSecondType>().clone())
        }
        DataType::Timestamp(_, _) => {
            let casted = cast(column, &DataType::Timestamp(TimeUnit::Second, None))?;
            Ok(casted.as_primitive::<TimestampSecondType>().clone())
        }
        other => Err(StoreError::UnsupportedTimeType {
            column: TIMESTAMP_COLUMN.to_string(),
            datatype: other.clone(),
        }),
    }
}

/// `start <= ts <= end`, with null timestamps never matching.
fn range_mask(ts: &TimestampSecondArray, range: &TimeRange) -> Result<BooleanArray, ArrowError> {
    let start = Scalar::new(TimestampSecondArray::from(vec![range.start]));
    let end = Scalar::new(TimestampSecondArray::from(vec![range.end]));
    let ge = cmp_kernels::gt_eq(ts, &start)?;
    let le = cmp_kernels::lt_eq(ts, &end)?;
    let mask = boolean_kernels::and(&ge, &le)?;
    // nulls in the mask count as unset for true_count and filter alike
    Ok(mask)
}

/// Converts record batches to JSON objects keyed by column name.
pub fn rows_as_json(batches: &[RecordBatch]) -> Vec<JsonRow> {
    let mut rows = Vec::with_capacity(batches.iter().map(RecordBatch::num_rows).sum());
    for batch in batches {
        let schema = batch.schema();
        let columns: Vec<Vec<Value>> = batch.columns().iter().map(column_values).collect();
        for row_idx in 0..batch.num_rows() {
            let mut row = Map::with_capacity(columns.len());
            for (field, values) in schema.fields().iter().zip(&columns) {
                let value = values.get(row_idx).cloned().unwrap_or(Value::Null);
                row.insert(field.name().clone(), value);
            }
            rows.push(row);
        }
    }
    rows
}

fn column_values(column: &ArrayRef) -> Vec<Value> {
    macro_rules! numbers {
        ($ty:ty, $conv:expr) => {{
            let arr = column.as_primitive::<$ty>();
            (0..arr.len())
                .map(|i| {
                    if arr.is_null(i) {
                        Value::Null
                    } else {
                        $conv(arr.value(i))
                    }
                })
                .collect()
        }};
    }

    match column.data_type() {
        DataType::Int8 => numbers!(Int8Type, |v: i8| Value::from(v)),
        DataType::Int16 => numbers!(Int16Type, |v: i16| Value::from(v)),
        DataType::Int32 => numbers!(Int32Type, |v: i32| Value::from(v)),
        DataType::Int64 => numbers!(Int64Type, |v: i64| Value::from(v)),
        DataType::UInt8 => numbers!(UInt8Type, |v: u8| Value::from(v)),
        DataType::UInt16 => numbers!(UInt16Type, |v: u16| Value::from(v)),
        DataType::UInt32 => numbers!(UInt32Type, |v: u32| Value::from(v)),
        DataType::UInt64 => numbers!(UInt64Type, |v: u64| Value::from(v)),
        DataType::Float32 => numbers!(Float32Type, |v: f32| float_value(f64::from(v))),
        DataType::Float64 => numbers!(Float64Type, float_value),
        DataType::Boolean => {
            let arr = column.as_boolean();
            (0..arr.len())
                .map(|i| {
                    if arr.is_null(i) {
                        Value::Null
                    } else {
                        Value::Bool(arr.value(i))
                    }
                })
                .collect()
        }
        DataType::Utf8 => {
            let arr = column.as_string::<i32>();
            (0..arr.len())
                .map(|i| {
                    if arr.is_null(i) {
                        Value::Null
                    } else {
                        Value::String(arr.value(i).to_string())
                    }
                })
                .collect()
        }
        DataType::Timestamp(_, _) => match seconds_column(column) {
            Ok(arr) => (0..arr.len())
                .map(|i| {
                    if arr.is_null(i) {
                        Value::Null
                    } else {
                        Value::String(format_timestamp(arr.value(i)))
                    }
                })
                .collect(),
            Err(_) => vec![Value::Null; column.len()],
        },
        _ => display_values(column),
    }
}

fn display_values(column: &ArrayRef) -> Vec<Value> {
    let options = FormatOptions::default();
    let Ok(formatter) = ArrayFormatter::try_new(column.as_ref(), &options) else {
        return vec![Value::Null; column.len()];
    };
    (0..column.len())
        .map(|i| {
            if column.is_null(i) {
                Value::Null
            } else {
                Value::String(formatter.value(i).to_string())
            }
        })
        .collect()
}

fn float_value(v: f64) -> Value {
    Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use arrow::array::{Float64Array, Int64Array, StringArray};
    use arrow::datatypes::{Field, Schema};

    #[test]
    fn range_mask_is_inclusive_on_both_ends() {
        let ts = TimestampSecondArray::from(vec![Some(10), Some(11), None, Some(12), Some(13)]);
        let range = TimeRange::new(11, 12).unwrap();
        let mask = range_mask(&ts, &range).unwrap();

        assert_eq!(mask.true_count(), 2);
        assert!(mask.value(1));
        assert!(mask.value(3));
        assert!(!mask.value(0));
        assert!(!mask.value(4));
    }

    #[test]
    fn json_rows_keep_types_and_nulls() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, true),
            Field::new("temp", DataType::Float64, true),
            Field::new("Response", DataType::Utf8, false),
            Field::new(
                TIMESTAMP_COLUMN,
                DataType::Timestamp(TimeUnit::Second, None),
                false,
            ),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![Some(1), None])),
                Arc::new(Float64Array::from(vec![Some(71.5), Some(f64::NAN)])),
                Arc::new(StringArray::from(vec!["pass", "fail"])),
                Arc::new(TimestampSecondArray::from(vec![
                    crate::timeline::SYNTHETIC_EPOCH_SECS,
                    crate::timeline::SYNTHETIC_EPOCH_SECS + 1,
                ])),
            ],
        )
        .unwrap();

        let rows = rows_as_json(&[batch]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["id"], 1);
        assert_eq!(rows[0]["temp"], 71.5);
        assert_eq!(rows[0]["Response"], "pass");
        assert_eq!(rows[0][TIMESTAMP_COLUMN], "2025-08-01T00:00:00");
        assert_eq!(rows[1]["id"], Value::Null);
        assert_eq!(rows[1]["temp"], Value::Null);
        assert_eq!(rows[1][TIMESTAMP_COLUMN], "2025-08-01T00:00:01");
    }

    #[test]
    fn missing_file_is_reported_as_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = DatasetStore::open(dir.path().join("nope.parquet")).unwrap_err();
        assert!(matches!(err, StoreError::DatasetNotFound));
    }
}

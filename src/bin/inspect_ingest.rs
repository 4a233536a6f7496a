use std::path::PathBuf;

use intelli_inspect::{
    format_timestamp, ingest_csv_file, init_logging, logging_config_from_env,
    service_config_from_env, DatasetStore,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging(&logging_config_from_env())?;

    let csv_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("INSPECT_INGEST_CSV").ok())
        .map(PathBuf::from)
        .ok_or("usage: inspect_ingest <path/to/dataset.csv> (or set INSPECT_INGEST_CSV)")?;

    let config = service_config_from_env();
    config.ensure_dirs()?;
    let output = config.dataset_path();

    println!(
        "Ingest start | source={} output={} chunk_size={}",
        csv_path.display(),
        output.display(),
        config.chunk_size
    );

    let report = ingest_csv_file(&csv_path, &output, &config.ingest_config())?;

    println!(
        "Ingest done | records={} pass_rate={}% columns={} chunks={} dropped={} coerced={}",
        report.total_records,
        report.pass_rate_pct(),
        report.column_count,
        report.chunks_read,
        report.dropped_rows,
        report.coerced_values
    );
    println!(
        "Synthetic range | {} .. {}",
        format_timestamp(report.first_timestamp),
        format_timestamp(report.last_timestamp)
    );

    let store = DatasetStore::open(&output)?;
    println!(
        "Stored rows={} schema_fields={}",
        store.total_rows()?,
        store.schema().fields().len()
    );

    Ok(())
}

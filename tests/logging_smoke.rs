use std::io;
use std::io::{Cursor, Write};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use intelli_inspect::{
    ingest_csv, inspect_router, log_app_bind, log_app_start, log_service_config, AppState,
    IngestConfig, LoggingConfig, ModelRegistry, ServiceConfig,
};
use tower::util::ServiceExt;
use tracing::dispatcher::with_default;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriter;

#[derive(Clone, Default)]
struct SharedWriter {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedWriter {
    fn output_string(&self) -> String {
        let bytes = self
            .inner
            .lock()
            .expect("writer lock should not be poisoned");
        String::from_utf8_lossy(&bytes).to_string()
    }
}

struct SharedWriterGuard {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl<'a> MakeWriter<'a> for SharedWriter {
    type Writer = SharedWriterGuard;

    fn make_writer(&'a self) -> Self::Writer {
        SharedWriterGuard {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Write for SharedWriterGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut out = self
            .inner
            .lock()
            .expect("writer lock should not be poisoned");
        out.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn capture_logs(max_level: Level, f: impl FnOnce()) -> String {
    let writer = SharedWriter::default();
    let subscriber = tracing_subscriber::fmt()
        .json()
        .with_ansi(false)
        .with_max_level(max_level)
        .with_writer(writer.clone())
        .finish();
    let dispatch = tracing::Dispatch::new(subscriber);

    with_default(&dispatch, f);
    writer.output_string()
}

fn sample_csv(rows: usize) -> String {
    let mut csv = String::from("Sample_ID,temperature,Response\n");
    for i in 0..rows {
        let label = if i % 4 == 0 { "fail" } else { "pass" };
        csv.push_str(&format!("S{i},{}.5,{label}\n", 60 + i % 9));
    }
    csv
}

#[test]
fn ingest_logs_chunk_progress_and_finish() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let output = dir.path().join("dataset.parquet");
    let csv = format!("{}S-bad,61.0,maybe\n", sample_csv(10));

    let logs = capture_logs(Level::DEBUG, || {
        let report = ingest_csv(
            Cursor::new(csv.into_bytes()),
            &output,
            &IngestConfig { chunk_size: 4 },
        )
        .expect("ingest should succeed");
        assert_eq!(report.total_records, 10);
        assert_eq!(report.dropped_rows, 1);
    });

    assert!(logs.contains("\"event\":\"ingest.chunk\""));
    assert!(logs.contains("\"event\":\"ingest.finish\""));
    assert!(logs.contains("\"component\":\"ingest\""));
}

#[test]
fn ingest_failure_is_logged_and_leaves_no_dataset() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let output = dir.path().join("dataset.parquet");

    let logs = capture_logs(Level::INFO, || {
        let result = ingest_csv(
            Cursor::new(b"Sample_ID,temperature\nS1,1.0\n".to_vec()),
            &output,
            &IngestConfig::default(),
        );
        assert!(result.is_err());
    });

    assert!(logs.contains("\"event\":\"ingest.error\""));
    assert!(!output.exists());
}

#[test]
fn server_lifecycle_helpers_emit_baseline_events() {
    let logs = capture_logs(Level::INFO, || {
        let cfg = LoggingConfig::default();
        log_app_start(&cfg);
        log_service_config(&ServiceConfig::default());
        log_app_bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8000), false);
    });

    assert!(logs.contains("\"event\":\"app.start\""));
    assert!(logs.contains("\"event\":\"config.loaded\""));
    assert!(logs.contains("\"event\":\"app.bind\""));
    assert!(logs.contains("/feature-importance"));
}

#[test]
fn registry_startup_reports_missing_artifacts() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let logs = capture_logs(Level::INFO, || {
        let registry = ModelRegistry::load_from_dir(dir.path());
        assert!(registry.current().is_none());
    });

    assert!(logs.contains("\"event\":\"model.absent\""));
}

#[test]
fn record_counts_route_emits_http_event() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let config = ServiceConfig::in_dir(dir.path());
    config.ensure_dirs().expect("dirs should be created");
    ingest_csv(
        Cursor::new(sample_csv(30).into_bytes()),
        &config.dataset_path(),
        &IngestConfig::default(),
    )
    .expect("ingest should succeed");
    let registry = ModelRegistry::empty(&config.model_dir);

    let logs = capture_logs(Level::INFO, || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("single-thread runtime should build");

        rt.block_on(async {
            let app = inspect_router(AppState::new(config, registry));
            let body = serde_json::json!({
                "trainingPeriod": {"startDate": "2025-08-01T00:00:00", "endDate": "2025-08-01T00:00:09"},
                "testingPeriod": {"startDate": "2025-08-01T00:00:10", "endDate": "2025-08-01T00:00:19"},
                "simulationPeriod": {"startDate": "2025-08-01T00:00:20", "endDate": "2025-08-01T00:00:29"}
            });

            let response = app
                .oneshot(
                    Request::builder()
                        .method("POST")
                        .uri("/get-record-counts-for-ranges")
                        .header(header::CONTENT_TYPE, "application/json")
                        .body(Body::from(body.to_string()))
                        .expect("request should build"),
                )
                .await
                .expect("record counts request should succeed");

            assert_eq!(response.status(), StatusCode::OK);
        });
    });

    assert!(logs.contains("\"event\":\"http.record_counts\""));
}

//! Logging setup and the server lifecycle events.

use std::env;
use std::net::SocketAddr;

use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::ROUTES;
use crate::config::ServiceConfig;

const DEFAULT_LEVEL: &str = "info";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
    Compact,
}

impl LogFormat {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "pretty" => Some(Self::Pretty),
            "compact" => Some(Self::Compact),
            _ => None,
        }
    }

    fn ansi(self) -> bool {
        !matches!(self, Self::Json)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LEVEL.to_string(),
            format: LogFormat::Pretty,
            include_target: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum LoggingInitError {
    #[error("logging already initialized: {0}")]
    AlreadyInitialized(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Reads `INSPECT_LOG_LEVEL`, `INSPECT_LOG_FORMAT` and `INSPECT_LOG_TARGET`.
/// Values that do not parse keep the default.
pub fn logging_config_from_env() -> LoggingConfig {
    let defaults = LoggingConfig::default();
    let read = |key: &str| env::var(key).ok().filter(|raw| !raw.trim().is_empty());

    LoggingConfig {
        level: read("INSPECT_LOG_LEVEL")
            .map(|raw| raw.trim().to_string())
            .unwrap_or(defaults.level),
        format: read("INSPECT_LOG_FORMAT")
            .and_then(|raw| LogFormat::parse(&raw))
            .unwrap_or(defaults.format),
        include_target: read("INSPECT_LOG_TARGET")
            .and_then(|raw| parse_bool(&raw))
            .unwrap_or(defaults.include_target),
    }
}

pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingInitError> {
    let env_filter =
        EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(config.include_target)
        .with_ansi(config.format.ansi());

    match config.format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
        LogFormat::Pretty => tracing::subscriber::set_global_default(builder.pretty().finish())?,
        LogFormat::Compact => {
            tracing::subscriber::set_global_default(builder.compact().finish())?
        }
    }

    Ok(())
}

pub fn log_app_start(config: &LoggingConfig) {
    info!(
        component = "inspect_server",
        event = "app.start",
        version = env!("CARGO_PKG_VERSION"),
        log_level = %config.level,
        log_format = ?config.format,
        include_target = config.include_target
    );
}

pub fn log_service_config(config: &ServiceConfig) {
    info!(
        component = "inspect_server",
        event = "config.loaded",
        addr = %config.addr,
        data_dir = %config.data_dir.display(),
        model_dir = %config.model_dir.display(),
        chunk_size = config.chunk_size,
        max_upload_bytes = config.max_upload_bytes,
        train_rounds = config.training.rounds,
        dataset_present = config.dataset_path().is_file()
    );
}

pub fn log_app_bind(bound_addr: SocketAddr, model_loaded: bool) {
    info!(
        component = "inspect_server",
        event = "app.bind",
        bind_addr = %bound_addr,
        routes = ?ROUTES,
        model_loaded
    );
}

/// Resolves on Ctrl-C so `axum::serve` can drain in-flight requests.
pub async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!(
            component = "inspect_server",
            event = "app.shutdown",
            reason = "ctrl_c"
        ),
        Err(err) => {
            warn!(
                component = "inspect_server",
                event = "app.shutdown.signal_error",
                error = %err
            );
            std::future::pending::<()>().await;
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

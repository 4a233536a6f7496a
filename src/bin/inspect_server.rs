use intelli_inspect::{
    init_logging, inspect_router, log_app_bind, log_app_start, log_service_config,
    logging_config_from_env, service_config_from_env, shutdown_signal, AppState, ModelRegistry,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logging_cfg = logging_config_from_env();
    init_logging(&logging_cfg)?;
    log_app_start(&logging_cfg);

    let config = service_config_from_env();
    config.ensure_dirs()?;
    log_service_config(&config);

    let registry = ModelRegistry::load_from_dir(&config.model_dir);
    let model_loaded = registry.current().is_some();
    let addr = config.addr;

    let app = inspect_router(AppState::new(config, registry));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    log_app_bind(bound_addr, model_loaded);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

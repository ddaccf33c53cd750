use anyhow::Context;
use common::TelemetryGuard;
use gateway::{
    AppState,
    config::{Config, get_configuration},
    logging::setup_logging,
    run_server,
    uploads::UploadStore,
};
use inference::load_plate_detector;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = get_configuration().context("failed to load configuration")?;

    let _telemetry = match &config.otel_endpoint {
        Some(endpoint) => Some(TelemetryGuard::init(
            "gateway",
            endpoint,
            config.log_level,
            config.environment,
        )?),
        None => {
            setup_logging(&config);
            None
        }
    };

    tracing::info!(
        environment = config.environment.as_str(),
        "Starting license plate detection service"
    );
    log_environment(&config);

    let detector = {
        let detector_config = config.detector.clone();
        let ocr_config = config.ocr.clone();
        let limits = config.limits.clone();
        tokio::task::spawn_blocking(move || {
            load_plate_detector(&detector_config, &ocr_config, &limits)
        })
        .await?
        .context("failed to load detection model")?
    };

    let uploads = UploadStore::init(&config.uploads)
        .await
        .context("failed to prepare upload directory")?;

    let state = AppState::new(Arc::new(detector), config.limits.clone(), uploads);
    run_server(&config.server, state).await
}

fn log_environment(config: &Config) {
    let model = &config.detector.model_path;
    tracing::info!(
        model_path = %model.display(),
        model_exists = model.exists(),
        enable_gpu = config.detector.enable_gpu,
        "Detection model"
    );

    match &config.ocr.model_path {
        Some(path) => tracing::info!(
            ocr_model_path = %path.display(),
            ocr_model_exists = path.exists(),
            "OCR model"
        ),
        None => tracing::info!("OCR model not configured"),
    }

    if config.uploads.enabled {
        tracing::info!(dir = %config.uploads.dir.display(), "Upload persistence enabled");
    }

    tracing::debug!(
        max_file_size = %config.limits.max_file_size_label(),
        min_image_size = config.limits.min_image_size,
        max_image_size = config.limits.max_image_size,
        "Upload limits"
    );
}

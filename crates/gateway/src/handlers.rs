use crate::error::ApiError;
use crate::state::{API_VERSION, AppState, MemoryUsage, SERVICE_NAME, SystemMonitor, round2};
use axum::{
    Json,
    extract::{Multipart, State, multipart::MultipartRejection},
};
use inference::{
    PlateDetection,
    image_utils::{load_upload, validate_upload},
};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

const FILE_FIELD: &str = "file";

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub success: bool,
    pub plates: Vec<PlateDetection>,
    pub count: usize,
    pub processing_time: f64,
    pub filename: String,
    pub file_size_mb: f64,
    pub api_version: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum MemoryReport {
    Usage(MemoryUsage),
    Unavailable { error: String },
}

impl From<Result<MemoryUsage, String>> for MemoryReport {
    fn from(reading: Result<MemoryUsage, String>) -> Self {
        match reading {
            Ok(usage) => MemoryReport::Usage(usage),
            Err(error) => MemoryReport::Unavailable { error },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub timestamp: f64,
    pub uptime_seconds: f64,
    pub models_loaded: bool,
    pub ocr_enabled: bool,
    pub memory_usage: MemoryReport,
    pub max_file_size: String,
}

#[derive(Debug, Serialize)]
pub struct RootResponse {
    pub message: &'static str,
    pub status: &'static str,
    pub version: &'static str,
    pub max_file_size: String,
    pub supported_formats: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SystemInfoResponse {
    pub cpu_percent: f32,
    pub memory: MemoryReport,
    pub device: &'static str,
}

/// `POST /predict`: detect plates in the multipart `file` field.
pub async fn predict(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
    let started = Instant::now();
    let result = run_prediction(&state, multipart, started).await;

    match &result {
        Ok(response) => state
            .metrics
            .record_success(started.elapsed(), response.count),
        Err(err) => state.metrics.record_failure(started.elapsed(), err.outcome()),
    }

    result.map(Json)
}

async fn run_prediction(
    state: &AppState,
    multipart: Result<Multipart, MultipartRejection>,
    started: Instant,
) -> Result<PredictResponse, ApiError> {
    let mut multipart = multipart.map_err(|e| ApiError::Multipart(e.body_text()))?;
    let max_file_size = state.limits.max_file_size;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::from_multipart(e, max_file_size))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let filename = field.file_name().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::from_multipart(e, max_file_size))?;
        upload = Some((filename, bytes));
        break;
    }

    let (filename, bytes) = upload.ok_or(ApiError::MissingFile)?;
    validate_upload(filename.as_deref(), bytes.len(), &state.limits)?;
    let filename = filename.unwrap_or_default();

    tracing::info!(
        filename = %filename,
        size_mb = round2(bytes.len() as f64 / (1024.0 * 1024.0)),
        "Processing upload"
    );

    state.uploads.save(&filename, &bytes).await;

    let detector = Arc::clone(&state.detector);
    let limits = Arc::clone(&state.limits);
    let decode_and_detect = bytes.clone();
    let plates = tokio::task::spawn_blocking(move || {
        let image = load_upload(&decode_and_detect, &limits)?;
        detector.detect(image)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("detection task failed: {}", e)))??;

    let processing_time = round3(started.elapsed().as_secs_f64());
    tracing::info!(
        plates = plates.len(),
        processing_time,
        "Prediction complete"
    );

    Ok(PredictResponse {
        success: true,
        count: plates.len(),
        plates,
        processing_time,
        filename,
        file_size_mb: round2(bytes.len() as f64 / (1024.0 * 1024.0)),
        api_version: API_VERSION,
    })
}

/// `GET /health`: liveness; only reachable once the model has loaded.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let memory_usage = read_memory(Arc::clone(&state.monitor)).await;

    Json(HealthResponse {
        status: "healthy",
        service: SERVICE_NAME,
        version: API_VERSION,
        timestamp: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default(),
        uptime_seconds: round2(state.started_at.elapsed().as_secs_f64()),
        models_loaded: true,
        ocr_enabled: state.detector.ocr_enabled(),
        memory_usage,
        max_file_size: state.limits.max_file_size_label(),
    })
}

/// `GET /`
pub async fn root(State(state): State<AppState>) -> Json<RootResponse> {
    Json(RootResponse {
        message: "License Plate Detection API is running",
        status: "healthy",
        version: API_VERSION,
        max_file_size: state.limits.max_file_size_label(),
        supported_formats: state.limits.supported_formats(),
    })
}

/// `GET /system-info`
pub async fn system_info(State(state): State<AppState>) -> Json<SystemInfoResponse> {
    let monitor = Arc::clone(&state.monitor);
    let cpu_percent = tokio::task::spawn_blocking(move || monitor.cpu_percent())
        .await
        .unwrap_or_default();
    let memory = read_memory(Arc::clone(&state.monitor)).await;

    Json(SystemInfoResponse {
        cpu_percent,
        memory,
        device: state.detector.device(),
    })
}

async fn read_memory(monitor: Arc<SystemMonitor>) -> MemoryReport {
    tokio::task::spawn_blocking(move || monitor.memory_usage())
        .await
        .unwrap_or_else(|e| Err(e.to_string()))
        .into()
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

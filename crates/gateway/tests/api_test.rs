use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use gateway::{AppState, build_router, config::UploadConfig, uploads::UploadStore};
use http_body_util::BodyExt;
use image::{ImageFormat, Rgb, RgbImage};
use inference::{DetectorConfig, ImageLimits, PlateDetector, mock::MockBackend};
use serde_json::Value;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const BOUNDARY: &str = "plate-test-boundary";

fn app_with(backend: MockBackend, limits: ImageLimits) -> Router {
    let detector = PlateDetector::new(backend, &DetectorConfig::default(), &limits).unwrap();
    let state = AppState::new(Arc::new(detector), limits, UploadStore::disabled());
    build_router(state, Duration::from_secs(30))
}

fn app() -> Router {
    // One plate centered in a 640x640 upload
    let backend = MockBackend::with_boxes(vec![(320.0, 320.0, 200.0, 60.0, 0.91)]);
    app_with(backend, ImageLimits::default())
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, Rgb([120, 130, 140]));
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

fn multipart_body(field: &str, filename: Option<&str>, content: &[u8]) -> Vec<u8> {
    let disposition = match filename {
        Some(name) => format!("form-data; name=\"{}\"; filename=\"{}\"", field, name),
        None => format!("form-data; name=\"{}\"", field),
    };

    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(format!("Content-Disposition: {}\r\n", disposition).as_bytes());
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn predict_request(body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/predict")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn health_reports_loaded_model() {
    let (status, json) = send(app(), get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["service"], "license-plate-detection-api");
    assert_eq!(json["version"], "2.0.0");
    assert_eq!(json["models_loaded"], true);
    assert_eq!(json["ocr_enabled"], false);
    assert_eq!(json["max_file_size"], "30MB");
    assert!(json["timestamp"].as_f64().unwrap() > 0.0);
    assert!(json["uptime_seconds"].as_f64().unwrap() >= 0.0);
    assert!(json["memory_usage"].is_object());
}

#[tokio::test]
async fn root_lists_supported_formats() {
    let (status, json) = send(app(), get("/")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "License Plate Detection API is running");
    let formats = json["supported_formats"].as_array().unwrap();
    assert!(formats.contains(&Value::from(".jpg")));
    assert!(formats.contains(&Value::from(".png")));
}

#[tokio::test]
async fn system_info_reports_device() {
    let (status, json) = send(app(), get("/system-info")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["device"], "cpu");
    assert!(json["cpu_percent"].is_number());
    assert!(json["memory"].is_object());
}

#[tokio::test]
async fn predict_returns_detections() {
    let body = multipart_body("file", Some("car.png"), &png(640, 640));
    let (status, json) = send(app(), predict_request(body)).await;

    assert_eq!(status, StatusCode::OK, "body: {}", json);
    assert_eq!(json["success"], true);
    assert_eq!(json["count"], 1);
    assert_eq!(json["filename"], "car.png");
    assert_eq!(json["api_version"], "2.0.0");
    assert!(json["processing_time"].as_f64().unwrap() >= 0.0);

    let plate = &json["plates"][0];
    assert_eq!(plate["bbox"], serde_json::json!([220, 290, 420, 350]));
    assert_eq!(plate["class_name"], "license_plate");
    assert!((plate["confidence"].as_f64().unwrap() - 0.91).abs() < 1e-3);
    assert!(plate.get("text").is_none());
}

#[tokio::test]
async fn predict_with_no_plates_returns_empty_list() {
    let app = app_with(MockBackend::empty(), ImageLimits::default());
    let body = multipart_body("file", Some("empty_road.jpg"), &png(800, 600));
    let (status, json) = send(app, predict_request(body)).await;

    assert_eq!(status, StatusCode::OK, "body: {}", json);
    assert_eq!(json["count"], 0);
    assert_eq!(json["plates"], serde_json::json!([]));
}

#[tokio::test]
async fn missing_file_field_is_client_error() {
    let body = multipart_body("image", Some("car.png"), &png(640, 640));
    let (status, json) = send(app(), predict_request(body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["status_code"], 400);
    assert_eq!(json["error"], "No file provided");
}

#[tokio::test]
async fn file_without_name_is_client_error() {
    let body = multipart_body("file", None, &png(640, 640));
    let (status, json) = send(app(), predict_request(body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["status_code"], 400);
}

#[tokio::test]
async fn non_multipart_body_is_client_error() {
    let request = Request::builder()
        .method("POST")
        .uri("/predict")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let (status, json) = send(app(), request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["status_code"], 400);
}

#[tokio::test]
async fn unsupported_extension_is_client_error() {
    let body = multipart_body("file", Some("notes.txt"), b"hello");
    let (status, json) = send(app(), predict_request(body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().starts_with("Unsupported file type"));
}

#[tokio::test]
async fn non_image_payload_is_client_error() {
    let body = multipart_body("file", Some("car.jpg"), b"this is not a jpeg at all");
    let (status, json) = send(app(), predict_request(body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["status_code"], 400);
}

#[tokio::test]
async fn too_small_image_is_client_error() {
    let body = multipart_body("file", Some("tiny.png"), &png(200, 200));
    let (status, json) = send(app(), predict_request(body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("Image too small"));
}

#[tokio::test]
async fn oversized_payload_is_rejected() {
    let limits = ImageLimits {
        max_file_size: 1024,
        ..ImageLimits::default()
    };
    let app = app_with(MockBackend::empty(), limits);
    let body = multipart_body("file", Some("big.png"), &vec![0u8; 4096]);
    let (status, json) = send(app, predict_request(body)).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(json["status_code"], 413);
}

#[tokio::test]
async fn body_over_router_limit_is_rejected() {
    let limits = ImageLimits {
        max_file_size: 1024,
        ..ImageLimits::default()
    };
    let app = app_with(MockBackend::empty(), limits);
    // Past max_file_size plus the multipart allowance, so the body limit trips first
    let body = multipart_body("file", Some("huge.png"), &vec![0u8; 2 * 1024 * 1024]);
    let (status, json) = send(app, predict_request(body)).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(json["status_code"], 413);
    assert_eq!(json["error"], "File size exceeds 1KB limit");
}

#[tokio::test]
async fn predict_persists_upload_when_enabled() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("uploads");
    let uploads = UploadStore::init(&UploadConfig {
        enabled: true,
        dir: dir.clone(),
    })
    .await
    .unwrap();

    let limits = ImageLimits::default();
    let backend = MockBackend::with_boxes(vec![(320.0, 320.0, 200.0, 60.0, 0.91)]);
    let detector = PlateDetector::new(backend, &DetectorConfig::default(), &limits).unwrap();
    let app = build_router(
        AppState::new(Arc::new(detector), limits, uploads),
        Duration::from_secs(30),
    );

    let image = png(640, 640);
    let body = multipart_body("file", Some("my car.png"), &image);
    let (status, json) = send(app, predict_request(body)).await;
    assert_eq!(status, StatusCode::OK, "body: {}", json);

    let stored: Vec<_> = std::fs::read_dir(&dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    assert_eq!(stored.len(), 1);

    let name = stored[0].file_name().unwrap().to_string_lossy().into_owned();
    let (id, original) = name.split_once('_').unwrap();
    assert!(uuid::Uuid::parse_str(id).is_ok(), "stored as {}", name);
    assert_eq!(original, "my car.png");
    assert_eq!(std::fs::read(&stored[0]).unwrap(), image);
}

#[tokio::test]
async fn inference_failure_is_server_error() {
    let app = app_with(MockBackend::failing(), ImageLimits::default());
    let body = multipart_body("file", Some("car.png"), &png(640, 640));
    let (status, json) = send(app, predict_request(body)).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["status_code"], 500);
}

#[tokio::test]
async fn repeated_requests_are_stable() {
    let app = app();
    let image = png(640, 480);

    let mut responses = Vec::new();
    for _ in 0..3 {
        let body = multipart_body("file", Some("car.png"), &image);
        let (status, json) = send(app.clone(), predict_request(body)).await;
        assert_eq!(status, StatusCode::OK);
        responses.push(json["plates"].clone());
    }

    assert_eq!(responses[0], responses[1]);
    assert_eq!(responses[1], responses[2]);

    let (status, _) = send(app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn traceparent_header_is_accepted() {
    let request = Request::builder()
        .uri("/health")
        .header(
            "traceparent",
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
        )
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(app(), request).await;
    assert_eq!(status, StatusCode::OK);
}

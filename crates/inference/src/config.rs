use serde::Deserialize;
use std::path::PathBuf;

pub const DEFAULT_INPUT_SIZE: u32 = 640;
pub const DEFAULT_OCR_ALPHABET: &str = "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ ";

/// Detection model settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub model_path: PathBuf,
    /// Square model input edge in pixels
    pub input_size: u32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
    pub enable_gpu: bool,
    /// Fallback label table when the model carries no `names` metadata
    pub class_names: Vec<String>,
    /// Labels treated as license plates (case-insensitive)
    pub plate_classes: Vec<String>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("yolov8best.onnx"),
            input_size: DEFAULT_INPUT_SIZE,
            confidence_threshold: 0.5,
            iou_threshold: 0.45,
            max_detections: 20,
            enable_gpu: false,
            class_names: vec!["license_plate".to_string()],
            plate_classes: vec![
                "plate".to_string(),
                "license_plate".to_string(),
                "number_plate".to_string(),
            ],
        }
    }
}

/// Plate text recognition settings. OCR is off unless `model_path` is set.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    pub model_path: Option<PathBuf>,
    /// Characters in model output order, excluding the CTC blank at index 0
    pub alphabet: String,
    pub min_confidence: f32,
    pub input_height: u32,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            alphabet: DEFAULT_OCR_ALPHABET.to_string(),
            min_confidence: 0.6,
            input_height: 48,
        }
    }
}

/// Upload validation limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImageLimits {
    pub max_file_size: usize,
    pub min_image_size: u32,
    /// Longest side processed at full resolution; larger images are downscaled
    pub max_image_size: u32,
    pub allowed_extensions: Vec<String>,
}

impl Default for ImageLimits {
    fn default() -> Self {
        Self {
            max_file_size: 30 * 1024 * 1024,
            min_image_size: 320,
            max_image_size: 4096,
            allowed_extensions: ["jpg", "jpeg", "png", "webp", "bmp", "tiff"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl ImageLimits {
    /// Human readable size limit, e.g. `30MB`.
    pub fn max_file_size_label(&self) -> String {
        format_size(self.max_file_size)
    }

    /// Extensions with a leading dot, e.g. `.jpg`.
    pub fn supported_formats(&self) -> Vec<String> {
        self.allowed_extensions
            .iter()
            .map(|ext| format!(".{}", ext.trim_start_matches('.').to_lowercase()))
            .collect()
    }
}

/// Whole megabytes print as `30MB`, smaller limits fall back to KB or bytes.
pub(crate) fn format_size(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = 1024 * KB;
    match bytes {
        b if b >= MB && b % MB == 0 => format!("{}MB", b / MB),
        b if b >= MB => format!("{:.1}MB", b as f64 / MB as f64),
        b if b >= KB => format!("{}KB", b / KB),
        b => format!("{}B", b),
    }
}

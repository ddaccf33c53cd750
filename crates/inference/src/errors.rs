use thiserror::Error;

/// Rejections raised while validating or decoding an uploaded image.
#[derive(Error, Debug)]
pub enum ImageError {
    #[error("File size exceeds {} limit", crate::config::format_size(*max))]
    TooLarge { size: usize, max: usize },

    #[error("Image data is empty")]
    EmptyData,

    #[error("No file name provided")]
    MissingFilename,

    #[error("Unsupported file type. Allowed: {allowed}")]
    UnsupportedExtension { allowed: String },

    #[error("Unsupported image format")]
    UnsupportedFormat,

    #[error("Invalid or corrupted image file: {0}")]
    DecodeFailed(String),

    #[error("Image too small ({width}x{height}). Minimum size: {min}x{min}")]
    TooSmall { width: u32, height: u32, min: u32 },
}

#[derive(Error, Debug)]
pub enum InferenceError {
    #[error(transparent)]
    Image(#[from] ImageError),

    #[error("Failed to load model: {0:#}")]
    ModelLoad(anyhow::Error),

    #[error("Model inference failed: {0}")]
    Backend(#[from] anyhow::Error),

    #[error("Unexpected model output: {0}")]
    Output(String),

    #[error("Plate text recognition failed: {0}")]
    Ocr(String),

    #[error("Invalid detector configuration: {0}")]
    Config(String),

    #[error("Model backend is unavailable (a previous inference panicked)")]
    BackendPoisoned,
}

impl InferenceError {
    /// Whether the failure was caused by the uploaded content rather than the service.
    pub fn is_client_error(&self) -> bool {
        matches!(self, InferenceError::Image(_))
    }
}

pub mod backend;
pub mod config;
pub mod detector;
pub mod errors;
pub mod image_utils;
pub mod ocr;
pub mod processing;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

// Re-export commonly used types for convenience
pub use backend::{ExecutionProvider, InferenceBackend, InferenceOutput};
pub use config::{DetectorConfig, ImageLimits, OcrConfig};
pub use detector::{Detect, PlateDetection, PlateDetector};
pub use errors::{ImageError, InferenceError};
pub use ocr::{PlateReader, TextFragment};

#[cfg(feature = "ort-backend")]
pub use detector::load_plate_detector;

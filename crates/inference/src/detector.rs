use crate::backend::{ExecutionProvider, InferenceBackend};
use crate::config::{DetectorConfig, ImageLimits, OcrConfig};
use crate::errors::InferenceError;
use crate::image_utils::{enhance_for_detection, smart_resize};
use crate::ocr::{PlateReader, combine_fragments, crop_for_ocr};
use crate::processing::post::{PostProcessor, RawDetection, TransformParams};
use common::{span, span_debug};
use image::RgbImage;
use preprocess::{CpuPreProcessor, Preprocess};
use serde::Serialize;
use std::sync::Mutex;

/// One license plate found in an uploaded image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlateDetection {
    /// `[x1, y1, x2, y2]` in original image pixels
    pub bbox: [u32; 4],
    /// Detection confidence, averaged with the OCR confidence when text was read
    pub confidence: f32,
    pub detection_confidence: f32,
    pub class_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ocr_confidence: Option<f32>,
}

/// Object-safe view of the detection pipeline, shared by request handlers.
pub trait Detect: Send + Sync {
    fn detect(&self, image: RgbImage) -> Result<Vec<PlateDetection>, InferenceError>;

    fn ocr_enabled(&self) -> bool;

    /// Execution device, `cpu` or `cuda`
    fn device(&self) -> &'static str;
}

pub struct PlateDetector<B: InferenceBackend> {
    backend: Mutex<B>,
    provider: ExecutionProvider,
    input_size: u32,
    max_image_size: u32,
    postprocessor: PostProcessor,
    class_names: Vec<String>,
    reader: Option<Box<dyn PlateReader>>,
    min_ocr_confidence: f32,
}

impl<B: InferenceBackend> PlateDetector<B> {
    /// Wrap a loaded backend, resolving which model classes count as plates.
    pub fn new(
        backend: B,
        config: &DetectorConfig,
        limits: &ImageLimits,
    ) -> Result<Self, InferenceError> {
        if config.input_size == 0 {
            return Err(InferenceError::Config("input_size must be positive".into()));
        }

        let class_names = backend
            .class_names()
            .filter(|names| !names.is_empty())
            .unwrap_or_else(|| config.class_names.clone());

        let plate_ids = plate_class_ids(&class_names, &config.plate_classes);
        let postprocessor = PostProcessor::new(
            config.confidence_threshold,
            config.iou_threshold,
            config.max_detections,
        );
        let postprocessor = match plate_ids {
            Some(ids) if ids.is_empty() => {
                return Err(InferenceError::Config(format!(
                    "none of the model classes {:?} match plate labels {:?}",
                    class_names, config.plate_classes
                )));
            }
            Some(ids) => postprocessor.with_classes(ids),
            // No label table: single-class model, class 0 is the plate
            None => postprocessor.with_classes(vec![0]),
        };

        tracing::info!(
            classes = ?class_names,
            allowed = ?postprocessor.allowed_classes,
            provider = backend.provider().as_str(),
            "Plate detector ready"
        );

        Ok(Self {
            provider: backend.provider(),
            backend: Mutex::new(backend),
            input_size: config.input_size,
            max_image_size: limits.max_image_size,
            postprocessor,
            class_names,
            reader: None,
            min_ocr_confidence: OcrConfig::default().min_confidence,
        })
    }

    /// Enable plate text recognition.
    pub fn with_reader(mut self, reader: Box<dyn PlateReader>, config: &OcrConfig) -> Self {
        self.reader = Some(reader);
        self.min_ocr_confidence = config.min_confidence;
        self
    }

    fn class_name(&self, class_id: usize) -> String {
        self.class_names
            .get(class_id)
            .filter(|name| !name.is_empty())
            .cloned()
            .unwrap_or_else(|| format!("class_{}", class_id))
    }

    fn run_model(&self, image: &RgbImage) -> Result<Vec<RawDetection>, InferenceError> {
        let (width, height) = image.dimensions();

        let mut preprocessor = CpuPreProcessor::new((self.input_size, self.input_size));
        let prep = preprocessor.preprocess(image.as_raw(), width, height)?;

        let output = {
            let _s = span!("model_inference");
            let mut backend = self
                .backend
                .lock()
                .map_err(|_| InferenceError::BackendPoisoned)?;
            backend.infer(&prep.tensor)?
        };

        let transform = TransformParams {
            orig_width: width,
            orig_height: height,
            scale: prep.scale,
            offset_x: prep.offset_x,
            offset_y: prep.offset_y,
        };

        self.postprocessor
            .parse_detections(&output.predictions.view(), &transform)
            .map_err(|e| InferenceError::Output(e.to_string()))
    }

    fn to_plate(
        &self,
        raw: &RawDetection,
        image: &RgbImage,
        upload_size: (u32, u32),
        scale_factor: f32,
        index: usize,
    ) -> Option<PlateDetection> {
        let bbox = pixel_bbox(raw, image.width(), image.height())?;
        let detection_confidence = raw.confidence;

        let (text, ocr_confidence, confidence) = match &self.reader {
            None => (None, None, detection_confidence),
            Some(reader) => {
                let _s = span_debug!("plate_ocr");
                let crop = crop_for_ocr(image, bbox)?;
                let fragments = match reader.read(&crop) {
                    Ok(fragments) => fragments,
                    Err(e) => {
                        tracing::warn!(detection = index, error = %e, "OCR failed, skipping plate");
                        return None;
                    }
                };
                let plate = combine_fragments(&fragments, self.min_ocr_confidence)?;
                tracing::info!(
                    text = %plate.text,
                    ocr_confidence = plate.confidence,
                    "Read plate"
                );
                let combined = (detection_confidence + plate.confidence) / 2.0;
                (Some(plate.text), Some(round3(plate.confidence)), combined)
            }
        };

        Some(PlateDetection {
            bbox: rescale_bbox(bbox, scale_factor, upload_size),
            confidence: round3(confidence),
            detection_confidence: round3(detection_confidence),
            class_name: self.class_name(raw.class_id),
            text,
            ocr_confidence,
        })
    }
}

impl<B: InferenceBackend> Detect for PlateDetector<B> {
    #[tracing::instrument(skip_all, fields(width = image.width(), height = image.height()))]
    fn detect(&self, image: RgbImage) -> Result<Vec<PlateDetection>, InferenceError> {
        let upload_size = image.dimensions();
        let (image, scale_factor) = smart_resize(image, self.max_image_size);
        let mut enhanced = image.clone();
        enhance_for_detection(&mut enhanced);

        let raw = self.run_model(&enhanced)?;
        tracing::debug!(candidates = raw.len(), "Detections after NMS");

        // OCR reads the unenhanced pixels
        let plates: Vec<PlateDetection> = raw
            .iter()
            .enumerate()
            .filter_map(|(i, det)| self.to_plate(det, &image, upload_size, scale_factor, i))
            .collect();

        tracing::info!(plates = plates.len(), "Detection finished");
        Ok(plates)
    }

    fn ocr_enabled(&self) -> bool {
        self.reader.is_some()
    }

    fn device(&self) -> &'static str {
        self.provider.as_str()
    }
}

/// Load the ONNX detector, plus the plate reader when one is configured.
#[cfg(feature = "ort-backend")]
pub fn load_plate_detector(
    detector: &DetectorConfig,
    ocr: &OcrConfig,
    limits: &ImageLimits,
) -> Result<PlateDetector<crate::backend::ort::OrtBackend>, InferenceError> {
    use crate::backend::ort::OrtBackend;
    use crate::ocr::ctc::CtcPlateReader;

    let provider = ExecutionProvider::from_gpu_flag(detector.enable_gpu);
    let backend =
        OrtBackend::load_model(&detector.model_path, provider).map_err(InferenceError::ModelLoad)?;
    let plate_detector = PlateDetector::new(backend, detector, limits)?;

    match &ocr.model_path {
        Some(path) => {
            let reader =
                CtcPlateReader::load(path, ocr, provider).map_err(InferenceError::ModelLoad)?;
            Ok(plate_detector.with_reader(Box::new(reader), ocr))
        }
        None => {
            tracing::info!("No OCR model configured, plate text recognition disabled");
            Ok(plate_detector)
        }
    }
}

/// Indices of `class_names` that are plate labels, or `None` when there is
/// no label table to match against.
fn plate_class_ids(class_names: &[String], plate_classes: &[String]) -> Option<Vec<usize>> {
    if class_names.is_empty() {
        return None;
    }
    Some(
        class_names
            .iter()
            .enumerate()
            .filter(|(_, name)| plate_classes.iter().any(|p| p.eq_ignore_ascii_case(name)))
            .map(|(i, _)| i)
            .collect(),
    )
}

/// Snap a detection to whole pixels inside a `width x height` image, keeping
/// at least one pixel on each axis. `None` when nothing of the box is left.
fn pixel_bbox(raw: &RawDetection, width: u32, height: u32) -> Option<[u32; 4]> {
    let x1 = raw.x1.round() as u32;
    let y1 = raw.y1.round() as u32;
    let x2 = (raw.x2.round() as u32).max(x1 + 1).min(width);
    let y2 = (raw.y2.round() as u32).max(y1 + 1).min(height);
    (x1 < x2 && y1 < y2).then_some([x1, y1, x2, y2])
}

/// Map a box from the downscaled working image back to the upload.
fn rescale_bbox(bbox: [u32; 4], scale_factor: f32, (width, height): (u32, u32)) -> [u32; 4] {
    if scale_factor == 1.0 {
        return bbox;
    }
    let [x1, y1, x2, y2] = bbox.map(|v| (v as f32 / scale_factor) as u32);
    [x1, y1, x2.min(width), y2.min(height)]
}

fn round3(v: f32) -> f32 {
    (v * 1000.0).round() / 1000.0
}

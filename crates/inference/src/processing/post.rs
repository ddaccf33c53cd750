use ndarray::ArrayViewD;

/// Letterbox parameters needed to map model space back to the source image.
#[derive(Debug, Clone, Copy)]
pub struct TransformParams {
    pub orig_width: u32,
    pub orig_height: u32,
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

/// A detection in source image pixels, before any label lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub class_id: usize,
}

impl RawDetection {
    fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    pub fn iou(&self, other: &RawDetection) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);

        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 { 0.0 } else { inter / union }
    }
}

pub struct PostProcessor {
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
    /// Class ids to keep; `None` keeps every class
    pub allowed_classes: Option<Vec<usize>>,
}

impl PostProcessor {
    pub fn new(confidence_threshold: f32, iou_threshold: f32, max_detections: usize) -> Self {
        Self {
            confidence_threshold,
            iou_threshold,
            max_detections,
            allowed_classes: None,
        }
    }

    pub fn with_classes(mut self, classes: Vec<usize>) -> Self {
        self.allowed_classes = Some(classes);
        self
    }

    fn keeps_class(&self, class_id: usize) -> bool {
        self.allowed_classes
            .as_ref()
            .is_none_or(|allowed| allowed.contains(&class_id))
    }

    /// Decode a YOLOv8 head into source-image detections.
    ///
    /// Accepts `[1, 4 + nc, anchors]` (the default export) or the transposed
    /// `[1, anchors, 4 + nc]`. Boxes are `cx, cy, w, h` in model input pixels.
    #[tracing::instrument(skip_all, fields(shape = ?predictions.shape()))]
    pub fn parse_detections(
        &self,
        predictions: &ArrayViewD<f32>,
        transform: &TransformParams,
    ) -> anyhow::Result<Vec<RawDetection>> {
        let shape = predictions.shape();
        if shape.len() != 3 || shape[0] != 1 {
            anyhow::bail!("Unexpected detector output shape: {:?}", shape);
        }

        let channels_first = shape[1] <= shape[2];
        let (num_attrs, num_anchors) = if channels_first {
            (shape[1], shape[2])
        } else {
            (shape[2], shape[1])
        };
        if num_attrs < 5 {
            anyhow::bail!(
                "Detector output has {} attributes, expected at least 5",
                num_attrs
            );
        }
        let num_classes = num_attrs - 4;

        let at = |attr: usize, anchor: usize| -> f32 {
            if channels_first {
                predictions[[0, attr, anchor]]
            } else {
                predictions[[0, anchor, attr]]
            }
        };

        let mut candidates = Vec::new();
        for i in 0..num_anchors {
            let mut confidence = f32::NEG_INFINITY;
            let mut class_id = 0usize;
            for c in 0..num_classes {
                let score = at(4 + c, i);
                if score > confidence {
                    confidence = score;
                    class_id = c;
                }
            }

            if confidence < self.confidence_threshold || !self.keeps_class(class_id) {
                continue;
            }

            let (x1, y1, x2, y2) = cxcywh_to_xyxy(at(0, i), at(1, i), at(2, i), at(3, i));
            let det = RawDetection {
                x1: unletterbox(x1, transform.offset_x, transform.scale, transform.orig_width),
                y1: unletterbox(y1, transform.offset_y, transform.scale, transform.orig_height),
                x2: unletterbox(x2, transform.offset_x, transform.scale, transform.orig_width),
                y2: unletterbox(y2, transform.offset_y, transform.scale, transform.orig_height),
                confidence,
                class_id,
            };

            if det.x2 > det.x1 && det.y2 > det.y1 {
                candidates.push(det);
            }
        }

        tracing::trace!(candidates = candidates.len(), "Candidates above threshold");

        Ok(non_max_suppression(
            candidates,
            self.iou_threshold,
            self.max_detections,
        ))
    }
}

/// Class-aware greedy NMS. Output is sorted by descending confidence.
pub fn non_max_suppression(
    mut detections: Vec<RawDetection>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<RawDetection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<RawDetection> = Vec::new();
    for det in detections {
        if kept.len() >= max_detections {
            break;
        }
        let suppressed = kept
            .iter()
            .any(|k| k.class_id == det.class_id && k.iou(&det) > iou_threshold);
        if !suppressed {
            kept.push(det);
        }
    }
    kept
}

#[inline]
fn unletterbox(v: f32, offset: f32, scale: f32, limit: u32) -> f32 {
    ((v - offset) / scale).clamp(0.0, limit as f32)
}

/// Convert bounding box from center-width-height format to corner format
#[inline]
fn cxcywh_to_xyxy(cx: f32, cy: f32, w: f32, h: f32) -> (f32, f32, f32, f32) {
    let x1 = cx - w / 2.0;
    let y1 = cy - h / 2.0;
    let x2 = cx + w / 2.0;
    let y2 = cy + h / 2.0;
    (x1, y1, x2, y2)
}

//! Plate text recognition on detected regions.

#[cfg(feature = "ort-backend")]
pub mod ctc;

use image::{RgbImage, imageops::FilterType};

/// Crops smaller than this are upscaled before recognition.
const MIN_CROP_WIDTH: u32 = 150;
const MIN_CROP_HEIGHT: u32 = 50;

/// One piece of recognized text with its confidence in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct TextFragment {
    pub text: String,
    pub confidence: f32,
}

impl TextFragment {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
        }
    }
}

/// Recognizes text on a cropped plate image.
pub trait PlateReader: Send + Sync {
    fn read(&self, crop: &RgbImage) -> anyhow::Result<Vec<TextFragment>>;
}

/// Text read from a plate after filtering and cleanup.
#[derive(Debug, Clone, PartialEq)]
pub struct PlateText {
    pub text: String,
    pub confidence: f32,
}

/// Keep confident fragments, join and clean them.
///
/// Returns `None` when nothing readable is left.
pub fn combine_fragments(fragments: &[TextFragment], min_confidence: f32) -> Option<PlateText> {
    let kept: Vec<&TextFragment> = fragments
        .iter()
        .filter(|f| f.confidence > min_confidence && !f.text.trim().is_empty())
        .collect();
    if kept.is_empty() {
        return None;
    }

    let joined = kept
        .iter()
        .map(|f| f.text.trim())
        .collect::<Vec<_>>()
        .join(" ");
    let text = clean_plate_text(&joined);
    if text.is_empty() {
        return None;
    }

    let confidence = kept.iter().map(|f| f.confidence).sum::<f32>() / kept.len() as f32;
    Some(PlateText { text, confidence })
}

/// Normalize recognized plate text.
///
/// Collapses whitespace, uppercases, maps the usual letter/digit confusions
/// (`O→0 I→1 S→5 B→8`) and drops everything except alphanumerics, spaces
/// and hyphens.
pub fn clean_plate_text(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");

    let cleaned: String = collapsed
        .to_uppercase()
        .chars()
        .map(|c| match c {
            'O' => '0',
            'I' => '1',
            'S' => '5',
            'B' => '8',
            other => other,
        })
        .filter(|c| c.is_alphanumeric() || *c == ' ' || *c == '-')
        .collect();

    cleaned.trim().to_string()
}

/// Padding around a plate box, scaled with the image's short side.
pub fn crop_padding(image_width: u32, image_height: u32) -> u32 {
    ((image_width.min(image_height) as f32 * 0.01) as u32).clamp(2, 10)
}

/// Cut a plate region out of `image`, padded and upscaled for recognition.
///
/// `bbox` is `[x1, y1, x2, y2]` in image pixels.
pub fn crop_for_ocr(image: &RgbImage, bbox: [u32; 4]) -> Option<RgbImage> {
    let (width, height) = image.dimensions();
    let padding = crop_padding(width, height);

    let x1 = bbox[0].saturating_sub(padding).min(width);
    let y1 = bbox[1].saturating_sub(padding).min(height);
    let x2 = bbox[2].saturating_add(padding).min(width);
    let y2 = bbox[3].saturating_add(padding).min(height);
    if x2 <= x1 || y2 <= y1 {
        return None;
    }

    let crop = image::imageops::crop_imm(image, x1, y1, x2 - x1, y2 - y1).to_image();
    let (crop_w, crop_h) = crop.dimensions();

    if crop_h < MIN_CROP_HEIGHT || crop_w < MIN_CROP_WIDTH {
        let scale = 2.0f32
            .max(MIN_CROP_HEIGHT as f32 / crop_h as f32)
            .max(MIN_CROP_WIDTH as f32 / crop_w as f32);
        let new_w = (crop_w as f32 * scale).round() as u32;
        let new_h = (crop_h as f32 * scale).round() as u32;
        return Some(image::imageops::resize(
            &crop,
            new_w,
            new_h,
            FilterType::Lanczos3,
        ));
    }

    Some(crop)
}

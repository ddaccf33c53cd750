use super::{PlateReader, TextFragment};
use crate::backend::{ExecutionProvider, ort::build_session};
use crate::config::OcrConfig;
use image::{RgbImage, imageops::FilterType};
use ndarray::{Array, ArrayViewD, IxDyn};
use ort::{session::Session, value::TensorRef};
use std::path::Path;
use std::sync::Mutex;

const MIN_INPUT_WIDTH: u32 = 16;
const MAX_INPUT_WIDTH: u32 = 640;

/// CRNN text recognizer with greedy CTC decoding.
pub struct CtcPlateReader {
    session: Mutex<Session>,
    alphabet: Vec<char>,
    input_height: u32,
}

impl CtcPlateReader {
    pub fn load(
        path: &Path,
        config: &OcrConfig,
        provider: ExecutionProvider,
    ) -> anyhow::Result<Self> {
        let session = build_session(path, provider)?;
        let alphabet: Vec<char> = config.alphabet.chars().collect();
        if alphabet.is_empty() {
            anyhow::bail!("OCR alphabet is empty");
        }

        tracing::info!(
            path = %path.display(),
            alphabet_len = alphabet.len(),
            "OCR model loaded"
        );

        Ok(Self {
            session: Mutex::new(session),
            alphabet,
            input_height: config.input_height,
        })
    }

    /// `[1, 3, H, W]` tensor normalized to `[-1, 1]`, width following the crop's aspect ratio.
    fn to_tensor(&self, crop: &RgbImage) -> anyhow::Result<Array<f32, IxDyn>> {
        let (w, h) = crop.dimensions();
        if w == 0 || h == 0 {
            anyhow::bail!("Cannot recognize text on an empty crop");
        }

        let target_h = self.input_height;
        let target_w = ((w as f32 * target_h as f32 / h as f32).round() as u32)
            .clamp(MIN_INPUT_WIDTH, MAX_INPUT_WIDTH);
        let resized = image::imageops::resize(crop, target_w, target_h, FilterType::Triangle);

        let (tw, th) = (target_w as usize, target_h as usize);
        let spatial = tw * th;
        let mut data = vec![0.0f32; 3 * spatial];
        for (i, px) in resized.pixels().enumerate() {
            for c in 0..3 {
                data[c * spatial + i] = px[c] as f32 / 127.5 - 1.0;
            }
        }

        Ok(Array::from_shape_vec(IxDyn(&[1, 3, th, tw]), data)?)
    }
}

impl PlateReader for CtcPlateReader {
    fn read(&self, crop: &RgbImage) -> anyhow::Result<Vec<TextFragment>> {
        let input = self.to_tensor(crop)?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow::anyhow!("OCR session lock poisoned"))?;
        let outputs = session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let logits = outputs[0].try_extract_array::<f32>()?;

        let fragment = ctc_greedy_decode(&logits, &self.alphabet)?;
        Ok(fragment.into_iter().collect())
    }
}

/// Best-path CTC decoding. Index 0 is the blank; index `i` maps to `alphabet[i - 1]`.
///
/// Accepts `[1, T, C]` or `[T, C]`. Rows that are not already probability
/// distributions are passed through a softmax first. Returns `None` when no
/// character was emitted.
pub fn ctc_greedy_decode(
    output: &ArrayViewD<f32>,
    alphabet: &[char],
) -> anyhow::Result<Option<TextFragment>> {
    let shape = output.shape();
    let (steps, classes) = match shape.len() {
        3 => (shape[1], shape[2]),
        2 => (shape[0], shape[1]),
        _ => anyhow::bail!("Unexpected recognizer output shape: {:?}", shape),
    };

    let row = |t: usize| -> Vec<f32> {
        (0..classes)
            .map(|c| {
                if shape.len() == 3 {
                    output[[0, t, c]]
                } else {
                    output[[t, c]]
                }
            })
            .collect()
    };

    let mut text = String::new();
    let mut confidences = Vec::new();
    let mut prev: Option<usize> = None;

    for t in 0..steps {
        let mut probs = row(t);
        if !is_distribution(&probs) {
            softmax_in_place(&mut probs);
        }

        let (best, best_prob) = probs
            .iter()
            .copied()
            .enumerate()
            .fold((0usize, f32::NEG_INFINITY), |acc, (i, p)| {
                if p > acc.1 { (i, p) } else { acc }
            });

        if best != 0 && Some(best) != prev {
            if let Some(&ch) = alphabet.get(best - 1) {
                text.push(ch);
                confidences.push(best_prob);
            }
        }
        prev = if best == 0 { None } else { Some(best) };
    }

    if confidences.is_empty() {
        return Ok(None);
    }

    let confidence = confidences.iter().sum::<f32>() / confidences.len() as f32;
    Ok(Some(TextFragment { text, confidence }))
}

fn is_distribution(row: &[f32]) -> bool {
    let in_range = row.iter().all(|p| (0.0..=1.0).contains(p));
    let sum: f32 = row.iter().sum();
    in_range && (sum - 1.0).abs() < 1e-3
}

fn softmax_in_place(row: &mut [f32]) {
    let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0;
    for v in row.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    if sum > 0.0 {
        for v in row.iter_mut() {
            *v /= sum;
        }
    }
}

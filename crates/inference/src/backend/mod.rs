use ndarray::{Array, ArrayD, IxDyn};
use std::path::Path;

#[cfg(feature = "ort-backend")]
pub mod ort;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionProvider {
    Cpu,
    Cuda,
}

impl ExecutionProvider {
    pub fn from_gpu_flag(enable_gpu: bool) -> Self {
        if enable_gpu { Self::Cuda } else { Self::Cpu }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionProvider::Cpu => "cpu",
            ExecutionProvider::Cuda => "cuda",
        }
    }
}

pub trait InferenceBackend: Send {
    fn load_model(path: &Path, provider: ExecutionProvider) -> anyhow::Result<Self>
    where
        Self: Sized;

    /// Run the detector on a `[1, 3, H, W]` tensor
    fn infer(&mut self, images: &Array<f32, IxDyn>) -> anyhow::Result<InferenceOutput>;

    /// Class labels embedded in the model, indexed by class id
    fn class_names(&self) -> Option<Vec<String>> {
        None
    }

    fn provider(&self) -> ExecutionProvider {
        ExecutionProvider::Cpu
    }
}

pub struct InferenceOutput {
    pub predictions: ArrayD<f32>, // [1, 4 + nc, anchors] xywh + class scores
}

/// Parse the Ultralytics `names` metadata, e.g. `{0: 'license_plate', 1: 'car'}`.
///
/// Returns `None` when the string holds no `index: 'label'` pairs.
pub fn parse_class_names(raw: &str) -> Option<Vec<String>> {
    let body = raw.trim().trim_start_matches('{').trim_end_matches('}');

    let mut entries: Vec<(usize, String)> = Vec::new();
    for pair in body.split(',') {
        let Some((idx, label)) = pair.split_once(':') else {
            continue;
        };
        let Ok(idx) = idx.trim().parse::<usize>() else {
            continue;
        };
        let label = label.trim().trim_matches(|c| c == '\'' || c == '"');
        if label.is_empty() {
            continue;
        }
        entries.push((idx, label.to_string()));
    }

    if entries.is_empty() {
        return None;
    }

    let len = entries.iter().map(|(i, _)| i + 1).max().unwrap_or(0);
    let mut names = vec![String::new(); len];
    for (idx, label) in entries {
        names[idx] = label;
    }
    Some(names)
}

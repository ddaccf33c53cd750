//! Scripted detector backend for tests that cannot ship an ONNX model.

use crate::backend::{ExecutionProvider, InferenceBackend, InferenceOutput};
use ndarray::{Array, IxDyn};
use std::path::Path;

const MOCK_ANCHORS: usize = 64;

/// Returns the same boxes for every call, in YOLOv8 `[1, 4 + nc, anchors]` layout.
///
/// Boxes are `(cx, cy, w, h, score)` in model input pixels and always score class 0.
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    boxes: Vec<(f32, f32, f32, f32, f32)>,
    names: Option<Vec<String>>,
    fail: bool,
}

impl MockBackend {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_boxes(boxes: Vec<(f32, f32, f32, f32, f32)>) -> Self {
        Self {
            boxes,
            ..Self::default()
        }
    }

    /// Every inference call returns an error.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn with_names(mut self, names: Vec<String>) -> Self {
        self.names = Some(names);
        self
    }
}

impl InferenceBackend for MockBackend {
    fn load_model(_path: &Path, _provider: ExecutionProvider) -> anyhow::Result<Self> {
        Ok(Self::empty())
    }

    fn infer(&mut self, images: &Array<f32, IxDyn>) -> anyhow::Result<InferenceOutput> {
        if self.fail {
            anyhow::bail!("mock backend failure");
        }
        if images.ndim() != 4 {
            anyhow::bail!("expected NCHW input, got shape {:?}", images.shape());
        }

        let num_classes = self.names.as_ref().map_or(1, |n| n.len().max(1));
        let anchors = self.boxes.len().max(MOCK_ANCHORS);
        let mut predictions = Array::zeros(IxDyn(&[1, 4 + num_classes, anchors]));
        for (i, &(cx, cy, w, h, score)) in self.boxes.iter().enumerate() {
            predictions[[0, 0, i]] = cx;
            predictions[[0, 1, i]] = cy;
            predictions[[0, 2, i]] = w;
            predictions[[0, 3, i]] = h;
            predictions[[0, 4, i]] = score;
        }

        Ok(InferenceOutput { predictions })
    }

    fn class_names(&self) -> Option<Vec<String>> {
        self.names.clone()
    }
}

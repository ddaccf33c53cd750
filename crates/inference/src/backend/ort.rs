use super::{ExecutionProvider, InferenceBackend, InferenceOutput, parse_class_names};
use ndarray::{Array, IxDyn};
use ort::{
    session::{Session, builder::GraphOptimizationLevel},
    value::TensorRef,
};
use std::path::Path;

pub struct OrtBackend {
    session: Session,
    class_names: Option<Vec<String>>,
    provider: ExecutionProvider,
}

/// Build an ORT session with the shared optimization settings.
pub(crate) fn build_session(path: &Path, provider: ExecutionProvider) -> anyhow::Result<Session> {
    if !path.exists() {
        anyhow::bail!("Model file not found: {}", path.display());
    }

    // Initialize ORT environment (idempotent)
    let _ = ort::init().commit();

    let mut builder = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(4)?;

    match provider {
        ExecutionProvider::Cuda => {
            tracing::info!("Initializing ONNX Runtime with CUDA execution provider");
            builder = builder.with_execution_providers([
                ort::execution_providers::CUDAExecutionProvider::default()
                    .with_device_id(0)
                    .build()
                    .error_on_failure(),
            ])?;
        }
        ExecutionProvider::Cpu => {
            tracing::info!("Initializing ONNX Runtime with CPU execution provider");
        }
    }

    Ok(builder.commit_from_file(path)?)
}

impl InferenceBackend for OrtBackend {
    fn load_model(path: &Path, provider: ExecutionProvider) -> anyhow::Result<Self> {
        let session = build_session(path, provider)?;

        let class_names = session
            .metadata()
            .ok()
            .and_then(|meta| meta.custom("names"))
            .and_then(|raw| parse_class_names(&raw));

        tracing::info!(
            path = %path.display(),
            classes = ?class_names,
            "Model loaded"
        );

        Ok(Self {
            session,
            class_names,
            provider,
        })
    }

    fn infer(&mut self, images: &Array<f32, IxDyn>) -> anyhow::Result<InferenceOutput> {
        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(images.view())?])?;

        let predictions = outputs[0].try_extract_array::<f32>()?;

        Ok(InferenceOutput {
            predictions: predictions.into_owned(),
        })
    }

    fn class_names(&self) -> Option<Vec<String>> {
        self.class_names.clone()
    }

    fn provider(&self) -> ExecutionProvider {
        self.provider
    }
}

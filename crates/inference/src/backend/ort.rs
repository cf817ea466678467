use super::InferenceBackend;
use crate::config::ExecutionProvider;
use ndarray::{Array2, Array4, Axis};
use ort::{
    session::{Session, builder::GraphOptimizationLevel},
    value::TensorRef,
};

pub struct OrtBackend {
    session: Session,
}

impl OrtBackend {
    /// Load model with specified execution provider
    pub fn load_model(path: &str, provider: ExecutionProvider) -> anyhow::Result<Self> {
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

        let session = builder.commit_from_file(path)?;

        tracing::info!(model_path = path, "Model loaded");
        Ok(Self { session })
    }
}

impl InferenceBackend for OrtBackend {
    fn infer(&mut self, batch: &Array4<f32>) -> anyhow::Result<Array2<f32>> {
        let items = batch.len_of(Axis(0));
        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(batch.view())?])?;

        // Attribute and classifier heads come out as [N, C] or [N, C, 1, 1].
        let scores = outputs[0].try_extract_array::<f32>()?;
        let per_item = scores.len() / items.max(1);
        let scores = scores
            .as_standard_layout()
            .into_owned()
            .into_shape_with_order((items, per_item))?;

        Ok(scores)
    }

    fn name(&self) -> &'static str {
        "ort"
    }
}

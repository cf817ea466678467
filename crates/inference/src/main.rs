use common::TelemetryGuard;
use inference::{
    BackendKind, InferenceConfig, RunSummary, SyntheticBackend, logging::setup_logging,
    run_with_backend,
};

#[cfg(feature = "ort-backend")]
use inference::backend::ort::OrtBackend;

fn run(config: InferenceConfig) -> anyhow::Result<RunSummary> {
    match config.backend {
        BackendKind::Synthetic => {
            let backend = SyntheticBackend::new(config.outputs_per_item());
            run_with_backend(config, backend)
        }
        #[cfg(feature = "ort-backend")]
        BackendKind::Ort => {
            tracing::info!("Loading inference model");
            let backend = common::retry_with_backoff(
                || OrtBackend::load_model(&config.model_path, config.execution_provider),
                3,
                500,
                "Load ONNX model",
            )?;
            tracing::info!("Model loaded successfully");
            run_with_backend(config, backend)
        }
        #[cfg(not(feature = "ort-backend"))]
        BackendKind::Ort => {
            anyhow::bail!("BACKEND=ort requires building with the 'ort-backend' feature")
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = InferenceConfig::from_env()?;

    let _telemetry = match &config.otel_endpoint {
        Some(endpoint) => Some(TelemetryGuard::init(
            "inference",
            endpoint,
            config.environment,
        )?),
        None => {
            setup_logging(&config)?;
            None
        }
    };

    tracing::info!(
        config = ?config,
        "Loaded configuration"
    );

    let summary = tokio::task::spawn_blocking(move || run(config)).await??;

    if summary.failed_frames > 0 {
        tracing::warn!(
            failed_frames = summary.failed_frames,
            frames = summary.frames,
            "Some frames failed"
        );
    }
    Ok(())
}

use crate::decoder::PERSON_ATTRIBUTES;
use lifecycle::{FetchMode, FrameBounds, ManagerConfig};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub use common::Environment;

pub const DEFAULT_INPUT_SIZE: (u32, u32) = (80, 160);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    PersonAttribs,
    Classifier,
}

impl FromStr for ModelKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "person_attribs" | "person-attribs" => Ok(Self::PersonAttribs),
            "classifier" => Ok(Self::Classifier),
            other => anyhow::bail!("Unknown MODEL_KIND '{other}' (expected person_attribs or classifier)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// ONNX Runtime, requires the `ort-backend` feature.
    Ort,
    /// Deterministic scores derived from pixel statistics, for dry runs.
    Synthetic,
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ort" | "onnx" => Ok(Self::Ort),
            "synthetic" => Ok(Self::Synthetic),
            other => anyhow::bail!("Unknown BACKEND '{other}' (expected ort or synthetic)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionProvider {
    Cpu,
    Cuda,
}

impl FromStr for ExecutionProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cpu" => Ok(Self::Cpu),
            "cuda" => Ok(Self::Cuda),
            other => anyhow::bail!("Unknown EXECUTION_PROVIDER '{other}' (expected cpu or cuda)"),
        }
    }
}

fn parse_fetch_mode(s: &str) -> anyhow::Result<FetchMode> {
    match s.to_lowercase().as_str() {
        "blocking" => Ok(FetchMode::Blocking),
        "polling" => Ok(FetchMode::Polling),
        other => anyhow::bail!("Unknown FETCH_MODE '{other}' (expected blocking or polling)"),
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[derive(Debug, Clone)]
pub struct InferenceConfig {
    pub environment: Environment,
    pub backend: BackendKind,
    pub execution_provider: ExecutionProvider,
    pub model_path: String,
    pub model_name: String,
    pub model_kind: ModelKind,
    pub class_labels: Vec<String>,
    pub input_size: (u32, u32),
    pub frame_size: (u32, u32),
    pub max_batch_size: usize,
    pub attribs_confidence: f32,
    pub completion_timeout: Duration,
    pub fetch_mode: FetchMode,
    pub poll_interval_ms: u64,
    pub frame_manifest: PathBuf,
    pub output_path: Option<PathBuf>,
    pub filter: String,
    pub otel_endpoint: Option<String>,
}

impl InferenceConfig {
    /// Load configuration from environment variables with sensible defaults
    pub fn from_env() -> anyhow::Result<Self> {
        let environment = Environment::from_env();

        let backend = env::var("BACKEND")
            .unwrap_or_else(|_| "synthetic".to_string())
            .parse()?;

        let execution_provider = env::var("EXECUTION_PROVIDER")
            .unwrap_or_else(|_| "cpu".to_string())
            .parse()?;

        let model_path =
            env::var("MODEL_PATH").unwrap_or_else(|_| "models/person-attributes.onnx".to_string());

        let model_kind: ModelKind = env::var("MODEL_KIND")
            .unwrap_or_else(|_| "person_attribs".to_string())
            .parse()?;

        let model_name = env::var("MODEL_NAME").unwrap_or_else(|_| match model_kind {
            ModelKind::PersonAttribs => "person_attribs".to_string(),
            ModelKind::Classifier => "classifier".to_string(),
        });

        let class_labels: Vec<String> = env::var("CLASS_LABELS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        if model_kind == ModelKind::Classifier && class_labels.is_empty() {
            anyhow::bail!("CLASS_LABELS must list at least one label for MODEL_KIND=classifier");
        }

        let input_size = (
            env_or("INPUT_WIDTH", DEFAULT_INPUT_SIZE.0),
            env_or("INPUT_HEIGHT", DEFAULT_INPUT_SIZE.1),
        );
        let frame_size = (env_or("FRAME_WIDTH", 1920), env_or("FRAME_HEIGHT", 1080));

        let max_batch_size = env_or("MAX_BATCH_SIZE", 16usize).max(1);
        let attribs_confidence = env_or("ATTRIBS_CONFIDENCE", 0.5f32);
        let completion_timeout = Duration::from_millis(env_or("COMPLETION_TIMEOUT_MS", 1000u64));

        let fetch_mode = parse_fetch_mode(
            &env::var("FETCH_MODE").unwrap_or_else(|_| "blocking".to_string()),
        )?;
        let poll_interval_ms = env_or("POLL_INTERVAL_MS", 5u64);

        let frame_manifest =
            PathBuf::from(env::var("FRAME_MANIFEST").unwrap_or_else(|_| "frames.jsonl".to_string()));
        let output_path = env::var("OUTPUT_PATH").ok().map(PathBuf::from);
        let filter = env::var("FILTER").unwrap_or_default();
        let otel_endpoint = env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok();

        Ok(Self {
            environment,
            backend,
            execution_provider,
            model_path,
            model_name,
            model_kind,
            class_labels,
            input_size,
            frame_size,
            max_batch_size,
            attribs_confidence,
            completion_timeout,
            fetch_mode,
            poll_interval_ms,
            frame_manifest,
            output_path,
            filter,
            otel_endpoint,
        })
    }

    /// Lifecycle settings for the component this service drives.
    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig::new(
            self.model_name.clone(),
            FrameBounds::new(self.frame_size.0, self.frame_size.1),
            self.max_batch_size,
        )
        .with_fetch_mode(self.fetch_mode)
        .with_completion_timeout(self.completion_timeout)
    }

    /// Number of scores the model emits per region.
    pub fn outputs_per_item(&self) -> usize {
        match self.model_kind {
            ModelKind::PersonAttribs => PERSON_ATTRIBUTES.len(),
            ModelKind::Classifier => self.class_labels.len(),
        }
    }

    /// Create default configuration for testing
    pub fn test_default() -> Self {
        Self {
            environment: Environment::Development,
            backend: BackendKind::Synthetic,
            execution_provider: ExecutionProvider::Cpu,
            model_path: "/models/person-attributes.onnx".to_string(),
            model_name: "person_attribs".to_string(),
            model_kind: ModelKind::PersonAttribs,
            class_labels: Vec::new(),
            input_size: (16, 32),
            frame_size: (64, 64),
            max_batch_size: 8,
            attribs_confidence: 0.5,
            completion_timeout: Duration::from_secs(5),
            fetch_mode: FetchMode::Blocking,
            poll_interval_ms: 1,
            frame_manifest: PathBuf::from("frames.jsonl"),
            output_path: None,
            filter: String::new(),
            otel_endpoint: None,
        }
    }
}

pub mod backend;
pub mod config;
pub mod decoder;
pub mod logging;
pub mod manifest;
pub mod preprocessing;
pub mod service;
pub mod sink;

// Re-export commonly used types for convenience
pub use backend::{InferenceBackend, SyntheticBackend, ThreadedAdapter};
pub use config::{BackendKind, InferenceConfig, ModelKind};
pub use decoder::{Classification, LabelClassifierDecoder, PersonAttribsDecoder, PersonAttributes};
pub use preprocessing::{CropTensor, PreProcessor};
pub use service::{InferenceService, RunSummary, run_with_backend};

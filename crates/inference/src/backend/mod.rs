use ndarray::{Array2, Array4};

#[cfg(feature = "ort-backend")]
pub mod ort;

pub mod synthetic;
pub mod threaded;

pub use synthetic::SyntheticBackend;
pub use threaded::ThreadedAdapter;

/// A model runtime that turns a batch of crops into per-crop scores.
///
/// Backends run on the adapter's worker thread, never on the pipeline thread.
pub trait InferenceBackend {
    /// Run inference on an NCHW batch. Returns one row of raw scores per item,
    /// in batch order.
    fn infer(&mut self, batch: &Array4<f32>) -> anyhow::Result<Array2<f32>>;

    fn name(&self) -> &'static str;
}

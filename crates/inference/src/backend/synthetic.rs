use super::InferenceBackend;
use ndarray::{Array2, Array4, Axis};

/// Deterministic stand-in for a real model: each score is a smooth function
/// of the crop's per-channel means. Used for dry runs and tests.
pub struct SyntheticBackend {
    outputs_per_item: usize,
}

impl SyntheticBackend {
    pub fn new(outputs_per_item: usize) -> Self {
        Self { outputs_per_item }
    }
}

impl InferenceBackend for SyntheticBackend {
    fn infer(&mut self, batch: &Array4<f32>) -> anyhow::Result<Array2<f32>> {
        if self.outputs_per_item == 0 {
            anyhow::bail!("Synthetic backend configured with zero outputs");
        }

        let mut scores = Array2::zeros((batch.len_of(Axis(0)), self.outputs_per_item));
        for (item, mut row) in batch.outer_iter().zip(scores.outer_iter_mut()) {
            let means: Vec<f32> = item
                .outer_iter()
                .map(|channel| channel.mean().unwrap_or(0.0))
                .collect();
            for (j, score) in row.iter_mut().enumerate() {
                let m = means[j % means.len().max(1)];
                *score = ((m + j as f32 * 0.37).sin() + 1.0) / 2.0;
            }
        }
        Ok(scores)
    }

    fn name(&self) -> &'static str {
        "synthetic"
    }
}

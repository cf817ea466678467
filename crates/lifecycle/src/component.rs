use crate::adapter::{InferenceAdapter, Region};
use crate::decoder::ResultDecoder;
use crate::errors::LifecycleError;
use crate::geometry::Rect;
use crate::manager::LifecycleManager;

/// The per-frame contract every model component exposes to the pipeline.
///
/// Callers drive one cycle per frame: `enqueue`* → `submit_request` →
/// `fetch_results` → queries. Object safe, so a multi-model pipeline can hold
/// `Box<dyn AsyncInferenceComponent<Region = _>>` and route by [`name`](Self::name).
pub trait AsyncInferenceComponent {
    type Region;

    fn name(&self) -> &str;

    fn enqueue(&mut self, region: Self::Region, location: Rect) -> Result<(), LifecycleError>;

    fn submit_request(&mut self) -> Result<(), LifecycleError>;

    fn fetch_results(&mut self) -> Result<bool, LifecycleError>;

    fn results_len(&self) -> usize;

    fn location_result(&self, index: usize) -> Result<Rect, LifecycleError>;

    fn filtered_rois(&self, expression: &str) -> Result<Vec<Rect>, LifecycleError>;
}

/// Downstream consumer of a component's results (renderer, publisher, file).
pub trait OutputSink<T> {
    fn accept(&mut self, component: &str, results: &[&T]) -> anyhow::Result<()>;
}

impl<A, D> AsyncInferenceComponent for LifecycleManager<A, D>
where
    A: InferenceAdapter,
    A::Input: Region,
    D: ResultDecoder<Raw = A::Output>,
{
    type Region = A::Input;

    fn name(&self) -> &str {
        LifecycleManager::name(self)
    }

    fn enqueue(&mut self, region: A::Input, location: Rect) -> Result<(), LifecycleError> {
        LifecycleManager::enqueue(self, region, location)
    }

    fn submit_request(&mut self) -> Result<(), LifecycleError> {
        LifecycleManager::submit_request(self)
    }

    fn fetch_results(&mut self) -> Result<bool, LifecycleError> {
        LifecycleManager::fetch_results(self)
    }

    fn results_len(&self) -> usize {
        LifecycleManager::results_len(self)
    }

    fn location_result(&self, index: usize) -> Result<Rect, LifecycleError> {
        LifecycleManager::location_result(self, index)
    }

    fn filtered_rois(&self, expression: &str) -> Result<Vec<Rect>, LifecycleError> {
        LifecycleManager::filtered_rois(self, expression)
    }
}

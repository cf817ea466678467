use crate::errors::AdapterError;
use std::fmt;
use std::time::Duration;

/// Opaque ticket for one batch submitted to an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BatchHandle(u64);

impl BatchHandle {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for BatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Boundary to the runtime that executes inference off the pipeline thread.
///
/// Implementations run the computation on their own execution context and
/// expose completion by polling ([`is_ready`](Self::is_ready)) or by a bounded
/// blocking wait ([`collect`](Self::collect)). They never call back into the
/// lifecycle manager.
pub trait InferenceAdapter {
    /// One preprocessed region, as the runtime consumes it.
    type Input;
    /// Raw per-item output, handed unchanged to the decoder.
    type Output;

    /// Start computation over `items`. Rejection (busy, resource exhaustion)
    /// must be reported here rather than on collect.
    fn submit_batch(&mut self, items: Vec<Self::Input>) -> Result<BatchHandle, AdapterError>;

    /// Non-blocking completion check.
    fn is_ready(&mut self, handle: BatchHandle) -> bool;

    /// Wait at most `timeout` for the batch and return one output per
    /// submitted item, in submission order. Consumes the handle: after this
    /// returns (either way) the handle is invalid.
    fn collect(
        &mut self,
        handle: BatchHandle,
        timeout: Duration,
    ) -> Result<Vec<Self::Output>, AdapterError>;

    /// Abandon an in-flight batch. Its outputs, if they ever arrive, are
    /// discarded.
    fn cancel(&mut self, handle: BatchHandle);
}

/// Anything the manager can check for a degenerate crop.
pub trait Region {
    /// `(width, height)` in pixels.
    fn dimensions(&self) -> (u32, u32);
}

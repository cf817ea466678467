use crate::adapter::{BatchHandle, InferenceAdapter, Region};
use crate::component::OutputSink;
use crate::decoder::{DecodePolicy, ResultDecoder};
use crate::errors::{AdapterError, LifecycleError};
use crate::filter::Filter;
use crate::geometry::{FrameBounds, Rect};
use crate::metrics::LifecycleMetrics;
use crate::store::ResultStore;
use std::time::{Duration, Instant};

const DEFAULT_COMPLETION_TIMEOUT: Duration = Duration::from_secs(1);

/// How `fetch_results` waits for an in-flight batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchMode {
    /// Wait for the adapter, bounded by the completion timeout.
    #[default]
    Blocking,
    /// Return `false` immediately while the adapter is still working.
    Polling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Buffering,
    InFlight,
}

#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub name: String,
    pub frame_bounds: FrameBounds,
    pub max_batch_size: usize,
    pub fetch_mode: FetchMode,
    pub completion_timeout: Duration,
}

impl ManagerConfig {
    pub fn new(name: impl Into<String>, frame_bounds: FrameBounds, max_batch_size: usize) -> Self {
        Self {
            name: name.into(),
            frame_bounds,
            max_batch_size,
            fetch_mode: FetchMode::default(),
            completion_timeout: DEFAULT_COMPLETION_TIMEOUT,
        }
    }

    pub fn with_fetch_mode(mut self, fetch_mode: FetchMode) -> Self {
        self.fetch_mode = fetch_mode;
        self
    }

    pub fn with_completion_timeout(mut self, timeout: Duration) -> Self {
        self.completion_timeout = timeout;
        self
    }
}

struct PendingItem<R> {
    region: R,
    location: Rect,
}

struct InFlightBatch {
    handle: BatchHandle,
    locations: Vec<Rect>,
    submitted_at: Instant,
}

/// Drives the enqueue → submit → fetch cycle for one model on one stream.
///
/// Items enqueued while a batch is in flight wait in the buffer for the next
/// submission. At most one batch is in flight at a time, and the result store
/// only ever holds the outcome of the latest fetch.
pub struct LifecycleManager<A, D>
where
    A: InferenceAdapter,
    D: ResultDecoder<Raw = A::Output>,
{
    config: ManagerConfig,
    adapter: A,
    decoder: D,
    buffer: Vec<PendingItem<A::Input>>,
    in_flight: Option<InFlightBatch>,
    store: ResultStore<D::Output>,
    metrics: LifecycleMetrics,
}

impl<A, D> LifecycleManager<A, D>
where
    A: InferenceAdapter,
    A::Input: Region,
    D: ResultDecoder<Raw = A::Output>,
{
    pub fn new(config: ManagerConfig, adapter: A, decoder: D) -> Self {
        let metrics = LifecycleMetrics::new(&config.name);
        tracing::info!(
            component = %config.name,
            max_batch_size = config.max_batch_size,
            fetch_mode = ?config.fetch_mode,
            completion_timeout_ms = config.completion_timeout.as_millis() as u64,
            "Lifecycle manager created"
        );
        Self {
            buffer: Vec::with_capacity(config.max_batch_size),
            config,
            adapter,
            decoder,
            in_flight: None,
            store: ResultStore::new(),
            metrics,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn max_batch_size(&self) -> usize {
        self.config.max_batch_size
    }

    pub fn enqueued_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn state(&self) -> LifecycleState {
        if self.in_flight.is_some() {
            LifecycleState::InFlight
        } else if !self.buffer.is_empty() {
            LifecycleState::Buffering
        } else {
            LifecycleState::Idle
        }
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn enqueue(&mut self, region: A::Input, location: Rect) -> Result<(), LifecycleError> {
        if let Err(e) = self.admit(&region, location) {
            self.metrics.region_rejected();
            tracing::warn!(
                component = %self.config.name,
                %location,
                error = %e,
                "Region rejected"
            );
            return Err(e);
        }

        self.buffer.push(PendingItem { region, location });
        self.metrics.region_enqueued();
        tracing::trace!(
            component = %self.config.name,
            %location,
            buffered = self.buffer.len(),
            "Region enqueued"
        );
        Ok(())
    }

    fn admit(&self, region: &A::Input, location: Rect) -> Result<(), LifecycleError> {
        let (width, height) = region.dimensions();
        if width == 0 || height == 0 {
            return Err(LifecycleError::InvalidRegion {
                location,
                reason: "region has zero area",
            });
        }
        if location.is_degenerate() {
            return Err(LifecycleError::InvalidRegion {
                location,
                reason: "location has zero area",
            });
        }
        if !self.config.frame_bounds.contains(&location) {
            return Err(LifecycleError::InvalidRegion {
                location,
                reason: "location outside frame bounds",
            });
        }
        if self.buffer.len() >= self.config.max_batch_size {
            return Err(LifecycleError::BatchFull {
                capacity: self.config.max_batch_size,
            });
        }
        Ok(())
    }

    pub fn submit_request(&mut self) -> Result<(), LifecycleError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        if self.in_flight.is_some() {
            return Err(LifecycleError::BatchInFlight);
        }

        let _span = common::span!("submit_request");
        self.store.clear();

        let (regions, locations): (Vec<_>, Vec<_>) = self
            .buffer
            .drain(..)
            .map(|item| (item.region, item.location))
            .unzip();
        let batch_size = regions.len();

        match self.adapter.submit_batch(regions) {
            Ok(handle) => {
                tracing::debug!(
                    component = %self.config.name,
                    batch = %handle,
                    batch_size,
                    "Batch submitted"
                );
                self.metrics.batch_submitted();
                self.in_flight = Some(InFlightBatch {
                    handle,
                    locations,
                    submitted_at: Instant::now(),
                });
                Ok(())
            }
            Err(e) => {
                self.metrics.cycle_failed();
                tracing::error!(
                    component = %self.config.name,
                    batch_size,
                    error = %e,
                    "Batch submission failed, dropping buffered regions"
                );
                Err(LifecycleError::SubmissionFailed(e))
            }
        }
    }

    /// Collect the in-flight batch and publish its results.
    ///
    /// Returns `Ok(true)` when at least one result was committed. `Ok(false)`
    /// covers an empty cycle, an all-skipped batch, and (in polling mode) a
    /// batch that is still running.
    pub fn fetch_results(&mut self) -> Result<bool, LifecycleError> {
        let Some(batch) = self.in_flight.take() else {
            self.store.clear();
            return Ok(false);
        };

        let _span = common::span!("fetch_results");

        let elapsed = batch.submitted_at.elapsed();
        let timeout = match self.config.fetch_mode {
            FetchMode::Blocking => self.config.completion_timeout,
            FetchMode::Polling => {
                if !self.adapter.is_ready(batch.handle) {
                    if elapsed < self.config.completion_timeout {
                        self.in_flight = Some(batch);
                        return Ok(false);
                    }
                    self.adapter.cancel(batch.handle);
                    let timed_out = AdapterError::Timeout(self.config.completion_timeout);
                    return Err(self.fail_cycle(batch.handle, timed_out.into()));
                }
                Duration::ZERO
            }
        };

        let outputs = match self.adapter.collect(batch.handle, timeout) {
            Ok(outputs) => outputs,
            Err(e) => return Err(self.fail_cycle(batch.handle, e.into())),
        };

        if outputs.len() != batch.locations.len() {
            let e = AdapterError::OutputCountMismatch {
                expected: batch.locations.len(),
                actual: outputs.len(),
            };
            return Err(self.fail_cycle(batch.handle, e.into()));
        }

        let policy = self.decoder.policy();
        let mut results = Vec::with_capacity(outputs.len());
        for (index, (raw, location)) in outputs.into_iter().zip(batch.locations).enumerate() {
            match self.decoder.decode(raw, location) {
                Ok(result) => results.push(result),
                Err(source) => match policy {
                    DecodePolicy::FailBatch => {
                        return Err(
                            self.fail_cycle(batch.handle, LifecycleError::Decode { index, source })
                        );
                    }
                    DecodePolicy::SkipItem => {
                        tracing::warn!(
                            component = %self.config.name,
                            batch = %batch.handle,
                            index,
                            %location,
                            error = %source,
                            "Skipping undecodable output"
                        );
                    }
                },
            }
        }

        let committed = results.len();
        let latency = batch.submitted_at.elapsed();
        self.metrics.results_published(committed, latency);
        self.store.publish(results);

        tracing::debug!(
            component = %self.config.name,
            batch = %batch.handle,
            committed,
            latency_ms = latency.as_secs_f64() * 1000.0,
            "Results published"
        );
        Ok(committed > 0)
    }

    fn fail_cycle(&mut self, handle: BatchHandle, error: LifecycleError) -> LifecycleError {
        self.store.clear();
        self.metrics.cycle_failed();
        tracing::error!(
            component = %self.config.name,
            batch = %handle,
            error = %error,
            "Fetch failed, batch discarded"
        );
        error
    }

    /// Cancel the in-flight batch, if any. Buffered regions are kept.
    pub fn abandon(&mut self) -> bool {
        match self.in_flight.take() {
            Some(batch) => {
                self.adapter.cancel(batch.handle);
                tracing::info!(
                    component = %self.config.name,
                    batch = %batch.handle,
                    batch_size = batch.locations.len(),
                    "In-flight batch abandoned"
                );
                true
            }
            None => false,
        }
    }

    pub fn results_len(&self) -> usize {
        self.store.len()
    }

    pub fn results(&self) -> &[D::Output] {
        self.store.as_slice()
    }

    pub fn result(&self, index: usize) -> Option<&D::Output> {
        self.store.get(index)
    }

    pub fn location_result(&self, index: usize) -> Result<Rect, LifecycleError> {
        self.store.location(index)
    }

    pub fn filtered_rois(&self, expression: &str) -> Result<Vec<Rect>, LifecycleError> {
        let filter = Filter::for_payload::<D::Output>(expression)?;
        Ok(self.store.filtered_locations(&filter))
    }

    /// Hand the last cycle's results that match `expression` to `sink`.
    /// Returns how many results were delivered.
    pub fn observe_output<S>(&self, sink: &mut S, expression: &str) -> Result<usize, LifecycleError>
    where
        S: OutputSink<D::Output> + ?Sized,
    {
        let filter = Filter::for_payload::<D::Output>(expression)?;
        let selected = self.store.filtered(&filter);
        sink.accept(&self.config.name, &selected)
            .map_err(|e| LifecycleError::Sink(format!("{e:#}")))?;
        Ok(selected.len())
    }
}

impl<A, D> Drop for LifecycleManager<A, D>
where
    A: InferenceAdapter,
    D: ResultDecoder<Raw = A::Output>,
{
    fn drop(&mut self) {
        if let Some(batch) = self.in_flight.take() {
            self.adapter.cancel(batch.handle);
        }
    }
}

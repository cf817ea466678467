use crate::{
    backend::{InferenceBackend, ThreadedAdapter},
    config::{InferenceConfig, ModelKind},
    decoder::{LabelClassifierDecoder, PersonAttribsDecoder},
    manifest::{FrameEntry, FrameManifest},
    preprocessing::PreProcessor,
    sink::{FrameSink, JsonLinesSink, LogSink},
};
use anyhow::Context;
use lifecycle::{
    FetchMode, Filter, HasLocation, LifecycleError, LifecycleManager, LifecycleState,
    ResultDecoder,
};
use opentelemetry::{
    global,
    metrics::{Counter, Histogram},
};
use serde::Serialize;
use std::thread;
use std::time::{Duration, Instant};

/// Totals for one pass over the frame manifest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub frames: u64,
    pub failed_frames: u64,
    pub rejected_regions: u64,
    pub delivered: u64,
}

struct FrameOutcome {
    rejected: usize,
    delivered: usize,
}

struct ServiceMetrics {
    frame_duration: Histogram<f64>,
    frames: Counter<u64>,
    failed_frames: Counter<u64>,
    delivered: Counter<u64>,
}

fn init_metrics(meter_name: &'static str) -> ServiceMetrics {
    let meter = global::meter(meter_name);
    let latency_buckets = [
        0.001, 0.002, 0.005, 0.007, 0.01, 0.015, 0.02, 0.025, 0.03, 0.04, 0.05, 0.075, 0.1, 0.15,
        0.2, 0.5,
    ];
    ServiceMetrics {
        frame_duration: meter
            .f64_histogram("inference_frame_duration_seconds")
            .with_description("Time to process a frame (crop + inference + delivery)")
            .with_unit("s")
            .with_boundaries(latency_buckets.to_vec())
            .build(),
        frames: meter
            .u64_counter("inference_frames_total")
            .with_description("Total frames processed")
            .build(),
        failed_frames: meter
            .u64_counter("inference_frames_failed_total")
            .with_description("Frames dropped after an error")
            .build(),
        delivered: meter
            .u64_counter("inference_results_delivered_total")
            .with_description("Results handed to the output sink")
            .build(),
    }
}

/// Drives one lifecycle component over every frame of a manifest.
pub struct InferenceService<D>
where
    D: ResultDecoder<Raw = Vec<f32>>,
{
    config: InferenceConfig,
    manager: LifecycleManager<ThreadedAdapter, D>,
    preprocessor: PreProcessor,
    sink: Box<dyn FrameSink<D::Output>>,
}

impl<D> InferenceService<D>
where
    D: ResultDecoder<Raw = Vec<f32>>,
{
    pub fn new(
        config: InferenceConfig,
        adapter: ThreadedAdapter,
        decoder: D,
        sink: Box<dyn FrameSink<D::Output>>,
    ) -> anyhow::Result<Self> {
        Filter::for_payload::<D::Output>(&config.filter)
            .with_context(|| format!("Invalid FILTER expression '{}'", config.filter))?;

        let manager = LifecycleManager::new(config.manager_config(), adapter, decoder);
        let preprocessor = PreProcessor::new(config.input_size);
        Ok(Self {
            config,
            manager,
            preprocessor,
            sink,
        })
    }

    pub fn run(mut self) -> anyhow::Result<RunSummary> {
        tracing::info!(
            component = self.manager.name(),
            manifest = %self.config.frame_manifest.display(),
            filter = %self.config.filter,
            "Inference service starting"
        );

        let manifest = FrameManifest::open(&self.config.frame_manifest)?;
        let metrics = init_metrics("inference");
        let mut summary = RunSummary::default();

        for (index, entry) in manifest.enumerate() {
            let frame = index as u64;
            summary.frames += 1;
            let start = Instant::now();

            let outcome = entry.and_then(|entry| self.process_frame(frame, &entry));
            match outcome {
                Ok(outcome) => {
                    metrics
                        .frame_duration
                        .record(start.elapsed().as_secs_f64(), &[]);
                    metrics.frames.add(1, &[]);
                    metrics.delivered.add(outcome.delivered as u64, &[]);
                    summary.rejected_regions += outcome.rejected as u64;
                    summary.delivered += outcome.delivered as u64;
                }
                Err(e) => {
                    metrics.failed_frames.add(1, &[]);
                    summary.failed_frames += 1;
                    let error = format!("{e:#}");
                    tracing::error!(frame, %error, "Failed to process frame");
                }
            }

            if summary.frames.is_multiple_of(100) {
                tracing::debug!(
                    frames = summary.frames,
                    failed_frames = summary.failed_frames,
                    delivered = summary.delivered,
                    "Progress"
                );
            }
        }

        tracing::info!(
            frames = summary.frames,
            failed_frames = summary.failed_frames,
            rejected_regions = summary.rejected_regions,
            delivered = summary.delivered,
            "Manifest processed"
        );
        Ok(summary)
    }

    /// Frames with more regions than fit one batch run several cycles.
    fn process_frame(&mut self, frame: u64, entry: &FrameEntry) -> anyhow::Result<FrameOutcome> {
        let _span = common::span!("process_frame", frame, rois = entry.rois.len());

        let image = image::open(&entry.image)
            .with_context(|| format!("Failed to load frame image {}", entry.image.display()))?
            .to_rgb8();

        self.sink.begin_frame(frame);
        let mut outcome = FrameOutcome {
            rejected: 0,
            delivered: 0,
        };

        for chunk in entry.rois.chunks(self.manager.max_batch_size()) {
            for &location in chunk {
                let crop = self.preprocessor.crop(&image, location)?;
                if self.manager.enqueue(crop, location).is_err() {
                    outcome.rejected += 1;
                }
            }

            self.manager.submit_request()?;
            if self.complete_cycle()? {
                outcome.delivered += self
                    .manager
                    .observe_output(self.sink.as_mut(), &self.config.filter)?;
            }
        }

        tracing::trace!(
            frame,
            rejected = outcome.rejected,
            delivered = outcome.delivered,
            "Frame processed"
        );
        Ok(outcome)
    }

    fn complete_cycle(&mut self) -> Result<bool, LifecycleError> {
        match self.config.fetch_mode {
            FetchMode::Blocking => self.manager.fetch_results(),
            FetchMode::Polling => {
                let interval = Duration::from_millis(self.config.poll_interval_ms);
                loop {
                    if self.manager.fetch_results()? {
                        return Ok(true);
                    }
                    if self.manager.state() != LifecycleState::InFlight {
                        return Ok(false);
                    }
                    thread::sleep(interval);
                }
            }
        }
    }
}

fn make_sink<T>(config: &InferenceConfig) -> anyhow::Result<Box<dyn FrameSink<T>>>
where
    T: Serialize + HasLocation + 'static,
{
    let sink: Box<dyn FrameSink<T>> = match &config.output_path {
        Some(path) => Box::new(JsonLinesSink::create(path)?),
        None => Box::new(LogSink::new()),
    };
    Ok(sink)
}

/// Build the decoder and sink for the configured model and process the
/// whole manifest on `backend`.
pub fn run_with_backend<B>(config: InferenceConfig, backend: B) -> anyhow::Result<RunSummary>
where
    B: InferenceBackend + Send + 'static,
{
    let adapter = ThreadedAdapter::spawn(backend)?;

    match config.model_kind {
        ModelKind::PersonAttribs => {
            let decoder = PersonAttribsDecoder::new(config.attribs_confidence);
            let sink = make_sink(&config)?;
            InferenceService::new(config, adapter, decoder, sink)?.run()
        }
        ModelKind::Classifier => {
            let decoder = LabelClassifierDecoder::new(config.class_labels.clone());
            let sink = make_sink(&config)?;
            InferenceService::new(config, adapter, decoder, sink)?.run()
        }
    }
}

use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};
use std::time::Duration;

/// Per-component instruments, tagged with the component name.
pub struct LifecycleMetrics {
    attributes: [KeyValue; 1],
    enqueued: Counter<u64>,
    rejected: Counter<u64>,
    batches: Counter<u64>,
    results: Counter<u64>,
    failed_cycles: Counter<u64>,
    batch_latency: Histogram<f64>,
}

impl LifecycleMetrics {
    pub fn new(component: &str) -> Self {
        let meter = global::meter("lifecycle");
        let latency_buckets = [
            0.001, 0.002, 0.005, 0.01, 0.02, 0.03, 0.05, 0.075, 0.1, 0.15, 0.2, 0.3, 0.5, 1.0, 2.0,
        ];

        Self {
            attributes: [KeyValue::new("component", component.to_string())],
            enqueued: meter
                .u64_counter("lifecycle_regions_enqueued_total")
                .with_description("Regions accepted into the crop buffer")
                .build(),
            rejected: meter
                .u64_counter("lifecycle_regions_rejected_total")
                .with_description("Regions rejected at enqueue")
                .build(),
            batches: meter
                .u64_counter("lifecycle_batches_submitted_total")
                .with_description("Batches handed to the adapter")
                .build(),
            results: meter
                .u64_counter("lifecycle_results_published_total")
                .with_description("Decoded results committed to the result store")
                .build(),
            failed_cycles: meter
                .u64_counter("lifecycle_failed_cycles_total")
                .with_description("Submit or fetch cycles that ended in an error")
                .build(),
            batch_latency: meter
                .f64_histogram("lifecycle_batch_latency_seconds")
                .with_description("Time from batch submission to committed results")
                .with_unit("s")
                .with_boundaries(latency_buckets.to_vec())
                .build(),
        }
    }

    pub fn region_enqueued(&self) {
        self.enqueued.add(1, &self.attributes);
    }

    pub fn region_rejected(&self) {
        self.rejected.add(1, &self.attributes);
    }

    pub fn batch_submitted(&self) {
        self.batches.add(1, &self.attributes);
    }

    pub fn results_published(&self, count: usize, latency: Duration) {
        self.results.add(count as u64, &self.attributes);
        self.batch_latency
            .record(latency.as_secs_f64(), &self.attributes);
    }

    pub fn cycle_failed(&self) {
        self.failed_cycles.add(1, &self.attributes);
    }
}

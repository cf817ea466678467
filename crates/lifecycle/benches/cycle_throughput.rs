use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use lifecycle::{
    AdapterError, BatchHandle, DecodeError, FieldKind, FieldValue, Filter, Filterable,
    FrameBounds, HasLocation, InferenceAdapter, LifecycleManager, ManagerConfig, Rect, Region,
    ResultDecoder,
};
use std::time::Duration;

struct Crop(u32);

impl Region for Crop {
    fn dimensions(&self) -> (u32, u32) {
        (self.0, self.0)
    }
}

/// Completes synchronously so the bench measures the manager, not a runtime.
#[derive(Default)]
struct ImmediateAdapter {
    next_id: u64,
    outputs: Option<Vec<[f32; 6]>>,
}

impl InferenceAdapter for ImmediateAdapter {
    type Input = Crop;
    type Output = [f32; 6];

    fn submit_batch(&mut self, items: Vec<Crop>) -> Result<BatchHandle, AdapterError> {
        self.next_id += 1;
        self.outputs = Some(
            items
                .iter()
                .enumerate()
                .map(|(i, _)| [(i % 10) as f32 / 10.0; 6])
                .collect(),
        );
        Ok(BatchHandle::new(self.next_id))
    }

    fn is_ready(&mut self, _handle: BatchHandle) -> bool {
        self.outputs.is_some()
    }

    fn collect(
        &mut self,
        handle: BatchHandle,
        _timeout: Duration,
    ) -> Result<Vec<[f32; 6]>, AdapterError> {
        self.outputs
            .take()
            .ok_or(AdapterError::UnknownHandle(handle.id()))
    }

    fn cancel(&mut self, _handle: BatchHandle) {
        self.outputs = None;
    }
}

struct Attribs {
    location: Rect,
    scores: [f32; 6],
}

impl HasLocation for Attribs {
    fn location(&self) -> Rect {
        self.location
    }
}

impl Filterable for Attribs {
    fn schema() -> &'static [(&'static str, FieldKind)] {
        &[("male_probability", FieldKind::Number), ("hat", FieldKind::Flag)]
    }

    fn field(&self, name: &str) -> Option<FieldValue<'_>> {
        match name {
            "male_probability" => Some(FieldValue::Number(self.scores[0] as f64)),
            "hat" => Some(FieldValue::Flag(self.scores[1] > 0.5)),
            _ => None,
        }
    }
}

struct AttribsDecoder;

impl ResultDecoder for AttribsDecoder {
    type Raw = [f32; 6];
    type Output = Attribs;

    fn decode(&self, raw: [f32; 6], location: Rect) -> Result<Attribs, DecodeError> {
        Ok(Attribs {
            location,
            scores: raw,
        })
    }
}

fn manager(batch_size: usize) -> LifecycleManager<ImmediateAdapter, AttribsDecoder> {
    LifecycleManager::new(
        ManagerConfig::new("bench", FrameBounds::new(1920, 1080), batch_size),
        ImmediateAdapter::default(),
        AttribsDecoder,
    )
}

fn benchmark_full_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_cycle");

    for batch_size in [1usize, 8, 32, 128] {
        let mut m = manager(batch_size);
        group.bench_with_input(
            BenchmarkId::new("enqueue_submit_fetch", batch_size),
            &batch_size,
            |b, &batch_size| {
                b.iter(|| {
                    for i in 0..batch_size {
                        let x = (i as i32 * 13) % 1800;
                        m.enqueue(Crop(64), Rect::new(x, 100, 64, 128)).unwrap();
                    }
                    m.submit_request().unwrap();
                    black_box(m.fetch_results().unwrap())
                });
            },
        );
    }

    group.finish();
}

fn benchmark_filter_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter_queries");

    let mut m = manager(128);
    for i in 0..128 {
        m.enqueue(Crop(64), Rect::new(i * 10, 0, 10, 10)).unwrap();
    }
    m.submit_request().unwrap();
    m.fetch_results().unwrap();

    let expression = "male_probability > 0.5 && !hat";

    group.bench_function("parse", |b| {
        b.iter(|| Filter::for_payload::<Attribs>(black_box(expression)).unwrap());
    });

    group.bench_function("filtered_rois_128", |b| {
        b.iter(|| m.filtered_rois(black_box(expression)).unwrap());
    });

    group.finish();
}

criterion_group!(benches, benchmark_full_cycle, benchmark_filter_queries);
criterion_main!(benches);

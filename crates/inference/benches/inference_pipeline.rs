use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use image::{Rgb, RgbImage};
use inference::{
    CropTensor, LabelClassifierDecoder, PersonAttribsDecoder, PreProcessor, SyntheticBackend,
    ThreadedAdapter,
};
use lifecycle::{InferenceAdapter, Rect, ResultDecoder};
use std::time::Duration;

/// Mid-gray 1080p frame with a horizontal gradient in the green channel.
fn create_test_frame() -> RgbImage {
    RgbImage::from_fn(1920, 1080, |x, _| Rgb([128, (x % 256) as u8, 128]))
}

fn benchmark_crop(c: &mut Criterion) {
    let mut group = c.benchmark_group("crop");
    let frame = create_test_frame();
    let mut preprocessor = PreProcessor::new((80, 160));

    for (width, height) in [(40, 80), (120, 300), (400, 900)] {
        let location = Rect::new(100, 50, width, height);
        group.bench_with_input(
            BenchmarkId::new("crop_resize_normalize", format!("{}x{}", width, height)),
            &location,
            |b, location| {
                b.iter(|| preprocessor.crop(black_box(&frame), black_box(*location)).unwrap());
            },
        );
    }

    group.finish();
}

fn benchmark_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    let location = Rect::new(0, 0, 80, 160);

    let attribs = PersonAttribsDecoder::new(0.5);
    group.bench_function("person_attribs", |b| {
        b.iter(|| {
            attribs
                .decode(black_box(vec![0.9, 0.1, 0.7, 0.4, 0.6, 0.2]), location)
                .unwrap()
        });
    });

    let labels: Vec<String> = (0..1000).map(|i| format!("class_{i}")).collect();
    let logits: Vec<f32> = (0..1000).map(|i| (i % 17) as f32 * 0.3).collect();
    let classifier = LabelClassifierDecoder::new(labels);
    group.bench_function("classifier_1000_labels", |b| {
        b.iter(|| classifier.decode(black_box(logits.clone()), location).unwrap());
    });

    group.finish();
}

fn benchmark_adapter_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("threaded_adapter");
    let frame = create_test_frame();
    let mut preprocessor = PreProcessor::new((80, 160));
    let crop = preprocessor.crop(&frame, Rect::new(0, 0, 80, 160)).unwrap();
    let mut adapter = ThreadedAdapter::spawn(SyntheticBackend::new(6)).unwrap();

    for batch_size in [1usize, 8, 32] {
        let batch: Vec<CropTensor> = vec![crop.clone(); batch_size];
        group.bench_with_input(
            BenchmarkId::new("submit_collect", batch_size),
            &batch,
            |b, batch| {
                b.iter(|| {
                    let handle = adapter.submit_batch(batch.clone()).unwrap();
                    adapter.collect(handle, Duration::from_secs(5)).unwrap()
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_crop,
    benchmark_decode,
    benchmark_adapter_round_trip
);
criterion_main!(benches);

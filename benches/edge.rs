//! Benchmarks for edge detection and counter accumulation

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use ferraris::{Accumulator, EdgeDetector, Sample};

fn generate_lines(count: usize) -> Vec<String> {
    // Alternating levels with duplicates and occasional garbage, close
    // to what a real sensor stream looks like.
    (0..count)
        .map(|i| match i % 5 {
            0 | 1 => "1".to_string(),
            2 | 3 => "0".to_string(),
            _ => "noise".to_string(),
        })
        .collect()
}

fn bench_edge_detection(c: &mut Criterion) {
    let mut group = c.benchmark_group("edge_detection");

    let lines = generate_lines(10_000);
    group.throughput(Throughput::Elements(10_000));

    group.bench_function("observe_10k_samples", |b| {
        b.iter(|| {
            let mut detector = EdgeDetector::new();
            let mut triggers = 0u64;
            for line in &lines {
                if let Some(sample) = Sample::parse(line) {
                    if detector.observe(sample) {
                        triggers += 1;
                    }
                }
            }
            black_box(triggers);
        })
    });

    group.finish();
}

fn bench_accumulation(c: &mut Criterion) {
    let mut group = c.benchmark_group("accumulation");

    group.throughput(Throughput::Elements(10_000));

    group.bench_function("record_10k_triggers", |b| {
        b.iter(|| {
            let mut accumulator = Accumulator::new(0.0, 75);
            for _ in 0..10_000 {
                black_box(accumulator.record_trigger());
            }
            black_box(accumulator.counter_kwh());
        })
    });

    group.finish();
}

criterion_group!(benches, bench_edge_detection, bench_accumulation);
criterion_main!(benches);

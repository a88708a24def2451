#[macro_use]
extern crate criterion;

use criterion::{black_box, Criterion};
use rusty_bench::profiler::{NoGpuQuery, ProcessMemory};
use rusty_bench::*;

const SAMPLE_SIZE: usize = 10;
const NOISE_THRESHOLD: f64 = 0.05;

fn options() -> ProvisionOptions {
    ProvisionOptions {
        width_divisor: 8,
        device: DevicePreference::RequireCpu,
        ..ProvisionOptions::default()
    }
}

/// Benchmark building, switching to inference mode and placing a model with its input.
fn provision_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("provision");
    for model in &["mobilenet_v2", "efficientnet_b0", "resnet50"] {
        group.bench_function(*model, |b| {
            b.iter(|| provision_with(black_box(model), 1, false, &options()).unwrap())
        });
    }
    group.finish();
}

/// Benchmark the overhead the profiler adds around a forward pass.
fn profile_benchmark(c: &mut Criterion) {
    let (model, input, device) = provision_with("mobilenet_v2", 1, false, &options()).unwrap();
    let mut profiler = Profiler::new(Box::new(NoGpuQuery), Box::new(ProcessMemory::current()));

    let mut group = c.benchmark_group("profile");
    group.bench_function("predict", |b| b.iter(|| model.predict(&input).unwrap()));
    group.bench_function("profile", |b| {
        b.iter(|| profiler.profile(&model, &input, device).unwrap())
    });
    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(SAMPLE_SIZE).noise_threshold(NOISE_THRESHOLD);
    targets = provision_benchmark, profile_benchmark
}
criterion_main!(benches);

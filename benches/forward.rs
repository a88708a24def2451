#[macro_use]
extern crate criterion;

use criterion::{black_box, Bencher, Criterion};
use rusty_bench::*;

const SAMPLE_SIZE: usize = 10;
const NOISE_THRESHOLD: f64 = 0.05;
/// Channel reduction keeping a forward pass in the tens of milliseconds on a host build
const WIDTH_DIVISOR: usize = 8;

fn options() -> ProvisionOptions {
    ProvisionOptions {
        width_divisor: WIDTH_DIVISOR,
        device: DevicePreference::RequireCpu,
        ..ProvisionOptions::default()
    }
}

/// Benchmark a single forward pass of a provisioned model.
fn bench_model(model: &str, batch_size: usize) -> impl FnMut(&mut Bencher) {
    let (net, input, _) = provision_with(model, batch_size, false, &options())
        .unwrap_or_else(|e| panic!("cannot provision {}: {}", model, e));
    let input = black_box(input);

    move |b| b.iter(|| net.predict(&input).unwrap())
}

fn per_model_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("forward");
    for id in ModelId::ALL.iter() {
        let available = registry::entry(*id).map(|e| e.is_available()).unwrap_or(false);
        if !available {
            continue;
        }
        group.bench_function(id.as_str(), bench_model(id.as_str(), 1));
    }
    group.finish();
}

fn batch_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("mobilenet_v2 batch");
    for &batch_size in &[1, 4, 16] {
        group.bench_function(
            batch_size.to_string(),
            bench_model("mobilenet_v2", batch_size),
        );
    }
    group.finish();
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(SAMPLE_SIZE).noise_threshold(NOISE_THRESHOLD);
    targets = per_model_benchmark, batch_benchmark
}
criterion_main!(benches);

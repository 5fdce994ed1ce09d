//! Benchmarks for the log-ratio codec, which runs once per parameter block
//! per MCMC proposal.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use petrel::model::transform::{log_ratio_forward, log_ratio_inverse};

fn simplex(rng: &mut StdRng, k: usize) -> Vec<f64> {
    let raw: Vec<f64> = (0..k).map(|_| rng.gen_range(0.05..1.0)).collect();
    let total: f64 = raw.iter().sum();
    raw.into_iter().map(|v| v / total).collect()
}

fn bench_log_ratio(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(7);
    let mut group = c.benchmark_group("log_ratio");

    for k in [4usize, 6, 61] {
        let constrained = simplex(&mut rng, k);
        group.bench_function(format!("forward_{}", k), |b| {
            b.iter(|| log_ratio_forward(black_box(&constrained)))
        });

        let (unconstrained, _) = log_ratio_forward(&constrained).unwrap();
        group.bench_function(format!("inverse_{}", k), |b| {
            b.iter(|| log_ratio_inverse(black_box(&unconstrained)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_log_ratio);
criterion_main!(benches);

use std::hint::black_box;

use bgnbd_rs::bgnbd::expected_transactions;
use bgnbd_rs::bgnbd::fit;
use bgnbd_rs::bgnbd::neg_log_likelihood;
use bgnbd_rs::bgnbd::FitConfig;
use bgnbd_rs::bgnbd::ModelParameters;
use bgnbd_rs::simulate::simulate_rfm;
use criterion::criterion_group;
use criterion::criterion_main;
use criterion::BenchmarkId;
use criterion::Criterion;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn truth() -> ModelParameters {
  ModelParameters::new(0.5, 5.0, 1.5, 4.0).unwrap()
}

fn bench_likelihood(c: &mut Criterion) {
  let mut group = c.benchmark_group("NegLogLikelihood");

  for n in [1_000usize, 10_000, 100_000] {
    let data = simulate_rfm(&truth(), n, 39.0, &mut StdRng::seed_from_u64(1)).unwrap();
    let params = truth().to_array();
    group.bench_with_input(BenchmarkId::from_parameter(n), &data, |b, data| {
      b.iter(|| black_box(neg_log_likelihood(&params, data)))
    });
  }

  group.finish();
}

fn bench_fit(c: &mut Criterion) {
  let mut group = c.benchmark_group("Fit");
  group.sample_size(10);

  let data = simulate_rfm(&truth(), 2_000, 39.0, &mut StdRng::seed_from_u64(2)).unwrap();
  for (label, parallel) in [("sequential", false), ("rayon", true)] {
    let config = FitConfig {
      restarts: 8,
      seed: Some(3),
      parallel,
      ..FitConfig::default()
    };
    group.bench_function(label, |b| b.iter(|| black_box(fit(&data, &config).unwrap())));
  }

  group.finish();
}

fn bench_expectation(c: &mut Criterion) {
  let data = simulate_rfm(&truth(), 2_000, 39.0, &mut StdRng::seed_from_u64(4)).unwrap();
  c.bench_function("ExpectedTransactions", |b| {
    b.iter(|| black_box(expected_transactions(52.0, &truth(), &data).unwrap()))
  });
}

criterion_group!(benches, bench_likelihood, bench_fit, bench_expectation);
criterion_main!(benches);

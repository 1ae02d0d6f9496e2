use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ndarray::Array2;
use num_complex::Complex64;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use std::hint::black_box;
use svd_basis::{ApplySvd, BasisValidator, SvdBasis, SvdMethod, Waveform, WaveformTransform};
use std::sync::Arc;

/// Random combinations of `n_modes` chirps plus white noise, seeded for reproducibility.
fn generate_waveforms(n_samples: usize, signal_length: usize, n_modes: usize, seed: u64) -> Array2<Complex64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let modes = Array2::from_shape_fn((n_modes, signal_length), |(k, j)| {
        let f = j as f64 / signal_length as f64;
        Complex64::from_polar(1.0, 2.0 * std::f64::consts::PI * (k as f64 + 1.0) * f * (1.0 + f))
    });
    let weights = Array2::from_shape_fn((n_samples, n_modes), |_| {
        Complex64::new(rng.sample(StandardNormal), rng.sample(StandardNormal))
    });
    let mut data = weights.dot(&modes);
    data.mapv_inplace(|z| z + Complex64::new(1e-3 * rng.sample::<f64, _>(StandardNormal), 0.0));
    data
}

fn criterion_benchmark_runner(c: &mut Criterion) {
    // (name, n_samples, signal_length, n_components)
    let scenarios = [
        ("small", 200, 512, 32),
        ("medium", 1000, 2048, 64),
        ("wide", 500, 4096, 128),
    ];

    for (name, n_samples, signal_length, n_components) in scenarios {
        let data = generate_waveforms(n_samples, signal_length, 20, 42);
        let input_size_bytes = (n_samples * signal_length * std::mem::size_of::<Complex64>()) as u64;

        let mut fit_group = c.benchmark_group(format!("fit/{}", name));
        fit_group.sample_size(10);
        fit_group.throughput(Throughput::Bytes(input_size_bytes));
        for method in [SvdMethod::Randomized, SvdMethod::Exact] {
            let id = BenchmarkId::new(method.to_string(), format!("s{}_f{}_c{}", n_samples, signal_length, n_components));
            fit_group.bench_with_input(id, &data, |b, data| {
                b.iter(|| {
                    let mut basis = SvdBasis::new();
                    basis.fit(black_box(data.view()), n_components, method).unwrap();
                    basis
                })
            });
        }
        fit_group.finish();

        let mut basis = SvdBasis::new();
        basis.fit(data.view(), n_components, SvdMethod::Randomized).unwrap();

        let mut project_group = c.benchmark_group(format!("project/{}", name));
        project_group.throughput(Throughput::Bytes(input_size_bytes));
        project_group.bench_function("round_trip", |b| {
            b.iter(|| {
                let coefficients = basis.fseries_to_basis_coefficients(black_box(data.view())).unwrap();
                basis.basis_coefficients_to_fseries(coefficients.view()).unwrap()
            })
        });
        project_group.bench_function("validate", |b| {
            let validator = BasisValidator::new(vec![n_components / 4, n_components / 2, n_components]);
            b.iter(|| validator.evaluate(&basis, black_box(data.view())).unwrap())
        });
        let apply = ApplySvd::new(Arc::new(basis.clone()));
        let waveform: Waveform = [("H1".to_string(), data.row(0).to_owned())].into_iter().collect();
        project_group.bench_function("apply_single", |b| {
            b.iter(|| apply.transform(black_box(waveform.clone())).unwrap())
        });
        project_group.finish();
    }
}

criterion_group!(benches, criterion_benchmark_runner);
criterion_main!(benches);

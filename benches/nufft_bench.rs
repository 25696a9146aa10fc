use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use num_complex::Complex;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::f64::consts::PI;

use nufft_rs::prelude::*;

fn points(rank: usize, n: usize, seed: u64) -> Vec<Vec<f64>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..rank)
        .map(|_| (0..n).map(|_| rng.random::<f64>() * 2.0 * PI - PI).collect())
        .collect()
}

fn values(n: usize, seed: u64) -> Vec<Complex<f64>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| Complex::new(rng.random::<f64>() - 0.5, rng.random::<f64>() - 0.5))
        .collect()
}

/// Full type 1 / type 2 executions on a 2D grid, host and device paths
fn bench_execute_2d(c: &mut Criterion) {
    let mut group = c.benchmark_group("execute_2d");
    group.sample_size(20);

    let grid_dims = [128usize, 128];
    let total = grid_dims[0] * grid_dims[1];
    for &n in &[10_000usize, 100_000] {
        let coords = points(2, n, 42);
        let slices: Vec<&[f64]> = coords.iter().map(|c| &c[..]).collect();
        let weights = values(n, 43);
        let modes = values(total, 44);

        for backend in [Backend::Host, Backend::Device] {
            let opts = NufftOptions {
                backend,
                ..Default::default()
            };

            let mut t1 = Plan::new(
                TransformType::Type1,
                2,
                &grid_dims,
                FftDirection::Forward,
                1,
                1e-6,
                &opts,
            )
            .unwrap();
            t1.set_points(&slices).unwrap();
            let mut out = vec![Complex::new(0.0, 0.0); total];
            group.bench_with_input(
                BenchmarkId::new(format!("type1_{:?}", backend), n),
                &n,
                |b, _| b.iter(|| t1.execute_type1(black_box(&weights), &mut out).unwrap()),
            );

            let mut t2 = Plan::new(
                TransformType::Type2,
                2,
                &grid_dims,
                FftDirection::Forward,
                1,
                1e-6,
                &opts,
            )
            .unwrap();
            t2.set_points(&slices).unwrap();
            let mut out = vec![Complex::new(0.0, 0.0); n];
            group.bench_with_input(
                BenchmarkId::new(format!("type2_{:?}", backend), n),
                &n,
                |b, _| b.iter(|| t2.execute_type2(black_box(&modes), &mut out).unwrap()),
            );
        }
    }
    group.finish();
}

/// Point setup cost (fold, range check and sort)
fn bench_set_points(c: &mut Criterion) {
    let mut group = c.benchmark_group("set_points");
    group.sample_size(20);

    let coords = points(3, 200_000, 7);
    let slices: Vec<&[f64]> = coords.iter().map(|c| &c[..]).collect();
    for sort_points in [SortPoints::No, SortPoints::Yes] {
        let opts = NufftOptions {
            sort_points,
            ..Default::default()
        };
        let mut plan = Plan::new(
            TransformType::Type1,
            3,
            &[64, 64, 64],
            FftDirection::Forward,
            1,
            1e-6,
            &opts,
        )
        .unwrap();
        group.bench_function(format!("3d_{:?}", sort_points), |b| {
            b.iter(|| plan.set_points(black_box(&slices)).unwrap())
        });
    }
    group.finish();
}

/// Kernel evaluation algorithms on the spreading hot path
fn bench_kernel_algo(c: &mut Criterion) {
    let mut group = c.benchmark_group("kernel_algo");
    group.sample_size(20);

    let n = 200_000;
    let coords = points(2, n, 9);
    let slices: Vec<&[f64]> = coords.iter().map(|c| &c[..]).collect();
    let weights = values(n, 10);
    for algo in [KernelEvalAlgo::Direct, KernelEvalAlgo::Horner] {
        let opts = NufftOptions {
            kernel_eval_algo: algo,
            ..Default::default()
        };
        let mut plan = Plan::new(
            TransformType::Type1,
            2,
            &[256, 256],
            FftDirection::Forward,
            1,
            1e-9,
            &opts,
        )
        .unwrap();
        plan.set_points(&slices).unwrap();
        let mut out = vec![Complex::new(0.0, 0.0); 256 * 256];
        group.bench_function(format!("{:?}", algo), |b| {
            b.iter(|| plan.execute_type1(black_box(&weights), &mut out).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_execute_2d, bench_set_points, bench_kernel_algo);
criterion_main!(benches);

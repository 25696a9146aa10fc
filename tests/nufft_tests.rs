#![allow(clippy::needless_range_loop)]

mod commons;
use commons::*;

use approx::assert_relative_eq;
use num_complex::Complex;
use std::f64::consts::PI;

use nufft_rs::direct;
use nufft_rs::prelude::*;

fn host_opts() -> NufftOptions {
    NufftOptions {
        num_threads: 4,
        ..Default::default()
    }
}

/// Test 1: type 1 against the direct sum for every rank and mode order
#[test]
fn nufft_integration_01_type1_matches_direct() {
    let cases: [(&[usize], usize); 3] = [(&[64], 400), (&[20, 18], 300), (&[8, 10, 6], 250)];
    for (case, (grid_dims, n)) in cases.iter().enumerate() {
        for order in [ModeOrder::Cmcl, ModeOrder::Fft] {
            let rank = grid_dims.len();
            let coords = random_points(rank, *n, 100 + case as u64);
            let slices = as_slices(&coords);
            let c = random_complex(*n, 200 + case as u64);
            let opts = NufftOptions {
                mode_order: order,
                ..host_opts()
            };

            let fk = nufft_type1(&slices, &c, grid_dims, FftDirection::Forward, 1, 1e-6, &opts)
                .unwrap();
            let reference =
                direct::type1(&slices, &c, dims3(grid_dims), FftDirection::Forward, order);
            let err = relative_l2_error(&fk, &reference);
            assert!(
                err < 1e-5,
                "rank {} {:?}: max relative error = {:.2e}",
                rank,
                order,
                err
            );
        }
    }
}

/// Test 2: type 2 against the direct sum for every rank and mode order
#[test]
fn nufft_integration_02_type2_matches_direct() {
    let cases: [(&[usize], usize); 3] = [(&[50], 300), (&[16, 21], 300), (&[6, 8, 10], 200)];
    for (case, (grid_dims, n)) in cases.iter().enumerate() {
        for order in [ModeOrder::Cmcl, ModeOrder::Fft] {
            let rank = grid_dims.len();
            let coords = random_points(rank, *n, 300 + case as u64);
            let slices = as_slices(&coords);
            let total: usize = grid_dims.iter().product();
            let f = random_complex(total, 400 + case as u64);
            let opts = NufftOptions {
                mode_order: order,
                ..host_opts()
            };

            let cj = nufft_type2(&slices, &f, grid_dims, FftDirection::Backward, 1, 1e-8, &opts)
                .unwrap();
            let reference =
                direct::type2(&slices, &f, dims3(grid_dims), FftDirection::Backward, order);
            let err = relative_l2_error(&cj, &reference);
            assert!(
                err < 1e-7,
                "rank {} {:?}: max relative error = {:.2e}",
                rank,
                order,
                err
            );
        }
    }
}

/// Test 3: single precision at a loose tolerance
#[test]
fn nufft_integration_03_single_precision() {
    let grid_dims = [24usize, 20];
    let coords = random_points_f32(2, 500, 7);
    let slices = as_slices(&coords);
    let c = random_complex_f32(500, 8);

    let fk = nufft_type1(&slices, &c, &grid_dims, FftDirection::Forward, 1, 1e-4f32, &host_opts())
        .unwrap();
    let reference =
        direct::type1(&slices, &c, dims3(&grid_dims), FftDirection::Forward, ModeOrder::Cmcl);
    let err = relative_l2_error(&fk, &reference);
    assert!(err < 1e-3, "max relative error = {:.2e}", err);
}

/// Test 4: five transforms in batches of two match five single transforms
#[test]
fn nufft_integration_04_batches_match_single_transforms() {
    let grid_dims = [12usize, 14];
    let n = 200;
    let nt = 5;
    let coords = random_points(2, n, 11);
    let slices = as_slices(&coords);
    // Exactly nt * n values: the last batch must stay in bounds
    let c = random_complex(nt * n, 12);

    let mut plan = Plan::new(
        TransformType::Type1,
        2,
        &grid_dims,
        FftDirection::Forward,
        nt,
        1e-7,
        &NufftOptions {
            max_batch_size: 2,
            ..host_opts()
        },
    )
    .unwrap();
    assert_eq!(plan.batch_size(), 2);
    assert_eq!(plan.num_batches(), 3);
    plan.set_points(&slices).unwrap();

    let total = plan.grid_size();
    let mut fk = vec![Complex::new(0.0, 0.0); nt * total];
    plan.execute_type1(&c, &mut fk).unwrap();

    for t in 0..nt {
        let single = nufft_type1(
            &slices,
            &c[t * n..(t + 1) * n],
            &grid_dims,
            FftDirection::Forward,
            1,
            1e-7,
            &host_opts(),
        )
        .unwrap();
        for (a, b) in fk[t * total..(t + 1) * total].iter().zip(&single) {
            assert_relative_eq!(a.re, b.re, epsilon = 1e-10);
            assert_relative_eq!(a.im, b.im, epsilon = 1e-10);
        }
    }

    // Type 2 through the same batching
    let f = random_complex(nt * total, 13);
    let mut plan2 = Plan::new(
        TransformType::Type2,
        2,
        &grid_dims,
        FftDirection::Forward,
        nt,
        1e-7,
        &NufftOptions {
            max_batch_size: 2,
            spread_threading: SpreadThreading::SequentialMultiThreaded,
            ..host_opts()
        },
    )
    .unwrap();
    plan2.set_points(&slices).unwrap();
    let mut cj = vec![Complex::new(0.0, 0.0); nt * n];
    plan2.execute_type2(&f, &mut cj).unwrap();
    for t in 0..nt {
        let reference = direct::type2(
            &slices,
            &f[t * total..(t + 1) * total],
            dims3(&grid_dims),
            FftDirection::Forward,
            ModeOrder::Cmcl,
        );
        let err = relative_l2_error(&cj[t * n..(t + 1) * n], &reference);
        assert!(err < 1e-6, "transform {}: max relative error = {:.2e}", t, err);
    }
}

/// Test 5: the device backend agrees with the direct sum for both methods
#[test]
fn nufft_integration_05_device_backend() {
    let cases: [&[usize]; 2] = [&[32, 24], &[10, 12, 8]];
    for (case, grid_dims) in cases.iter().enumerate() {
        let rank = grid_dims.len();
        let n = 400;
        let coords = random_points(rank, n, 500 + case as u64);
        let slices = as_slices(&coords);
        let c = random_complex(n, 600 + case as u64);
        let total: usize = grid_dims.iter().product();
        let f = random_complex(total, 700 + case as u64);

        let reference1 =
            direct::type1(&slices, &c, dims3(grid_dims), FftDirection::Forward, ModeOrder::Cmcl);
        let reference2 =
            direct::type2(&slices, &f, dims3(grid_dims), FftDirection::Forward, ModeOrder::Cmcl);

        for method in [SpreadMethod::Auto, SpreadMethod::NuptsDriven, SpreadMethod::Subproblem] {
            let opts = NufftOptions {
                backend: Backend::Device,
                spread_method: method,
                ..host_opts()
            };
            let fk = nufft_type1(&slices, &c, grid_dims, FftDirection::Forward, 1, 1e-6, &opts)
                .unwrap();
            let err = relative_l2_error(&fk, &reference1);
            assert!(err < 1e-5, "type 1 {:?}: max relative error = {:.2e}", method, err);

            let cj = nufft_type2(&slices, &f, grid_dims, FftDirection::Forward, 1, 1e-6, &opts)
                .unwrap();
            let err = relative_l2_error(&cj, &reference2);
            assert!(err < 1e-5, "type 2 {:?}: max relative error = {:.2e}", method, err);
        }
    }
}

/// Test 6: one point at the origin gives a flat unit spectrum
#[test]
fn nufft_integration_06_single_point_flat_spectrum() {
    let x = [0.0f64];
    let fk = nufft_type1(
        &[&x[..]],
        &[Complex::new(1.0, 0.0)],
        &[8],
        FftDirection::Forward,
        1,
        1e-6,
        &host_opts(),
    )
    .unwrap();
    assert_eq!(fk.len(), 8);
    for v in fk {
        assert!((v - Complex::new(1.0, 0.0)).norm() < 1e-5, "mode = {}", v);
    }
}

/// Test 7: spread-only with a point on a grid node writes the scaled kernel
/// footprint, wrapped across the boundary
#[test]
fn nufft_integration_07_spread_only_node() {
    let n = 32usize;
    let opts = NufftOptions {
        spread_only: true,
        kernel_eval_algo: KernelEvalAlgo::Direct,
        ..host_opts()
    };
    // x = 0 lands on node 16, x = -pi on node 0
    for (x, node) in [(0.0f64, 16i64), (-PI, 0)] {
        let xs = [x];
        let mut plan =
            Plan::new(TransformType::Type1, 1, &[n], FftDirection::Forward, 1, 1e-6, &opts)
                .unwrap();
        assert_eq!(plan.fine_dims(), &[n]);
        plan.set_points(&[&xs[..]]).unwrap();

        let mut grid = vec![Complex::new(9.0, 9.0); n];
        plan.spread(&[Complex::new(1.0, 0.0)], &mut grid).unwrap();

        let params = plan.kernel_params();
        let peak = params.evaluate(0.0) * params.scale;
        assert_relative_eq!(grid[node as usize].re, peak, max_relative = 1e-12);

        for k in 0..n as i64 {
            let d = (k - node).rem_euclid(n as i64);
            let d = if d > n as i64 / 2 { d - n as i64 } else { d };
            let expected = params.evaluate(d as f64) * params.scale;
            assert!(
                (grid[k as usize].re - expected).abs() < 1e-12 * peak,
                "cell {}: {} vs {}",
                k,
                grid[k as usize].re,
                expected
            );
            assert_eq!(grid[k as usize].im, 0.0);
        }

        // Interpolating the spread grid back is the discrete kernel energy
        let mut back = vec![Complex::new(0.0, 0.0)];
        plan.interp(&grid, &mut back).unwrap();
        let energy: f64 = grid.iter().map(|g| g.re * g.re).sum();
        assert_relative_eq!(back[0].re, energy, max_relative = 1e-10);
    }
}

/// Test 8: plans can be re-pointed and the point count may be zero
#[test]
fn nufft_integration_08_reuse_and_empty_points() {
    let grid_dims = [16usize, 16];
    let empty: Vec<f64> = Vec::new();
    let coords = random_points(2, 100, 21);
    let slices = as_slices(&coords);
    let mut plan = Plan::new(
        TransformType::Type1,
        2,
        &grid_dims,
        FftDirection::Forward,
        1,
        1e-6,
        &host_opts(),
    )
    .unwrap();

    plan.set_points(&[&empty[..], &empty[..]]).unwrap();
    let mut fk = vec![Complex::new(1.0, 1.0); 256];
    plan.execute_type1(&[], &mut fk).unwrap();
    assert!(fk.iter().all(|v| v.norm() == 0.0));

    let c = random_complex(100, 22);
    plan.set_points(&slices).unwrap();
    plan.execute_type1(&c, &mut fk).unwrap();
    let reference =
        direct::type1(&slices, &c, dims3(&grid_dims), FftDirection::Forward, ModeOrder::Cmcl);
    let err = relative_l2_error(&fk, &reference);
    assert!(err < 1e-5, "max relative error = {:.2e}", err);
}

/// Test 9: grid-unit coordinates are the angle `2 pi x / nf - pi`
#[test]
fn nufft_integration_09_grid_domain() {
    let grid_dims = [20usize];
    let n = 150;
    let plan = Plan::<f64>::new(
        TransformType::Type2,
        1,
        &grid_dims,
        FftDirection::Forward,
        1,
        1e-8,
        &host_opts(),
    )
    .unwrap();
    let nf = plan.fine_dims()[0] as f64;

    let angles = random_points(1, n, 31);
    let grid_units: Vec<f64> = angles[0].iter().map(|a| (a + PI) * nf / (2.0 * PI)).collect();
    let f = random_complex(20, 32);

    let opts = NufftOptions {
        point_domain: PointDomain::Grid,
        ..host_opts()
    };
    let from_grid =
        nufft_type2(&[&grid_units[..]], &f, &grid_dims, FftDirection::Forward, 1, 1e-8, &opts)
            .unwrap();
    let reference = direct::type2(
        &[&angles[0][..]],
        &f,
        dims3(&grid_dims),
        FftDirection::Forward,
        ModeOrder::Cmcl,
    );
    let err = relative_l2_error(&from_grid, &reference);
    assert!(err < 1e-7, "max relative error = {:.2e}", err);
}

/// Test 10: sorting policies and kernel algorithms do not change results
#[test]
fn nufft_integration_10_options_agree() {
    let grid_dims = [30usize, 22];
    let coords = random_points(2, 600, 41);
    let slices = as_slices(&coords);
    let c = random_complex(600, 42);
    let base = nufft_type1(&slices, &c, &grid_dims, FftDirection::Forward, 1, 1e-9, &host_opts())
        .unwrap();

    let variants = [
        NufftOptions {
            sort_points: SortPoints::No,
            ..host_opts()
        },
        NufftOptions {
            sort_points: SortPoints::Yes,
            sort_threads: 3,
            ..host_opts()
        },
        NufftOptions {
            kernel_eval_algo: KernelEvalAlgo::Direct,
            ..host_opts()
        },
        NufftOptions {
            num_threads: 12,
            atomic_threshold: 2,
            ..host_opts()
        },
        NufftOptions {
            upsampling_factor: Some(1.25),
            ..host_opts()
        },
    ];
    for (i, opts) in variants.iter().enumerate() {
        let fk = nufft_type1(&slices, &c, &grid_dims, FftDirection::Forward, 1, 1e-9, opts)
            .unwrap();
        let err = relative_l2_error(&fk, &base);
        assert!(err < 1e-6, "variant {}: max relative error = {:.2e}", i, err);
    }
}

pub mod device;

use num_complex::Complex;
use rayon::prelude::*;
use std::time::Instant;
use thousands::*;

use crate::error::Result;
use crate::kernel::{KernelEvaluator, MAX_KERNEL_WIDTH};
use crate::params::SpreadThreading;
use crate::spread::{SpreadContext, SpreadStrategy};
use crate::utils::fft::NufftFloat;

/// Sorted points handled per work item
const INTERP_CHUNK: usize = 16;

/// Gather one value from a periodic grid.
///
/// Takes the fast path without index wrapping when the footprint lies fully
/// inside the grid.
///
/// ### Params
///
/// * `grid` - One fine grid
/// * `dims` - Fine grid dims
/// * `rank` - Number of active axes
/// * `kernel` - Kernel evaluator
/// * `p` - Folded point coordinates
///
/// ### Returns
///
/// The kernel-weighted sum of the grid around `p`
#[inline]
pub fn interp_point<T: NufftFloat>(
    grid: &[Complex<T>],
    dims: [usize; 3],
    rank: usize,
    kernel: &KernelEvaluator<T>,
    p: &[T; 3],
) -> Complex<T> {
    let w = kernel.width();
    let mut ker = [[T::zero(); MAX_KERNEL_WIDTH]; 3];
    let starts = kernel.footprint(p, rank, &mut ker);

    let fits = (0..rank)
        .all(|axis| starts[axis] >= 0 && starts[axis] + w as i64 <= dims[axis] as i64);

    match rank {
        1 => interp_1d(grid, dims, &ker, starts, w, fits),
        2 => interp_2d(grid, dims, &ker, starts, w, fits),
        _ => interp_3d(grid, dims, &ker, starts, w, fits),
    }
}

/// Wrapped indices of a `w`-wide footprint along one axis
#[inline]
fn footprint_indices(start: i64, w: usize, n: usize) -> [usize; MAX_KERNEL_WIDTH] {
    let mut idx = [0usize; MAX_KERNEL_WIDTH];
    let n = n as i64;
    for (k, v) in idx.iter_mut().enumerate().take(w) {
        *v = (start + k as i64).rem_euclid(n) as usize;
    }
    idx
}

#[inline]
fn interp_1d<T: NufftFloat>(
    grid: &[Complex<T>],
    dims: [usize; 3],
    ker: &[[T; MAX_KERNEL_WIDTH]; 3],
    starts: [i64; 3],
    w: usize,
    fits: bool,
) -> Complex<T> {
    let mut out = Complex::new(T::zero(), T::zero());
    if fits {
        let j0 = starts[0] as usize;
        for (dx, v) in grid[j0..j0 + w].iter().enumerate() {
            out += *v * ker[0][dx];
        }
    } else {
        let ix = footprint_indices(starts[0], w, dims[0]);
        for dx in 0..w {
            out += grid[ix[dx]] * ker[0][dx];
        }
    }
    out
}

#[inline]
fn interp_2d<T: NufftFloat>(
    grid: &[Complex<T>],
    dims: [usize; 3],
    ker: &[[T; MAX_KERNEL_WIDTH]; 3],
    starts: [i64; 3],
    w: usize,
    fits: bool,
) -> Complex<T> {
    let mut out = Complex::new(T::zero(), T::zero());
    if fits {
        let (j0, j1) = (starts[0] as usize, starts[1] as usize);
        for dy in 0..w {
            let row = (j1 + dy) * dims[0] + j0;
            let mut line = Complex::new(T::zero(), T::zero());
            for (dx, v) in grid[row..row + w].iter().enumerate() {
                line += *v * ker[0][dx];
            }
            out += line * ker[1][dy];
        }
    } else {
        let ix = footprint_indices(starts[0], w, dims[0]);
        let iy = footprint_indices(starts[1], w, dims[1]);
        for dy in 0..w {
            let row = iy[dy] * dims[0];
            let mut line = Complex::new(T::zero(), T::zero());
            for dx in 0..w {
                line += grid[row + ix[dx]] * ker[0][dx];
            }
            out += line * ker[1][dy];
        }
    }
    out
}

#[inline]
fn interp_3d<T: NufftFloat>(
    grid: &[Complex<T>],
    dims: [usize; 3],
    ker: &[[T; MAX_KERNEL_WIDTH]; 3],
    starts: [i64; 3],
    w: usize,
    fits: bool,
) -> Complex<T> {
    let ix = footprint_indices(starts[0], w, dims[0]);
    let iy = footprint_indices(starts[1], w, dims[1]);
    let iz = footprint_indices(starts[2], w, dims[2]);

    let mut out = Complex::new(T::zero(), T::zero());
    for dz in 0..w {
        let mut plane = Complex::new(T::zero(), T::zero());
        for dy in 0..w {
            let mut line = Complex::new(T::zero(), T::zero());
            if fits {
                let row = ((starts[2] as usize + dz) * dims[1] + starts[1] as usize + dy) * dims[0]
                    + starts[0] as usize;
                for (dx, v) in grid[row..row + w].iter().enumerate() {
                    line += *v * ker[0][dx];
                }
            } else {
                let row = (iz[dz] * dims[1] + iy[dy]) * dims[0];
                for dx in 0..w {
                    line += grid[row + ix[dx]] * ker[0][dx];
                }
            }
            plane += line * ker[1][dy];
        }
        out += plane * ker[2][dz];
    }
    out
}

/////////////////
// Host interp //
/////////////////

/// Interpolate one fine grid to all points (host design).
///
/// Sorted positions are processed in chunks of 16; results land in a
/// sorted-order buffer and are written back in caller order.
///
/// ### Params
///
/// * `grid` - One fine grid
/// * `out` - `M` values in caller order, overwritten
/// * `ctx` - Spreading context
/// * `nthr` - Threads this call may use (1 runs sequentially)
pub fn interp_sorted<T: NufftFloat>(
    grid: &[Complex<T>],
    out: &mut [Complex<T>],
    ctx: &SpreadContext<T>,
    nthr: usize,
) {
    let m = ctx.points.len();
    if m == 0 {
        return;
    }
    let dims = ctx.opts.dims;
    let rank = ctx.opts.rank;
    let scale = if ctx.opts.spread_only {
        ctx.opts.scale
    } else {
        T::one()
    };
    let perm = &ctx.sort.permutation;

    let gather = |k: usize| {
        let p = ctx.points.rescaled_point(perm[k]);
        interp_point(grid, dims, rank, ctx.kernel, &p) * scale
    };

    let mut sorted_out = vec![Complex::new(T::zero(), T::zero()); m];
    if nthr > 1 {
        sorted_out
            .par_chunks_mut(INTERP_CHUNK)
            .enumerate()
            .for_each(|(c, chunk)| {
                for (j, v) in chunk.iter_mut().enumerate() {
                    *v = gather(c * INTERP_CHUNK + j);
                }
            });
        out.par_iter_mut()
            .zip(ctx.sort.inverse.par_iter())
            .for_each(|(o, &k)| *o = sorted_out[k]);
    } else {
        for (k, v) in sorted_out.iter_mut().enumerate() {
            *v = gather(k);
        }
        for (o, &k) in out.iter_mut().zip(&ctx.sort.inverse) {
            *o = sorted_out[k];
        }
    }
}

/// Interpolate a batch of fine grids to the points.
///
/// ### Params
///
/// * `fine` - At least `count * grid_size` cells
/// * `weights` - `count * M` outputs, transform-major, overwritten
/// * `count` - Transforms in this batch
/// * `ctx` - Spreading context
/// * `strategy` - Resolved strategy
pub fn interp_batch<T: NufftFloat>(
    fine: &[Complex<T>],
    weights: &mut [Complex<T>],
    count: usize,
    ctx: &SpreadContext<T>,
    strategy: SpreadStrategy,
) -> Result<()> {
    let grid_size = ctx.opts.grid_size();
    let m = ctx.points.len();
    if m == 0 {
        return Ok(());
    }
    let fine = &fine[..count * grid_size];
    let weights = &mut weights[..count * m];
    let start = Instant::now();

    match strategy {
        SpreadStrategy::Host(SpreadThreading::ParallelSingleThreaded) if count > 1 => {
            fine.par_chunks(grid_size)
                .zip(weights.par_chunks_mut(m))
                .for_each(|(grid, c)| interp_sorted(grid, c, ctx, 1));
        }
        SpreadStrategy::Host(_) => {
            for (grid, c) in fine.chunks(grid_size).zip(weights.chunks_mut(m)) {
                interp_sorted(grid, c, ctx, ctx.threads);
            }
        }
        SpreadStrategy::DeviceNuptsDriven => {
            for (grid, c) in fine.chunks(grid_size).zip(weights.chunks_mut(m)) {
                device::interp_nupts_driven(grid, c, ctx);
            }
        }
        SpreadStrategy::DeviceSubproblem => {
            for (grid, c) in fine.chunks(grid_size).zip(weights.chunks_mut(m)) {
                device::interp_subproblems(grid, c, ctx)?;
            }
        }
    }

    log::trace!(
        "Interpolated {} transform(s) to {} points in {:.2?}",
        count,
        m.separate_with_underscores(),
        start.elapsed()
    );
    Ok(())
}

///////////
// Tests //
///////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binsort::{sort_points_host, SortOutcome};
    use crate::kernel::KernelParams;
    use crate::params::{KernelEvalAlgo, PointDomain, SortPoints, SpreadDirection};
    use crate::points::Points;
    use crate::spread::{spread_sorted, SpreadOpts};
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use std::f64::consts::PI;

    fn random_grid(len: usize, seed: u64) -> Vec<Complex<f64>> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..len)
            .map(|_| Complex::new(rng.random::<f64>() - 0.5, rng.random::<f64>() - 0.5))
            .collect()
    }

    /// Reference gather over every grid cell with minimum-image distances
    fn direct_interp(
        grid: &[Complex<f64>],
        dims: [usize; 3],
        rank: usize,
        params: &KernelParams<f64>,
        p: [f64; 3],
    ) -> Complex<f64> {
        let mut out = Complex::new(0.0, 0.0);
        for (g, v) in grid.iter().enumerate() {
            let cell = [g % dims[0], (g / dims[0]) % dims[1], g / (dims[0] * dims[1])];
            let mut k = 1.0;
            for axis in 0..rank {
                let n = dims[axis] as f64;
                let mut d = cell[axis] as f64 - p[axis];
                d -= n * (d / n).round();
                k *= params.evaluate(d);
            }
            out += v * k;
        }
        out
    }

    #[test]
    fn test_interp_matches_direct_gather_all_ranks() {
        let params = KernelParams::<f64>::from_tolerance(1e-5, 2.0);
        let kernel = KernelEvaluator::new(&params, KernelEvalAlgo::Direct).unwrap();
        for (rank, dims) in [(1, [40, 1, 1]), (2, [24, 18, 1]), (3, [12, 14, 16])] {
            let grid = random_grid(dims.iter().product(), rank as u64);
            // Near both edges and in the middle
            for x in [-PI + 1e-3, PI - 1e-3, 0.4] {
                let coords = [x, -x * 0.5, PI - 0.01];
                let p: [f64; 3] = std::array::from_fn(|a| {
                    crate::points::fold_rescale(coords[a], dims[a] as f64, PointDomain::Pi)
                });
                let got = interp_point(&grid, dims, rank, &kernel, &p);
                let want = direct_interp(&grid, dims, rank, &params, p);
                assert!(
                    (got - want).norm() < 1e-10 * params.beta.exp().powi(rank as i32),
                    "rank {} x {}: {} vs {}",
                    rank,
                    x,
                    got,
                    want
                );
            }
        }
    }

    #[test]
    fn test_interp_is_adjoint_of_spread() {
        // <spread(c), g> == <c, interp(g)> for real-valued inner products
        let dims = [32, 20, 1];
        let mut rng = StdRng::seed_from_u64(99);
        let n = 200;
        let x: Vec<f64> = (0..n).map(|_| rng.random::<f64>() * 2.0 * PI - PI).collect();
        let y: Vec<f64> = (0..n).map(|_| rng.random::<f64>() * 2.0 * PI - PI).collect();
        let pts = Points::new(&[&x[..], &y[..]], 2, dims, PointDomain::Pi).unwrap();
        let c = random_grid(n, 5);
        let g = random_grid(32 * 20, 6);

        let params = KernelParams::<f64>::from_tolerance(1e-6, 2.0);
        let kernel = KernelEvaluator::new(&params, KernelEvalAlgo::Horner).unwrap();
        let opts = SpreadOpts {
            rank: 2,
            dims,
            max_subproblem_size: 50,
            atomic_threshold: 10,
            spread_only: false,
            scale: 1.0,
        };
        let sort = sort_points_host(&pts, SortPoints::Yes, SpreadDirection::Interp, 4, 0);
        let ctx = SpreadContext {
            points: &pts,
            sort: &sort,
            kernel: &kernel,
            opts: &opts,
            threads: 4,
        };

        let mut fw = vec![Complex::new(0.0, 0.0); 32 * 20];
        spread_sorted(&mut fw, &c, &ctx, 4).unwrap();
        let mut out = vec![Complex::new(0.0, 0.0); n];
        interp_sorted(&g, &mut out, &ctx, 4);

        let lhs: Complex<f64> = fw.iter().zip(&g).map(|(a, b)| a * b).sum();
        let rhs: Complex<f64> = c.iter().zip(&out).map(|(a, b)| a * b).sum();
        assert!((lhs - rhs).norm() < 1e-9 * lhs.norm().max(1.0));
    }

    #[test]
    fn test_sequential_and_parallel_interp_agree() {
        let dims = [50, 1, 1];
        let x: Vec<f64> = (0..37).map(|i| -PI + i as f64 * 0.17).collect();
        let pts = Points::new(&[&x[..]], 1, dims, PointDomain::Pi).unwrap();
        let params = KernelParams::<f64>::from_tolerance(1e-8, 2.0);
        let kernel = KernelEvaluator::new(&params, KernelEvalAlgo::Direct).unwrap();
        let opts = SpreadOpts {
            rank: 1,
            dims,
            max_subproblem_size: 50,
            atomic_threshold: 10,
            spread_only: false,
            scale: 1.0,
        };
        let sort = SortOutcome::identity(37);
        let ctx = SpreadContext {
            points: &pts,
            sort: &sort,
            kernel: &kernel,
            opts: &opts,
            threads: 3,
        };
        let g = random_grid(50, 3);
        let mut seq = vec![Complex::new(0.0, 0.0); 37];
        let mut par = vec![Complex::new(0.0, 0.0); 37];
        interp_sorted(&g, &mut seq, &ctx, 1);
        interp_sorted(&g, &mut par, &ctx, 3);
        assert_eq!(seq, par);
    }
}

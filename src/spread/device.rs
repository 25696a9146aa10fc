use num_complex::Complex;
use rayon::prelude::*;

use crate::error::Result;
use crate::kernel::MAX_KERNEL_WIDTH;
use crate::spread::{add_wrapped_subgrid_atomic, apply_scale, missing_bins, SpreadContext};
use crate::utils::atomic::AtomicGrid;
use crate::utils::fft::NufftFloat;

/// Atomically add one point's kernel footprint into the periodic grid.
#[inline]
fn add_point_atomic<T: NufftFloat>(
    grid: &AtomicGrid<T>,
    ctx: &SpreadContext<T>,
    i: usize,
    c: Complex<T>,
) {
    let dims = ctx.opts.dims;
    let rank = ctx.opts.rank;
    let w = ctx.kernel.width();
    let mut ker = [[T::zero(); MAX_KERNEL_WIDTH]; 3];
    let starts = ctx.kernel.footprint(&ctx.points.rescaled_point(i), rank, &mut ker);

    let span = |axis: usize| if axis < rank { w } else { 1 };
    let wrap = |axis: usize, k: usize| {
        (starts[axis] + k as i64).rem_euclid(dims[axis] as i64) as usize
    };

    for dz in 0..span(2) {
        let iz = wrap(2, dz);
        let cz = c * ker[2][dz];
        for dy in 0..span(1) {
            let iy = wrap(1, dy);
            let cyz = cz * ker[1][dy];
            let row = dims[0] * (iy + dims[1] * iz);
            for dx in 0..w {
                grid.add(row + wrap(0, dx), cyz * ker[0][dx]);
            }
        }
    }
}

/// Point-driven device spread: one work item per point in permutation
/// order, each adding its footprint with atomics.
///
/// ### Params
///
/// * `grid` - One fine grid, overwritten
/// * `weights` - Point strengths in caller order
/// * `ctx` - Spreading context
pub fn spread_nupts_driven<T: NufftFloat>(
    grid: &mut [Complex<T>],
    weights: &[Complex<T>],
    ctx: &SpreadContext<T>,
) -> Result<()> {
    let shared = AtomicGrid::<T>::new(grid.len())?;
    ctx.sort
        .permutation
        .par_iter()
        .for_each(|&i| add_point_atomic(&shared, ctx, i, weights[i]));
    shared.write_to(grid);

    if ctx.opts.spread_only {
        apply_scale(grid, ctx.opts.scale, true);
    }
    Ok(())
}

/// Subproblem device spread: one work item per bin subproblem.
///
/// Each subproblem spreads into a local buffer covering its bin padded by
/// `ceil(w/2)` cells per side, then flushes the buffer into the periodic
/// grid with atomic adds. A point whose footprint leaves the padded bin
/// (possible only on the clamped edge bins) is added to the grid directly.
///
/// ### Params
///
/// * `grid` - One fine grid, overwritten
/// * `weights` - Point strengths in caller order
/// * `ctx` - Spreading context; the points must carry device subproblems
pub fn spread_subproblems<T: NufftFloat>(
    grid: &mut [Complex<T>],
    weights: &[Complex<T>],
    ctx: &SpreadContext<T>,
) -> Result<()> {
    let layout = ctx.sort.bins.as_ref().ok_or_else(missing_bins)?;
    let subs = layout.subproblems.as_ref().ok_or_else(missing_bins)?;

    let rank = ctx.opts.rank;
    let w = ctx.kernel.width();
    let pad = w.div_ceil(2);
    let mut sizes = [1usize; 3];
    for axis in 0..rank {
        sizes[axis] = layout.bin_sizes[axis] + 2 * pad;
    }
    let local_len: usize = sizes.iter().product();
    let zero = Complex::new(T::zero(), T::zero());

    let shared = AtomicGrid::<T>::new(grid.len())?;
    (0..subs.len()).into_par_iter().for_each_init(
        || vec![zero; local_len],
        |local, s| {
            local.fill(zero);
            let origin = layout.bin_origin(subs.to_bin[s]);
            let mut offsets = [0i64; 3];
            for axis in 0..rank {
                offsets[axis] = origin[axis] as i64 - pad as i64;
            }

            let mut ker = [[T::zero(); MAX_KERNEL_WIDTH]; 3];
            for k in subs.point_range(s, layout) {
                let i = ctx.sort.permutation[k];
                let starts = ctx
                    .kernel
                    .footprint(&ctx.points.rescaled_point(i), rank, &mut ker);

                let inside = (0..rank).all(|axis| {
                    starts[axis] >= offsets[axis]
                        && starts[axis] + w as i64 <= offsets[axis] + sizes[axis] as i64
                });
                if !inside {
                    add_point_atomic(&shared, ctx, i, weights[i]);
                    continue;
                }

                let l: [usize; 3] =
                    std::array::from_fn(|axis| (starts[axis] - offsets[axis]) as usize);
                let span = |axis: usize| if axis < rank { w } else { 1 };
                let c = weights[i];
                for dz in 0..span(2) {
                    let cz = c * ker[2][dz];
                    for dy in 0..span(1) {
                        let cyz = cz * ker[1][dy];
                        let row = ((l[2] + dz) * sizes[1] + l[1] + dy) * sizes[0] + l[0];
                        for (dx, v) in local[row..row + w].iter_mut().enumerate() {
                            *v += cyz * ker[0][dx];
                        }
                    }
                }
            }

            add_wrapped_subgrid_atomic(&shared, local, offsets, sizes, ctx.opts.dims);
        },
    );
    shared.write_to(grid);

    if ctx.opts.spread_only {
        apply_scale(grid, ctx.opts.scale, true);
    }
    Ok(())
}

///////////
// Tests //
///////////

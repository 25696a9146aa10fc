use num_complex::Complex;
use rayon::prelude::*;

use crate::error::Result;
use crate::interp::interp_point;
use crate::kernel::MAX_KERNEL_WIDTH;
use crate::spread::{missing_bins, wrapped_axis, SpreadContext};
use crate::utils::fft::NufftFloat;

/// Output multiplier of a gather: the kernel normalisation in spread-only
/// mode, else 1
#[inline]
fn gather_scale<T: NufftFloat>(ctx: &SpreadContext<T>) -> T {
    if ctx.opts.spread_only {
        ctx.opts.scale
    } else {
        T::one()
    }
}

/// Point-driven device interpolation: one work item per point, each
/// gathering from the periodic grid.
///
/// ### Params
///
/// * `grid` - One fine grid
/// * `out` - `M` values in caller order, overwritten
/// * `ctx` - Spreading context
pub fn interp_nupts_driven<T: NufftFloat>(
    grid: &[Complex<T>],
    out: &mut [Complex<T>],
    ctx: &SpreadContext<T>,
) {
    let scale = gather_scale(ctx);
    let dims = ctx.opts.dims;
    let rank = ctx.opts.rank;
    out.par_iter_mut().enumerate().for_each(|(i, o)| {
        let p = ctx.points.rescaled_point(i);
        *o = interp_point(grid, dims, rank, ctx.kernel, &p) * scale;
    });
}

/// Subproblem device interpolation.
///
/// Each subproblem copies its bin, padded by `ceil(w/2)` cells per side
/// with periodic wrap, into a local buffer and gathers its points from it.
/// Subproblem outputs concatenate in permutation order.
///
/// ### Params
///
/// * `grid` - One fine grid
/// * `out` - `M` values in caller order, overwritten
/// * `ctx` - Spreading context; the points must carry device subproblems
pub fn interp_subproblems<T: NufftFloat>(
    grid: &[Complex<T>],
    out: &mut [Complex<T>],
    ctx: &SpreadContext<T>,
) -> Result<()> {
    let layout = ctx.sort.bins.as_ref().ok_or_else(missing_bins)?;
    let subs = layout.subproblems.as_ref().ok_or_else(missing_bins)?;

    let scale = gather_scale(ctx);
    let rank = ctx.opts.rank;
    let dims = ctx.opts.dims;
    let w = ctx.kernel.width();
    let pad = w.div_ceil(2);
    let mut sizes = [1usize; 3];
    for axis in 0..rank {
        sizes[axis] = layout.bin_sizes[axis] + 2 * pad;
    }

    let sorted_out: Vec<Complex<T>> = (0..subs.len())
        .into_par_iter()
        .flat_map_iter(|s| {
            let origin = layout.bin_origin(subs.to_bin[s]);
            let mut offsets = [0i64; 3];
            for axis in 0..rank {
                offsets[axis] = origin[axis] as i64 - pad as i64;
            }
            let ix = wrapped_axis(offsets[0], sizes[0], dims[0]);
            let iy = wrapped_axis(offsets[1], sizes[1], dims[1]);
            let iz = wrapped_axis(offsets[2], sizes[2], dims[2]);

            let mut local = Vec::with_capacity(sizes.iter().product());
            for &z in &iz {
                for &y in &iy {
                    let row = dims[0] * (y + dims[1] * z);
                    local.extend(ix.iter().map(|&x| grid[row + x]));
                }
            }

            let mut ker = [[T::zero(); MAX_KERNEL_WIDTH]; 3];
            let range = subs.point_range(s, layout);
            let mut vals = Vec::with_capacity(range.len());
            for k in range {
                let i = ctx.sort.permutation[k];
                let p = ctx.points.rescaled_point(i);
                let starts = ctx.kernel.footprint(&p, rank, &mut ker);

                let inside = (0..rank).all(|axis| {
                    starts[axis] >= offsets[axis]
                        && starts[axis] + w as i64 <= offsets[axis] + sizes[axis] as i64
                });
                if !inside {
                    vals.push(interp_point(grid, dims, rank, ctx.kernel, &p) * scale);
                    continue;
                }

                let l: [usize; 3] =
                    std::array::from_fn(|axis| (starts[axis] - offsets[axis]) as usize);
                let span = |axis: usize| if axis < rank { w } else { 1 };
                let mut acc = Complex::new(T::zero(), T::zero());
                for dz in 0..span(2) {
                    for dy in 0..span(1) {
                        let row = ((l[2] + dz) * sizes[1] + l[1] + dy) * sizes[0] + l[0];
                        let mut line = Complex::new(T::zero(), T::zero());
                        for (dx, v) in local[row..row + w].iter().enumerate() {
                            line += *v * ker[0][dx];
                        }
                        acc += line * (ker[1][dy] * ker[2][dz]);
                    }
                }
                vals.push(acc * scale);
            }
            vals
        })
        .collect();

    out.par_iter_mut()
        .zip(ctx.sort.inverse.par_iter())
        .for_each(|(o, &k)| *o = sorted_out[k]);
    Ok(())
}

///////////
// Tests //
///////////

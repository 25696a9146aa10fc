pub mod device;

use num_complex::Complex;
use parking_lot::Mutex;
use rayon::prelude::*;
use std::ops::Range;
use std::time::Instant;
use thousands::*;

use crate::binsort::SortOutcome;
use crate::error::{NufftError, Result};
use crate::kernel::{KernelEvaluator, MAX_KERNEL_WIDTH};
use crate::params::SpreadThreading;
use crate::points::Points;
use crate::utils::atomic::AtomicGrid;
use crate::utils::fft::NufftFloat;
use crate::utils::try_alloc;

/// Default host subproblem cap for rank 1
pub const MAX_SUBPROBLEM_SIZE_1D: usize = 10_000;

/// Default host subproblem cap for rank 2 and 3
pub const MAX_SUBPROBLEM_SIZE_ND: usize = 100_000;

////////////////////
// Configuration //
////////////////////

/// Resolved spreading/interpolation strategy, decided once at plan setup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpreadStrategy {
    /// Host subproblem decomposition with a batch threading strategy
    /// (never `Auto`)
    Host(SpreadThreading),
    /// Device path, one work item per point
    DeviceNuptsDriven,
    /// Device path, one work item per bin subproblem
    DeviceSubproblem,
}

/// Fixed spreading settings of a plan.
///
/// ### Fields
///
/// * `rank` - Number of active axes
/// * `dims` - Fine grid dims (axis 0 fastest)
/// * `max_subproblem_size` - Points per subproblem cap
/// * `atomic_threshold` - Host merges use atomics above this thread count
/// * `spread_only` - Multiply results by the kernel normalisation
/// * `scale` - Kernel normalisation for spread-only mode
#[derive(Clone, Debug)]
pub struct SpreadOpts<T> {
    pub rank: usize,
    pub dims: [usize; 3],
    pub max_subproblem_size: usize,
    pub atomic_threshold: usize,
    pub spread_only: bool,
    pub scale: T,
}

impl<T> SpreadOpts<T> {
    /// Elements in one fine grid
    pub fn grid_size(&self) -> usize {
        self.dims.iter().product()
    }
}

/// Everything a spread or interpolation call reads.
///
/// ### Fields
///
/// * `points` - Borrowed, folded point set
/// * `sort` - Processing order (and bins on the device path)
/// * `kernel` - Kernel evaluator
/// * `opts` - Fixed spreading settings
/// * `threads` - Size of the thread pool the call runs in
pub struct SpreadContext<'p, 'a, T: NufftFloat> {
    pub points: &'p Points<'a, T>,
    pub sort: &'p SortOutcome,
    pub kernel: &'p KernelEvaluator<T>,
    pub opts: &'p SpreadOpts<T>,
    pub threads: usize,
}

/////////////////
// Subproblems //
/////////////////

/// Split the sorted point sequence into contiguous subproblems.
///
/// Starts from `min(threads, M)`, grows so no subproblem exceeds
/// `max_subproblem_size`, goes to one point per subproblem when there is
/// less than one point per 1000 grid cells, and collapses to a single
/// subproblem for unsorted points on one thread.
///
/// ### Params
///
/// * `num_points` - Number of points `M`
/// * `threads` - Threads available
/// * `max_subproblem_size` - Cap on points per subproblem
/// * `grid_size` - Fine grid cells
/// * `did_sort` - Whether the points were bin-sorted
///
/// ### Returns
///
/// `nb + 1` breakpoints; subproblem `p` covers `breaks[p]..breaks[p + 1]`
pub fn subproblem_breaks(
    num_points: usize,
    threads: usize,
    max_subproblem_size: usize,
    grid_size: usize,
    did_sort: bool,
) -> Vec<usize> {
    let m = num_points;
    let mut nb = threads.min(m);
    if nb * max_subproblem_size < m {
        nb = m.div_ceil(max_subproblem_size.max(1));
    }
    if m * 1000 < grid_size {
        nb = m;
    }
    if !did_sort && threads == 1 {
        nb = 1;
    }
    let nb = nb.max(1);

    (0..=nb)
        .map(|p| (0.5 + m as f64 * p as f64 / nb as f64) as usize)
        .collect()
}

/// Bounding cuboid of a set of folded points, padded by half the kernel
/// width per side.
///
/// ### Params
///
/// * `coords` - Folded point coordinates
/// * `rank` - Number of active axes
/// * `width` - Kernel width `w`
///
/// ### Returns
///
/// Tuple of `(offsets, sizes)`: first cell `ceil(min - w/2)` and extent
/// `ceil(max - w/2) - offset + w` per active axis; unused axes get offset 0
/// and size 1
pub fn get_subgrid<T: NufftFloat>(
    coords: &[[T; 3]],
    rank: usize,
    width: usize,
) -> ([i64; 3], [usize; 3]) {
    let hw = T::from_f64_lossy(width as f64 / 2.0);
    let mut offsets = [0i64; 3];
    let mut sizes = [1usize; 3];
    if coords.is_empty() {
        return (offsets, sizes);
    }

    for axis in 0..rank {
        let mut lo = coords[0][axis];
        let mut hi = coords[0][axis];
        for p in &coords[1..] {
            lo = lo.min(p[axis]);
            hi = hi.max(p[axis]);
        }
        let offset = (lo - hw).ceil().to_f64_lossy() as i64;
        let top = (hi - hw).ceil().to_f64_lossy() as i64;
        offsets[axis] = offset;
        sizes[axis] = usize::try_from(top.saturating_sub(offset))
            .unwrap_or(usize::MAX)
            .saturating_add(width);
    }
    (offsets, sizes)
}

/// Spread points into a local (non-periodic) subgrid.
///
/// ### Params
///
/// * `local` - Zeroed buffer of `sizes[0] * sizes[1] * sizes[2]` cells
/// * `offsets` - Global index of the local origin per axis
/// * `sizes` - Local extent per axis
/// * `rank` - Number of active axes
/// * `kernel` - Kernel evaluator
/// * `coords` - Folded point coordinates, all inside the local footprint
/// * `weights` - Point strengths
pub fn spread_into_subgrid<T: NufftFloat>(
    local: &mut [Complex<T>],
    offsets: [i64; 3],
    sizes: [usize; 3],
    rank: usize,
    kernel: &KernelEvaluator<T>,
    coords: &[[T; 3]],
    weights: &[Complex<T>],
) {
    let w = kernel.width();
    let mut ker = [[T::zero(); MAX_KERNEL_WIDTH]; 3];

    for (p, &c) in coords.iter().zip(weights) {
        let starts = kernel.footprint(p, rank, &mut ker);
        let j0 = (starts[0] - offsets[0]) as usize;

        match rank {
            1 => {
                for (dx, v) in local[j0..j0 + w].iter_mut().enumerate() {
                    *v += c * ker[0][dx];
                }
            }
            2 => {
                let j1 = (starts[1] - offsets[1]) as usize;
                for dy in 0..w {
                    let cy = c * ker[1][dy];
                    let row = (j1 + dy) * sizes[0] + j0;
                    for (dx, v) in local[row..row + w].iter_mut().enumerate() {
                        *v += cy * ker[0][dx];
                    }
                }
            }
            _ => {
                let j1 = (starts[1] - offsets[1]) as usize;
                let j2 = (starts[2] - offsets[2]) as usize;
                for dz in 0..w {
                    let cz = c * ker[2][dz];
                    for dy in 0..w {
                        let cyz = cz * ker[1][dy];
                        let row = ((j2 + dz) * sizes[1] + j1 + dy) * sizes[0] + j0;
                        for (dx, v) in local[row..row + w].iter_mut().enumerate() {
                            *v += cyz * ker[0][dx];
                        }
                    }
                }
            }
        }
    }
}

/// Global periodic indices of a local span along one axis
pub fn wrapped_axis(offset: i64, size: usize, n: usize) -> Vec<usize> {
    let n = n as i64;
    (0..size as i64)
        .map(|k| (offset + k).rem_euclid(n) as usize)
        .collect()
}

/// Visit every `(local index, wrapped global index)` pair of a subgrid.
pub fn for_each_wrapped(
    offsets: [i64; 3],
    sizes: [usize; 3],
    dims: [usize; 3],
    mut f: impl FnMut(usize, usize),
) {
    let ix = wrapped_axis(offsets[0], sizes[0], dims[0]);
    let iy = wrapped_axis(offsets[1], sizes[1], dims[1]);
    let iz = wrapped_axis(offsets[2], sizes[2], dims[2]);
    let mut l = 0;
    for &z in &iz {
        for &y in &iy {
            let row = dims[0] * (y + dims[1] * z);
            for &x in &ix {
                f(l, row + x);
                l += 1;
            }
        }
    }
}

/// Add a local subgrid into the periodic fine grid.
pub fn add_wrapped_subgrid<T: NufftFloat>(
    grid: &mut [Complex<T>],
    local: &[Complex<T>],
    offsets: [i64; 3],
    sizes: [usize; 3],
    dims: [usize; 3],
) {
    for_each_wrapped(offsets, sizes, dims, |l, g| grid[g] += local[l]);
}

/// Add a local subgrid into the periodic fine grid with atomic adds.
pub fn add_wrapped_subgrid_atomic<T: NufftFloat>(
    grid: &AtomicGrid<T>,
    local: &[Complex<T>],
    offsets: [i64; 3],
    sizes: [usize; 3],
    dims: [usize; 3],
) {
    for_each_wrapped(offsets, sizes, dims, |l, g| grid.add(g, local[l]));
}

/// A spread subproblem's private result
struct LocalSubgrid<T> {
    data: Vec<Complex<T>>,
    offsets: [i64; 3],
    sizes: [usize; 3],
}

/// Copy one subproblem's points and spread them into a private buffer.
///
/// Allocation failure of the buffer is logged and the subproblem skipped.
fn spread_subproblem<T: NufftFloat>(
    range: Range<usize>,
    weights: &[Complex<T>],
    ctx: &SpreadContext<T>,
) -> Option<LocalSubgrid<T>> {
    let perm = &ctx.sort.permutation[range];
    let coords: Vec<[T; 3]> = perm.iter().map(|&i| ctx.points.rescaled_point(i)).collect();
    let wts: Vec<Complex<T>> = perm.iter().map(|&i| weights[i]).collect();

    let (offsets, sizes) = get_subgrid(&coords, ctx.opts.rank, ctx.kernel.width());
    let len = sizes
        .iter()
        .try_fold(1usize, |acc, &n| acc.checked_mul(n))
        .unwrap_or(usize::MAX);

    let mut data = match try_alloc(len, "subgrid") {
        Ok(data) => data,
        Err(e) => {
            log::error!("{} ({:?}); skipping {} points", e, sizes, perm.len());
            return None;
        }
    };
    data.resize(len, Complex::new(T::zero(), T::zero()));

    spread_into_subgrid(
        &mut data,
        offsets,
        sizes,
        ctx.opts.rank,
        ctx.kernel,
        &coords,
        &wts,
    );

    Some(LocalSubgrid {
        data,
        offsets,
        sizes,
    })
}

/////////////////
// Host spread //
/////////////////

/// Spread one transform's weights onto its fine grid (host design).
///
/// Zeroes the grid, decomposes the sorted points into subproblems, spreads
/// each into a private buffer and merges it with periodic wrap: directly
/// when running single-threaded, under one mutex up to
/// `atomic_threshold` threads, with atomic adds above it.
///
/// ### Params
///
/// * `grid` - One fine grid, overwritten
/// * `weights` - Point strengths in caller order
/// * `ctx` - Spreading context
/// * `nthr` - Threads this call may use (1 runs sequentially)
///
/// ### Returns
///
/// `NufftError::Internal` if the atomic merge grid cannot be allocated
pub fn spread_sorted<T: NufftFloat>(
    grid: &mut [Complex<T>],
    weights: &[Complex<T>],
    ctx: &SpreadContext<T>,
    nthr: usize,
) -> Result<()> {
    let zero = Complex::new(T::zero(), T::zero());
    let m = ctx.points.len();
    if nthr > 1 {
        grid.par_iter_mut().for_each(|v| *v = zero);
    } else {
        grid.fill(zero);
    }
    if m == 0 {
        return Ok(());
    }

    let breaks = subproblem_breaks(
        m,
        nthr,
        ctx.opts.max_subproblem_size,
        ctx.opts.grid_size(),
        ctx.sort.did_sort,
    );
    let nb = breaks.len() - 1;
    let dims = ctx.opts.dims;

    if nthr == 1 || nb == 1 {
        for p in 0..nb {
            if let Some(sub) = spread_subproblem(breaks[p]..breaks[p + 1], weights, ctx) {
                add_wrapped_subgrid(grid, &sub.data, sub.offsets, sub.sizes, dims);
            }
        }
    } else if nthr > ctx.opts.atomic_threshold {
        let shared = AtomicGrid::<T>::new(grid.len())?;
        (0..nb).into_par_iter().for_each(|p| {
            if let Some(sub) = spread_subproblem(breaks[p]..breaks[p + 1], weights, ctx) {
                add_wrapped_subgrid_atomic(&shared, &sub.data, sub.offsets, sub.sizes, dims);
            }
        });
        shared.write_to(grid);
    } else {
        let shared = Mutex::new(&mut *grid);
        (0..nb).into_par_iter().for_each(|p| {
            if let Some(sub) = spread_subproblem(breaks[p]..breaks[p + 1], weights, ctx) {
                let mut guard = shared.lock();
                add_wrapped_subgrid(&mut guard, &sub.data, sub.offsets, sub.sizes, dims);
            }
        });
    }

    if ctx.opts.spread_only {
        apply_scale(grid, ctx.opts.scale, nthr > 1);
    }
    Ok(())
}

/// Multiply every cell by `scale`
pub fn apply_scale<T: NufftFloat>(data: &mut [Complex<T>], scale: T, parallel: bool) {
    if parallel {
        data.par_iter_mut().for_each(|v| *v = *v * scale);
    } else {
        data.iter_mut().for_each(|v| *v = *v * scale);
    }
}

////////////////
// Batch entry //
////////////////

/// Spread a batch of transforms onto consecutive fine grids.
///
/// ### Params
///
/// * `fine` - At least `count * grid_size` cells; the first `count` grids
///   are overwritten
/// * `weights` - `count * M` strengths, transform-major
/// * `count` - Transforms in this batch
/// * `ctx` - Spreading context
/// * `strategy` - Resolved strategy
pub fn spread_batch<T: NufftFloat>(
    fine: &mut [Complex<T>],
    weights: &[Complex<T>],
    count: usize,
    ctx: &SpreadContext<T>,
    strategy: SpreadStrategy,
) -> Result<()> {
    let grid_size = ctx.opts.grid_size();
    let m = ctx.points.len();
    let fine = &mut fine[..count * grid_size];
    let start = Instant::now();

    if m == 0 {
        fine.par_iter_mut()
            .for_each(|v| *v = Complex::new(T::zero(), T::zero()));
        return Ok(());
    }

    match strategy {
        SpreadStrategy::Host(SpreadThreading::ParallelSingleThreaded) if count > 1 => {
            fine.par_chunks_mut(grid_size)
                .zip(weights.par_chunks(m))
                .try_for_each(|(grid, c)| spread_sorted(grid, c, ctx, 1))?;
        }
        SpreadStrategy::Host(_) => {
            for (grid, c) in fine.chunks_mut(grid_size).zip(weights.chunks(m)) {
                spread_sorted(grid, c, ctx, ctx.threads)?;
            }
        }
        SpreadStrategy::DeviceNuptsDriven => {
            for (grid, c) in fine.chunks_mut(grid_size).zip(weights.chunks(m)) {
                device::spread_nupts_driven(grid, c, ctx)?;
            }
        }
        SpreadStrategy::DeviceSubproblem => {
            for (grid, c) in fine.chunks_mut(grid_size).zip(weights.chunks(m)) {
                device::spread_subproblems(grid, c, ctx)?;
            }
        }
    }

    log::trace!(
        "Spread {} transform(s) of {} points in {:.2?}",
        count,
        m.separate_with_underscores(),
        start.elapsed()
    );
    Ok(())
}

/// Error for strategies that need device bins but the points were not
/// binned
pub(crate) fn missing_bins() -> NufftError {
    NufftError::internal("subproblem strategy requires binned points")
}

///////////
// Tests //
///////////

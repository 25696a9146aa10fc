pub mod device;

use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use thousands::*;

use crate::binsort::device::BinLayout;
use crate::params::{SortPoints, SpreadDirection};
use crate::points::Points;
use crate::utils::fft::NufftFloat;
use crate::utils::math::exclusive_prefix_sum;

/// Host bin extent per axis (fastest axis first)
pub const HOST_BIN_SIZES: [usize; 3] = [16, 4, 4];

/////////////////
// SortOutcome //
/////////////////

/// Result of sorting a point set.
///
/// ### Fields
///
/// * `permutation` - `permutation[k]` is the caller index of the `k`-th
///   point in processing order; always a bijection on `[0, num_points)`
/// * `inverse` - `inverse[permutation[k]] == k`
/// * `did_sort` - `false` when the identity was used
/// * `bins` - Device bin layout (and subproblems) when binned on the device
///   path
#[derive(Clone, Debug, Default)]
pub struct SortOutcome {
    pub permutation: Vec<usize>,
    pub inverse: Vec<usize>,
    pub did_sort: bool,
    pub bins: Option<BinLayout>,
}

impl SortOutcome {
    /// Identity ordering of `num_points` points
    pub fn identity(num_points: usize) -> Self {
        let permutation: Vec<usize> = (0..num_points).collect();
        Self {
            inverse: permutation.clone(),
            permutation,
            did_sort: false,
            bins: None,
        }
    }

    /// Wrap a sorted permutation and derive its inverse
    pub fn sorted(permutation: Vec<usize>, bins: Option<BinLayout>) -> Self {
        Self {
            inverse: invert_permutation(&permutation),
            permutation,
            did_sort: true,
            bins,
        }
    }

    /// Number of points covered
    pub fn len(&self) -> usize {
        self.permutation.len()
    }

    /// Returns `true` for an empty point set
    pub fn is_empty(&self) -> bool {
        self.permutation.is_empty()
    }
}

/// Invert a bijection: `out[map[i]] = i`.
pub fn invert_permutation(map: &[usize]) -> Vec<usize> {
    let out: Vec<AtomicUsize> = (0..map.len()).map(|_| AtomicUsize::new(0)).collect();
    map.par_iter()
        .enumerate()
        .for_each(|(i, &dst)| out[dst].store(i, Ordering::Relaxed));
    out.into_iter().map(AtomicUsize::into_inner).collect()
}

//////////////
// Decision //
//////////////

/// Whether the host path sorts at all.
///
/// Under `Auto`, 1-D problems that interpolate, or that have more than
/// 1000 points per mode along axis 0, stay unsorted.
///
/// ### Params
///
/// * `policy` - User policy
/// * `rank` - Number of active axes
/// * `direction` - Spread or interpolate
/// * `num_points` - Number of nonuniform points
/// * `n0` - Fine grid size along axis 0
pub fn should_sort(
    policy: SortPoints,
    rank: usize,
    direction: SpreadDirection,
    num_points: usize,
    n0: usize,
) -> bool {
    match policy {
        SortPoints::Yes => true,
        SortPoints::No => false,
        SortPoints::Auto => {
            !(rank == 1
                && (direction == SpreadDirection::Interp || num_points > 1000 * n0))
        }
    }
}

/// Threads for the host bin sort: the override if set, else all threads
/// when points are dense (`10 * M > grid size`), else one.
pub fn sort_thread_count(
    sort_threads: usize,
    threads: usize,
    num_points: usize,
    grid_size: usize,
) -> usize {
    if sort_threads > 0 {
        sort_threads
    } else if 10 * num_points > grid_size {
        threads
    } else {
        1
    }
}

/////////////////
// Host sorter //
/////////////////

/// Sort (or not) the points on the host path.
///
/// ### Params
///
/// * `points` - Folded point set
/// * `policy` - User sorting policy
/// * `direction` - Spread or interpolate
/// * `threads` - Pool size
/// * `sort_threads` - Sort thread override, 0 for the heuristic
///
/// ### Returns
///
/// The permutation and its inverse
pub fn sort_points_host<T: NufftFloat>(
    points: &Points<T>,
    policy: SortPoints,
    direction: SpreadDirection,
    threads: usize,
    sort_threads: usize,
) -> SortOutcome {
    let m = points.len();
    let dims = points.dims();

    if !should_sort(policy, points.rank(), direction, m, dims[0]) {
        log::debug!(
            "Skipping bin sort for {} points",
            m.separate_with_underscores()
        );
        return SortOutcome::identity(m);
    }

    let grid_size: usize = dims.iter().product();
    let nthr = sort_thread_count(sort_threads, threads, m, grid_size);
    let start = Instant::now();

    let permutation = if nthr > 1 {
        bin_sort_multi_thread(points, nthr)
    } else {
        bin_sort_single_thread(points)
    };

    log::debug!(
        "Bin sorted {} points with {} thread(s) in {:.2?}",
        m.separate_with_underscores(),
        nthr,
        start.elapsed()
    );

    SortOutcome::sorted(permutation, None)
}

/// Number of host bins per axis: `floor(n / bin) + 1` on active axes
pub fn host_bin_counts(dims: [usize; 3], rank: usize) -> [usize; 3] {
    let mut nbins = [1; 3];
    for axis in 0..rank {
        nbins[axis] = dims[axis] / HOST_BIN_SIZES[axis] + 1;
    }
    nbins
}

#[inline]
fn host_bin_index<T: NufftFloat>(points: &Points<T>, i: usize, nbins: &[usize; 3]) -> usize {
    let mut idx = [0usize; 3];
    for axis in 0..points.rank() {
        let x = points.rescaled(axis, i).to_f64_lossy();
        idx[axis] = ((x / HOST_BIN_SIZES[axis] as f64) as usize).min(nbins[axis] - 1);
    }
    idx[0] + nbins[0] * (idx[1] + nbins[1] * idx[2])
}

/// Single-threaded counting sort into host bins.
///
/// Counts per bin, exclusive prefix sum for bin starts, then each point
/// claims the next slot in its bin. Inverting the slot map gives a
/// bin-major ordering with axis 0 innermost.
pub fn bin_sort_single_thread<T: NufftFloat>(points: &Points<T>) -> Vec<usize> {
    let m = points.len();
    let nbins = host_bin_counts(points.dims(), points.rank());
    let total_bins = nbins.iter().product();

    let bins: Vec<usize> = (0..m).map(|i| host_bin_index(points, i, &nbins)).collect();

    let mut counts = vec![0usize; total_bins];
    for &b in &bins {
        counts[b] += 1;
    }
    let mut offsets = exclusive_prefix_sum(&counts);

    let mut slots = vec![0usize; m];
    for (i, &b) in bins.iter().enumerate() {
        slots[i] = offsets[b];
        offsets[b] += 1;
    }

    invert_permutation(&slots)
}

/// Multi-threaded counting sort into host bins.
///
/// Each thread counts its contiguous slice of points; per-bin starts come
/// from the summed counts and each `(thread, bin)` pair gets a private base
/// offset so that slot writes never collide. The result equals
/// [`bin_sort_single_thread`].
pub fn bin_sort_multi_thread<T: NufftFloat>(points: &Points<T>, nthreads: usize) -> Vec<usize> {
    let m = points.len();
    let nt = nthreads.min(m).max(1);
    let nbins = host_bin_counts(points.dims(), points.rank());
    let total_bins: usize = nbins.iter().product();

    let breaks: Vec<usize> = (0..=nt)
        .map(|t| (0.5 + m as f64 * t as f64 / nt as f64) as usize)
        .collect();

    let bins: Vec<usize> = (0..m)
        .into_par_iter()
        .map(|i| host_bin_index(points, i, &nbins))
        .collect();

    let counts: Vec<Vec<usize>> = (0..nt)
        .into_par_iter()
        .map(|t| {
            let mut c = vec![0usize; total_bins];
            for &b in &bins[breaks[t]..breaks[t + 1]] {
                c[b] += 1;
            }
            c
        })
        .collect();

    let totals: Vec<usize> = (0..total_bins)
        .into_par_iter()
        .map(|b| counts.iter().map(|c| c[b]).sum())
        .collect();
    let mut running = exclusive_prefix_sum(&totals);

    let mut bases = Vec::with_capacity(nt);
    for c in &counts {
        bases.push(running.clone());
        running
            .par_iter_mut()
            .zip(c.par_iter())
            .for_each(|(r, &n)| *r += n);
    }

    let mut slots = vec![0usize; m];
    let mut chunks = Vec::with_capacity(nt);
    let mut rest = slots.as_mut_slice();
    for t in 0..nt {
        let (head, tail) = rest.split_at_mut(breaks[t + 1] - breaks[t]);
        chunks.push(head);
        rest = tail;
    }

    chunks
        .into_par_iter()
        .zip(bases.into_par_iter())
        .enumerate()
        .for_each(|(t, (chunk, mut base))| {
            for (k, slot) in chunk.iter_mut().enumerate() {
                let b = bins[breaks[t] + k];
                *slot = base[b];
                base[b] += 1;
            }
        });

    invert_permutation(&slots)
}

///////////
// Tests //
///////////
